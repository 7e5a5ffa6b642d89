mod fixture_chroot;

pub use fixture_chroot::*;
