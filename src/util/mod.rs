mod access;
mod drop_privileges;
mod expand_tilde;
mod find_in_path;
pub mod lock_record;
mod mkdir;
mod mount;
mod mounts;
mod output;
mod process_alive;
mod resolve_uid_gid_home;
pub mod signals;
mod shell_quote;

pub use access::*;
pub use drop_privileges::*;
pub use expand_tilde::*;
pub use find_in_path::*;
pub use mkdir::*;
pub use mount::*;
pub use mounts::*;
pub use output::*;
pub use process_alive::*;
pub use resolve_uid_gid_home::*;
pub use shell_quote::*;
