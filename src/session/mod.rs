mod controller;
mod status;
mod teardown;

pub use controller::*;
pub use status::*;
pub use teardown::*;
