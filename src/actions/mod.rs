mod config;
mod enter;
mod prepare;
mod status;
mod stop;

pub use config::*;
pub use enter::*;
pub use prepare::*;
pub use status::*;
pub use stop::*;
