#[cfg(test)]
pub mod fake;
mod host;
mod mount_kind;
pub mod orchestrator;
pub mod registry;
mod resolv_conf;

pub use host::*;
pub use mount_kind::*;
pub use orchestrator::{EstablishReport, ReverseReport, audit, establish, reverse};
pub use resolv_conf::*;
