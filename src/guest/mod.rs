mod account;
mod environment;
mod exec;

pub use account::*;
pub use environment::*;
pub use exec::*;
