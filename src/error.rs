use nix::sys::signal::Signal;
use std::path::PathBuf;
use thiserror::Error;

/// Failures that decide the process exit code. Everything else travels as a
/// plain `anyhow::Error` and maps to exit code 1.
#[derive(Error, Debug)]
pub enum ChrootError {
    /// Dangerous or unusable configuration, detected before any mutation.
    #[error("Invalid configuration: {0}")]
    FatalConfig(String),

    /// A binary the session needs is not available.
    #[error("Required tool not found: {0}")]
    MissingTool(String),

    /// The sandbox lock is held by another running process.
    #[error("Sandbox '{name}' is busy: locked by running process {pid}")]
    Busy { name: String, pid: i32 },

    /// A single establish step failed.
    #[error("Failed to mount {}: {reason}", target.display())]
    MountFailure { target: PathBuf, reason: String },

    /// A termination signal arrived before the guest started.
    #[error("Interrupted by {0}")]
    Interrupted(Signal),

    /// The requested account is missing from the sandbox's own user database.
    #[error("Guest user '{0}' does not exist inside the sandbox root")]
    UnknownGuestUser(String),
}

impl ChrootError {
    pub fn exit_code(&self) -> i32 {
        match self {
            ChrootError::MissingTool(_) => 127,
            ChrootError::Interrupted(signal) => 128 + *signal as i32,
            ChrootError::FatalConfig(_)
            | ChrootError::Busy { .. }
            | ChrootError::MountFailure { .. }
            | ChrootError::UnknownGuestUser(_) => 1,
        }
    }
}

/// Picks the exit code for an error chain, looking through any context
/// layers for a `ChrootError`.
pub fn exit_code_for(error: &anyhow::Error) -> i32 {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<ChrootError>())
        .map(ChrootError::exit_code)
        .unwrap_or(1)
}
