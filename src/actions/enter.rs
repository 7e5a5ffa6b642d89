use crate::config::Config;
use crate::guest::ChrootExecutor;
use crate::mounts::HostMounts;
use crate::session::SessionController;
use crate::util::set_json_output;
use crate::util::signals::{install_handlers, pending_signal};
use anyhow::Result;
use log::trace;
use serde_json::json;

/// Runs `command` inside the sandbox, or the user's shell when there is no
/// command, and returns the guest's exit status.
pub fn enter(
    config: &Config,
    user: Option<String>,
    command: Option<Vec<String>>,
    force: bool,
) -> Result<i32> {
    let user = user.unwrap_or(config.sandbox.user.clone());
    trace!("Entering sandbox {} as {}", config.sandbox.name, user);

    // Before the lock is taken, so a signal can never strand it
    install_handlers()?;

    let mounts = HostMounts::detect();
    let guest = ChrootExecutor;
    let interrupted = pending_signal;
    let mut session = SessionController::new(
        &config.sandbox,
        &config.lock_dir,
        &mounts,
        &guest,
        &interrupted,
    )?
    .force(force);

    let status = match command {
        Some(command) => session.run(&user, command)?,
        None => session.shell(&user)?,
    };
    trace!("Session ended {:?}", session.state());

    set_json_output("exit_code", json!(status));
    Ok(status)
}
