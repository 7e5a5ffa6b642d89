use crate::config::Config;
use crate::guest::ChrootExecutor;
use crate::mounts::HostMounts;
use crate::outln;
use crate::session::SessionController;
use crate::util::set_json_output;
use crate::util::signals::{install_handlers, pending_signal};
use anyhow::{Result, anyhow};
use log::trace;
use serde_json::json;

pub fn stop(config: &Config, force: bool) -> Result<()> {
    trace!("Stopping sandbox {}", config.sandbox.name);

    // A signal arriving mid-teardown is recorded and otherwise ignored
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

    let report = session.stop()?;

    for target in &report.reverse.unmounted {
        outln!("unmounted {}", target.display());
    }
    for (target, reason) in &report.reverse.failures {
        outln!("failed to unmount {}: {}", target.display(), reason);
    }
    if report.reverse.unmounted.is_empty() && report.reverse.is_clean() {
        outln!("Sandbox '{}' was not mounted", config.sandbox.name);
    }

    set_json_output("unmounted", json!(report.reverse.unmounted));
    set_json_output(
        "failures",
        json!(
            report
                .reverse
                .failures
                .iter()
                .map(|(target, reason)| json!({"target": target, "reason": reason}))
                .collect::<Vec<_>>()
        ),
    );
    set_json_output("leftovers", json!(report.leftovers));

    if !report.reverse.is_clean() {
        return Err(anyhow!(
            "{} mounts of sandbox '{}' could not be removed",
            report.reverse.failures.len(),
            config.sandbox.name
        ));
    }
    Ok(())
}
