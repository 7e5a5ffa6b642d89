use crate::config::Config;
use crate::guest::ChrootExecutor;
use crate::mounts::HostMounts;
use crate::outln;
use crate::session::SessionController;
use crate::util::set_json_output;
use crate::util::signals::{install_handlers, pending_signal};
use anyhow::Result;
use log::trace;
use serde_json::json;

pub fn prepare(config: &Config, force: bool) -> Result<()> {
    trace!("Preparing sandbox {}", config.sandbox.name);
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

    let report = session.prepare()?;

    for target in &report.mounted {
        outln!("mounted {}", target.display());
    }
    if !report.already_mounted.is_empty() {
        outln!("{} already mounted", report.already_mounted.len());
    }
    outln!(
        "Sandbox '{}' is ready at {}. Run `chrootctl stop` when done.",
        config.sandbox.name,
        config.sandbox.root.display()
    );

    set_json_output("mounted", json!(report.mounted));
    set_json_output("already_mounted", json!(report.already_mounted));
    Ok(())
}
