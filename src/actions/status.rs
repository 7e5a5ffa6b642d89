use crate::{
    config::Config,
    guest::ChrootExecutor,
    mounts::HostMounts,
    outln,
    session::SessionController,
    util::set_json_output,
    util::signals::pending_signal,
};
use anyhow::{Context, Result};
use log::trace;

pub fn status(config: &Config) -> Result<()> {
    trace!("Status of sandbox {}", config.sandbox.name);

    let mounts = HostMounts::detect();
    let guest = ChrootExecutor;
    let interrupted = pending_signal;
    let session = SessionController::new(
        &config.sandbox,
        &config.lock_dir,
        &mounts,
        &guest,
        &interrupted,
    )?;
    let report = session.status()?;

    outln!("sandbox: {}", report.name);
    outln!("root:    {}", report.root.display());
    match report.lock.pid {
        Some(pid) => outln!("lock:    {} (pid {})", report.lock.state, pid),
        None => outln!("lock:    {}", report.lock.state),
    }

    outln!(
        "\nMounts ({} of {} mounted):",
        report.mounted_count(),
        report.mounts.len()
    );
    for mount in &report.mounts {
        let state = if mount.mounted { "mounted" } else { "-" };
        let note = match mount.source_exists {
            Some(false) => " (source missing)",
            _ => "",
        };
        outln!("  {:<8} {:<10} {}{}", state, mount.kind, mount.label, note);
    }
    if report.mounts.is_empty() {
        outln!("  none configured");
    }

    if !report.other_mounts.is_empty() {
        outln!("\nOther mounts below the root:");
        for other in &report.other_mounts {
            outln!("  {}", other.display());
        }
    }

    let value = serde_json::to_value(&report).context("Error serializing status")?;
    for key in ["name", "root", "lock", "mounts", "other_mounts"] {
        if let Some(value) = value.get(key) {
            set_json_output(key, value.clone());
        }
    }

    Ok(())
}
