use super::{MountOps, MountPoint};
use crate::error::ChrootError;
use crate::util::mkdir_within;
use anyhow::Result;
use log::{debug, error, info, trace};
use nix::sys::signal::Signal;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct EstablishReport {
    pub mounted: Vec<PathBuf>,
    pub already_mounted: Vec<PathBuf>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReverseReport {
    pub unmounted: Vec<PathBuf>,
    pub skipped: usize,
    pub failures: Vec<(PathBuf, String)>,
}

impl ReverseReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/**
 * Mounts every point in order, skipping targets that are already mount
 * points, so running it twice is harmless. Stops at the first failure; the
 * caller is responsible for reversing whatever was mounted before it.
 *
 * `interrupted` is polled before each step so a termination signal received
 * mid-setup stops further mounts.
 */
pub fn establish<M: MountOps + ?Sized>(
    ops: &M,
    root: &Path,
    mounts: &[MountPoint],
    interrupted: &dyn Fn() -> Option<Signal>,
) -> Result<EstablishReport, ChrootError> {
    let mut report = EstablishReport::default();

    for point in mounts {
        if let Some(signal) = interrupted() {
            return Err(ChrootError::Interrupted(signal));
        }

        let failure = |reason: String| ChrootError::MountFailure {
            target: point.target.clone(),
            reason,
        };

        mkdir_within(root, &point.target)
            .map_err(|e| failure(format!("{:#}", e)))?;

        if ops
            .is_mounted(&point.target)
            .map_err(|e| failure(format!("{:#}", e)))?
        {
            trace!("{} is already mounted", point.target.display());
            report.already_mounted.push(point.target.clone());
            continue;
        }

        ops.mount(point).map_err(|e| failure(format!("{:#}", e)))?;
        report.mounted.push(point.target.clone());
    }

    debug!(
        "Established {} mounts ({} already in place)",
        report.mounted.len(),
        report.already_mounted.len()
    );

    Ok(report)
}

/**
 * Unmounts every point in exactly the reverse of the establish order. A
 * failure is logged and counted and the remaining points are still tried;
 * leaving one kernel filesystem mounted is worse than a noisy log.
 */
pub fn reverse<M: MountOps + ?Sized>(
    ops: &M,
    mounts: &[MountPoint],
) -> ReverseReport {
    let mut report = ReverseReport::default();

    for point in mounts.iter().rev() {
        match ops.is_mounted(&point.target) {
            Ok(false) => {
                report.skipped += 1;
                continue;
            }
            Ok(true) => {}
            // Can't tell, so try anyway
            Err(e) => debug!(
                "Could not tell whether {} is mounted: {:#}",
                point.target.display(),
                e
            ),
        }

        match ops.unmount(&point.target) {
            Ok(()) => report.unmounted.push(point.target.clone()),
            Err(e) => {
                error!("Failed to unmount {}: {:#}", point.target.display(), e);
                report
                    .failures
                    .push((point.target.clone(), format!("{:#}", e)));
            }
        }
    }

    if report.is_clean() {
        debug!("Unmounted {} mounts", report.unmounted.len());
    } else {
        error!(
            "{} of {} unmounts failed",
            report.failures.len(),
            report.failures.len() + report.unmounted.len()
        );
    }

    report
}

/// Logs every mount left below `root`. Returns the leftovers.
pub fn audit<M: MountOps + ?Sized>(ops: &M, root: &Path, why: &str) -> Vec<PathBuf> {
    match ops.mounts_under(root) {
        Ok(mounts) => {
            for mount in &mounts {
                info!("{}: {} is still mounted", why, mount.display());
            }
            mounts
        }
        Err(e) => {
            error!("Failed to read the mount table: {:#}", e);
            vec![]
        }
    }
}
