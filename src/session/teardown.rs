use crate::mounts::{MountOps, MountPoint, ReverseReport, reverse};
use crate::util::lock_record::SandboxLock;
use log::{error, trace, warn};
use std::path::PathBuf;

/**
 * Undoes a session: reverses its mounts, then releases its lock. Runs exactly
 * once, either through `finish` or when dropped on an early return, so no
 * path out of a session can skip it.
 */
pub struct Teardown<'a, M: MountOps + ?Sized> {
    mounts: &'a M,
    points: Vec<MountPoint>,
    /// Mounts found below the root when a stale lock was reclaimed.
    adopted: Vec<PathBuf>,
    lock: Option<SandboxLock>,
    done: bool,
}

impl<'a, M: MountOps + ?Sized> Teardown<'a, M> {
    pub fn new(mounts: &'a M, lock: SandboxLock, adopted: Vec<PathBuf>) -> Self {
        Teardown {
            mounts,
            points: vec![],
            adopted,
            lock: Some(lock),
            done: false,
        }
    }

    /// Sets the mounts to reverse. Must be called before the first mount.
    pub fn track(&mut self, points: &[MountPoint]) {
        self.points = points.to_vec();
    }

    pub fn finish(mut self) -> ReverseReport {
        self.run()
    }

    /// Hands the lock back without undoing anything. Used by `prepare` once
    /// every mount is in place.
    pub fn disarm(mut self) -> Option<SandboxLock> {
        self.done = true;
        self.lock.take()
    }

    fn run(&mut self) -> ReverseReport {
        if self.done {
            return ReverseReport::default();
        }
        self.done = true;
        trace!("Tearing down {} mounts", self.points.len());

        let mut report = reverse(self.mounts, &self.points);

        for target in &self.adopted {
            if !matches!(self.mounts.is_mounted(target), Ok(true)) {
                continue;
            }
            match self.mounts.unmount(target) {
                Ok(()) => report.unmounted.push(target.clone()),
                Err(e) => {
                    error!("Failed to unmount {}: {:#}", target.display(), e);
                    report.failures.push((target.clone(), format!("{:#}", e)));
                }
            }
        }

        if let Some(lock) = self.lock.take() {
            if let Err(e) = lock.release() {
                warn!("Failed to release lock: {:#}", e);
            }
        }

        report
    }
}

impl<M: MountOps + ?Sized> Drop for Teardown<'_, M> {
    fn drop(&mut self) {
        if !self.done {
            trace!("Session ended early, running teardown");
            self.run();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mounts::fake::FakeMounts;
    use crate::mounts::{MountKind, establish};
    use crate::util::lock_record::{LockState, inspect};
    use std::path::Path;

    fn points(root: &Path) -> Vec<MountPoint> {
        vec![
            MountPoint::new(root, Path::new("proc"), MountKind::Proc),
            MountPoint::new(root, Path::new("dev"), MountKind::DevBind),
        ]
    }

    #[test]
    fn test_drop_runs_teardown() {
        let root = tempfile::tempdir().unwrap();
        let locks = tempfile::tempdir().unwrap();
        let ops = FakeMounts::default();
        let points = points(root.path());

        {
            let lock = SandboxLock::acquire(locks.path(), "jail", false).unwrap();
            let mut teardown = Teardown::new(&ops, lock, vec![]);
            teardown.track(&points);
            establish(&ops, root.path(), &points, &|| None).unwrap();
            assert_eq!(ops.mounted().len(), 2);
        }

        assert!(ops.mounted().is_empty());
        assert_eq!(inspect(locks.path(), "jail").unwrap(), LockState::Absent);
    }

    #[test]
    fn test_finish_runs_once() {
        let root = tempfile::tempdir().unwrap();
        let locks = tempfile::tempdir().unwrap();
        let ops = FakeMounts::default();
        let points = points(root.path());

        let lock = SandboxLock::acquire(locks.path(), "jail", false).unwrap();
        let mut teardown = Teardown::new(&ops, lock, vec![]);
        teardown.track(&points);
        establish(&ops, root.path(), &points, &|| None).unwrap();

        let report = teardown.finish();
        assert_eq!(report.unmounted.len(), 2);
        // Two unmounts, not four: drop after finish does nothing
        assert_eq!(ops.log().len(), 4);
    }

    #[test]
    fn test_adopted_mounts_are_reversed() {
        let root = tempfile::tempdir().unwrap();
        let locks = tempfile::tempdir().unwrap();
        let ops = FakeMounts::default();
        let leftover = root.path().join("srv/old");
        ops.preload(leftover.clone());

        let lock = SandboxLock::acquire(locks.path(), "jail", false).unwrap();
        let teardown = Teardown::new(&ops, lock, vec![leftover.clone()]);
        let report = teardown.finish();

        assert_eq!(report.unmounted, vec![leftover]);
        assert!(ops.mounted().is_empty());
    }

    #[test]
    fn test_disarm_keeps_everything() {
        let root = tempfile::tempdir().unwrap();
        let locks = tempfile::tempdir().unwrap();
        let ops = FakeMounts::default();
        let points = points(root.path());

        let lock = SandboxLock::acquire(locks.path(), "jail", false).unwrap();
        let mut teardown = Teardown::new(&ops, lock, vec![]);
        teardown.track(&points);
        establish(&ops, root.path(), &points, &|| None).unwrap();
        teardown.disarm().unwrap().keep();

        assert_eq!(ops.mounted().len(), 2);
        assert!(matches!(
            inspect(locks.path(), "jail").unwrap(),
            LockState::Held(_)
        ));
    }
}
