use super::status::{StatusReport, mount_status, other_mounts};
use super::teardown::Teardown;
use crate::config::SandboxConfig;
use crate::error::ChrootError;
use crate::guest::{GuestExecutor, Invocation, lookup_account};
use crate::mounts::{
    EstablishReport, MountOps, ReverseReport, audit, establish,
    propagate_resolv_conf, registry,
};
use crate::util::lock_record::{self, LockState, SandboxLock};
use anyhow::Result;
use log::{debug, error, info, trace, warn};
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use std::path::{Path, PathBuf};

/// Where a session is in its lifecycle. Process local, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Locked,
    Mounted,
    Active,
    Unmounting,
    Unlocked,
}

#[derive(Debug)]
pub struct StopReport {
    pub reverse: ReverseReport,
    /// Mounts still present below the root after reversing.
    pub leftovers: Vec<PathBuf>,
}

/**
 * Sequences one sandbox session: lock, mount, run the guest, unmount, unlock.
 * Every path that takes the lock hands it to a `Teardown` before the first
 * mount, so leaving the session by any route undoes it.
 */
pub struct SessionController<'a, M: MountOps + ?Sized, G: GuestExecutor + ?Sized> {
    config: &'a SandboxConfig,
    lock_dir: &'a Path,
    mounts: &'a M,
    guest: &'a G,
    force: bool,
    interrupted: &'a dyn Fn() -> Option<Signal>,
    state: SessionState,
}

impl<'a, M: MountOps + ?Sized, G: GuestExecutor + ?Sized> SessionController<'a, M, G> {
    pub fn new(
        config: &'a SandboxConfig,
        lock_dir: &'a Path,
        mounts: &'a M,
        guest: &'a G,
        interrupted: &'a dyn Fn() -> Option<Signal>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(SessionController {
            config,
            lock_dir,
            mounts,
            guest,
            force: false,
            interrupted,
            state: SessionState::Idle,
        })
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn transition(&mut self, next: SessionState) {
        trace!("Session {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Takes the lock, auditing leftovers when it was reclaimed from a dead
    /// session.
    fn lock(&mut self) -> Result<(SandboxLock, Vec<PathBuf>)> {
        let lock = SandboxLock::acquire(self.lock_dir, &self.config.name, self.force)?;
        self.transition(SessionState::Locked);

        let adopted = match lock.reclaimed_from() {
            Some(_) => audit(
                self.mounts,
                &self.config.root,
                "Left behind by a previous session",
            ),
            None => vec![],
        };
        Ok((lock, adopted))
    }

    /// Mounts everything and leaves it in place, along with the lock record.
    pub fn prepare(&mut self) -> Result<EstablishReport> {
        let result = self.try_prepare();
        if result.is_err() {
            self.transition(SessionState::Idle);
        }
        result
    }

    fn try_prepare(&mut self) -> Result<EstablishReport> {
        let (lock, adopted) = self.lock()?;
        let mut teardown = Teardown::new(self.mounts, lock, adopted);
        let points = registry::resolve(self.config);
        teardown.track(&points);

        let report = establish(self.mounts, &self.config.root, &points, self.interrupted)?;
        if self.config.resolv_conf {
            propagate_resolv_conf(&self.config.root);
        }
        self.transition(SessionState::Mounted);

        if let Some(lock) = teardown.disarm() {
            debug!("Keeping lock record {}", lock.path().display());
            lock.keep();
        }
        info!(
            "Sandbox '{}' prepared at {}",
            self.config.name,
            self.config.root.display()
        );
        Ok(report)
    }

    pub fn shell(&mut self, user: &str) -> Result<i32> {
        self.ephemeral(user, Invocation::Shell)
    }

    pub fn run(&mut self, user: &str, argv: Vec<String>) -> Result<i32> {
        if argv.is_empty() {
            return Err(ChrootError::FatalConfig("no command given".into()).into());
        }
        self.ephemeral(user, Invocation::Command(argv))
    }

    fn ephemeral(&mut self, user: &str, invocation: Invocation) -> Result<i32> {
        let result = self.try_ephemeral(user, invocation);
        self.transition(SessionState::Idle);
        result
    }

    fn try_ephemeral(&mut self, user: &str, invocation: Invocation) -> Result<i32> {
        let account = lookup_account(&self.config.root, user)?;

        let (lock, adopted) = self.lock()?;
        let mut teardown = Teardown::new(self.mounts, lock, adopted);
        let points = registry::resolve(self.config);
        teardown.track(&points);

        establish(self.mounts, &self.config.root, &points, self.interrupted)?;
        if self.config.resolv_conf {
            propagate_resolv_conf(&self.config.root);
        }
        self.transition(SessionState::Mounted);

        self.transition(SessionState::Active);
        let status = self.guest.execute(
            &self.config.root,
            &self.config.guest_path,
            &account,
            &invocation,
        );

        self.transition(SessionState::Unmounting);
        let report = teardown.finish();
        self.transition(SessionState::Unlocked);
        if !report.is_clean() {
            error!(
                "Sandbox '{}' was not fully torn down, run `chrootctl stop` to retry",
                self.config.name
            );
        }

        status
    }

    /**
     * Unmounts everything this configuration could have mounted and removes
     * the lock record. Safe to run any number of times.
     */
    pub fn stop(&mut self) -> Result<StopReport> {
        match lock_record::inspect(self.lock_dir, &self.config.name)? {
            LockState::Held(pid) if pid != Pid::this() => {
                if !self.force {
                    return Err(ChrootError::Busy {
                        name: self.config.name.clone(),
                        pid: pid.as_raw(),
                    }
                    .into());
                }
                warn!(
                    "Stopping sandbox '{}' while running process {} still holds it",
                    self.config.name, pid
                );
            }
            state => debug!("Lock state before stop: {:?}", state),
        }

        self.transition(SessionState::Unmounting);
        let points = registry::resolve_all(self.config);
        let reverse = crate::mounts::reverse(self.mounts, &points);

        lock_record::clear(self.lock_dir, &self.config.name)?;
        self.transition(SessionState::Unlocked);

        let leftovers = audit(self.mounts, &self.config.root, "After stop");
        for leftover in &leftovers {
            warn!(
                "{} is still mounted below the sandbox root",
                leftover.display()
            );
        }
        self.transition(SessionState::Idle);

        Ok(StopReport { reverse, leftovers })
    }

    /// Reports mount and lock state without changing either.
    pub fn status(&self) -> Result<StatusReport> {
        let points = registry::resolve_all(self.config);
        let lock = lock_record::inspect(self.lock_dir, &self.config.name)?;
        Ok(StatusReport {
            name: self.config.name.clone(),
            root: self.config.root.clone(),
            lock: lock.into(),
            mounts: points
                .iter()
                .map(|point| mount_status(self.mounts, point))
                .collect(),
            other_mounts: other_mounts(self.mounts, &self.config.root, &points),
        })
    }
}
