use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use log::{debug, trace, warn};
use nix::fcntl::{Flock, FlockArg};
use nix::unistd::Pid;
use uuid::Uuid;

use crate::error::ChrootError;
use crate::util::is_process_alive;

/// What the lock record for a sandbox currently says.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Absent,
    /// Owned by a process that is still running.
    Held(Pid),
    /// The owner is gone, or the record is unreadable.
    Stale(Option<Pid>),
}

/// Proof that this process owns the lock record of a sandbox. The record is
/// only removed through `release`; `keep` leaves it in place on purpose.
#[derive(Debug)]
pub struct SandboxLock {
    path: PathBuf,
    lock_dir: PathBuf,
    name: String,
    pid: Pid,
    reclaimed_from: Option<Option<Pid>>,
}

pub fn lock_path(lock_dir: &Path, name: &str) -> PathBuf {
    lock_dir.join(format!("{}.lock", name))
}

/** Serializes read-check-write sequences on one record across processes. */
fn guard(lock_dir: &Path, name: &str) -> Result<Flock<File>> {
    let guard_file = lock_dir.join(format!(".{}.guard", name));
    trace!("Acquiring guard {}", guard_file.display());
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(&guard_file)
        .context(format!(
            "Failed to open guard file for sandbox {}",
            name
        ))?;

    Flock::lock(file, FlockArg::LockExclusive)
        .map_err(|(_, e)| anyhow!("Failed to acquire guard: {}", e))
}

pub fn inspect(lock_dir: &Path, name: &str) -> Result<LockState> {
    let path = lock_path(lock_dir, name);
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(LockState::Absent);
        }
        Err(e) => {
            return Err(e).context(format!(
                "Failed to read lock record {}",
                path.display()
            ));
        }
    };

    let pid = contents
        .trim()
        .parse::<i32>()
        .ok()
        .filter(|pid| *pid > 0)
        .map(Pid::from_raw);

    Ok(match pid {
        Some(pid) if is_process_alive(pid) => LockState::Held(pid),
        pid => LockState::Stale(pid),
    })
}

fn write_record(lock_dir: &Path, name: &str, pid: Pid) -> Result<()> {
    let path = lock_path(lock_dir, name);
    let tmp = lock_dir.join(format!(".{}.{}.tmp", name, Uuid::new_v4()));
    let mut file = OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&tmp)
        .context(format!("Failed to create {}", tmp.display()))?;
    writeln!(file, "{}", pid)
        .and_then(|_| file.sync_all())
        .context(format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, &path).context(format!(
        "Failed to move lock record into place at {}",
        path.display()
    ))
}

fn remove_record(lock_dir: &Path, name: &str) -> Result<()> {
    let path = lock_path(lock_dir, name);
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e)
            .context(format!("Failed to remove lock record {}", path.display())),
    }
}

impl SandboxLock {
    /**
     * Takes the lock for `name`. A record owned by another running process
     * makes this fail with `Busy` unless `force` is set. A stale record is
     * taken over with a warning.
     */
    pub fn acquire(
        lock_dir: &Path,
        name: &str,
        force: bool,
    ) -> Result<SandboxLock> {
        std::fs::create_dir_all(lock_dir).context(format!(
            "Failed to create lock directory {}",
            lock_dir.display()
        ))?;
        let _guard = guard(lock_dir, name)?;

        let me = Pid::this();
        let mut reclaimed_from = None;

        match inspect(lock_dir, name)? {
            LockState::Absent => {}
            LockState::Held(pid) if pid == me => {
                debug!("Lock for sandbox '{}' already held by us", name);
            }
            LockState::Held(pid) => {
                if !force {
                    return Err(ChrootError::Busy {
                        name: name.to_string(),
                        pid: pid.as_raw(),
                    }
                    .into());
                }
                warn!(
                    "Forcibly taking the lock of sandbox '{}' from running process {}",
                    name, pid
                );
            }
            LockState::Stale(pid) => {
                match pid {
                    Some(pid) => warn!(
                        "Reclaiming stale lock of sandbox '{}' left by process {} which is no longer running",
                        name, pid
                    ),
                    None => warn!(
                        "Reclaiming unreadable lock record of sandbox '{}'",
                        name
                    ),
                }
                reclaimed_from = Some(pid);
            }
        }

        write_record(lock_dir, name, me)?;
        trace!("Acquired lock {}", lock_path(lock_dir, name).display());

        Ok(SandboxLock {
            path: lock_path(lock_dir, name),
            lock_dir: lock_dir.to_path_buf(),
            name: name.to_string(),
            pid: me,
            reclaimed_from,
        })
    }

    /// `Some(previous owner)` when acquiring took over a stale record.
    pub fn reclaimed_from(&self) -> Option<Option<Pid>> {
        self.reclaimed_from
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Removes the record, unless some other running process has taken it
    /// over since, in which case it is left alone.
    pub fn release(self) -> Result<()> {
        let _guard = guard(&self.lock_dir, &self.name)?;
        match inspect(&self.lock_dir, &self.name)? {
            LockState::Absent => {
                debug!("Lock record {} already removed", self.path.display());
                Ok(())
            }
            LockState::Held(pid) if pid != self.pid => {
                warn!(
                    "Lock of sandbox '{}' now belongs to running process {}, leaving it in place",
                    self.name, pid
                );
                Ok(())
            }
            LockState::Held(_) | LockState::Stale(_) => {
                trace!("Releasing lock {}", self.path.display());
                remove_record(&self.lock_dir, &self.name)
            }
        }
    }

    /// Leaves the record on disk after this process exits. The next session
    /// will see it as stale and `stop` will remove it.
    pub fn keep(self) {
        trace!("Keeping lock record {}", self.path.display());
    }
}

/**
 * Removes the record for `name` on behalf of `stop`. A record owned by another
 * running process is never removed.
 */
pub fn clear(lock_dir: &Path, name: &str) -> Result<()> {
    if !lock_dir.exists() {
        return Ok(());
    }
    let _guard = guard(lock_dir, name)?;
    match inspect(lock_dir, name)? {
        LockState::Absent => Ok(()),
        LockState::Held(pid) if pid != Pid::this() => {
            warn!(
                "Lock of sandbox '{}' is held by running process {}, leaving it in place",
                name, pid
            );
            Ok(())
        }
        LockState::Held(_) | LockState::Stale(_) => {
            debug!("Removing lock record of sandbox '{}'", name);
            remove_record(lock_dir, name)
        }
    }
}
