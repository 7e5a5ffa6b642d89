use super::{GuestAccount, Invocation, guest_environment};
use crate::error::ChrootError;
use crate::util::signals::{needs_forwarding, take_signal};
use crate::util::{drop_privileges, find_in_path, shell_join, within};
use anyhow::{Context, Result, anyhow};
use log::{debug, error, info, trace};
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, chdir, chroot, execve, fork};
use std::convert::Infallible;
use std::ffi::{CStr, CString};
use std::path::{Path, PathBuf};

/// Exit status used when the guest program cannot be started at all.
pub const EXIT_NOT_EXECUTABLE: i32 = 127;

/// Runs something inside an established sandbox and reports its exit status.
pub trait GuestExecutor {
    fn execute(
        &self,
        root: &Path,
        guest_path: &str,
        account: &GuestAccount,
        invocation: &Invocation,
    ) -> Result<i32>;
}

/// The real executor: fork, chroot, drop privileges, exec.
pub struct ChrootExecutor;

/// A resolved guest program: the path to exec inside the root and the
/// argument vector, argv[0] included.
#[derive(Debug, PartialEq, Eq)]
pub struct GuestProgram {
    pub path: PathBuf,
    pub argv: Vec<String>,
}

/**
 * Works out what to exec. A program named without a `/` is searched along the
 * guest `PATH` inside the root, never on the host. A program that isn't
 * there is `MissingTool`.
 */
pub fn resolve_program(
    root: &Path,
    guest_path: &str,
    account: &GuestAccount,
    invocation: &Invocation,
) -> Result<GuestProgram, ChrootError> {
    let argv = match invocation {
        Invocation::Shell => vec![
            account.shell.to_string_lossy().to_string(),
            "-i".to_string(),
        ],
        Invocation::Command(argv) => argv.clone(),
    };
    let Some(program) = argv.first() else {
        return Err(ChrootError::FatalConfig("empty command".to_string()));
    };

    let host_path = find_in_path(root, guest_path, program).ok_or_else(|| {
        ChrootError::MissingTool(format!(
            "{} (not found inside {})",
            program,
            root.display()
        ))
    })?;
    let path = Path::new("/").join(
        host_path
            .strip_prefix(root)
            .unwrap_or(host_path.as_path()),
    );

    Ok(GuestProgram { path, argv })
}

fn to_cstrings<I, S>(items: I) -> Result<Vec<CString>>
where
    I: IntoIterator<Item = S>,
    S: Into<Vec<u8>>,
{
    items
        .into_iter()
        .map(|item| CString::new(item).context("argument contains a NUL byte"))
        .collect()
}

/// Everything below runs in the forked child and must not return on success.
fn enter_and_exec(
    root: &Path,
    account: &GuestAccount,
    path: &CStr,
    argv: &[CString],
    env: &[CString],
) -> Result<Infallible> {
    chroot(root).context(format!("failed to chroot to {}", root.display()))?;
    if chdir(&account.home).is_err() {
        trace!(
            "Home {} missing inside the sandbox, starting in /",
            account.home.display()
        );
        chdir("/").context("failed to chdir to /")?;
    }

    if !account.is_privileged() {
        drop_privileges(account.uid, account.gid, &account.groups).context(
            format!(
                "failed to drop privileges to uid/gid: {}/{}",
                account.uid, account.gid
            ),
        )?;
    }

    execve(path, argv, env).map_err(|e| {
        anyhow!("Failed to execute {}: {}", path.to_string_lossy(), e)
    })
}

/// Waits for the guest, passing on any terminating signal we catch.
fn wait_for_guest(child: Pid) -> Result<i32> {
    loop {
        if let Some(signal) = take_signal() {
            if needs_forwarding(signal) {
                debug!("Forwarding {} to guest process {}", signal, child);
                let _ = kill(child, signal);
            } else {
                trace!("Guest process {} got {} from the terminal", child, signal);
            }
        }

        match waitpid(child, None) {
            Ok(WaitStatus::Exited(_, code)) => return Ok(code),
            Ok(WaitStatus::Signaled(_, signal, _)) => {
                debug!("Guest process {} killed by {}", child, signal);
                return Ok(128 + signal as i32);
            }
            Ok(_) | Err(Errno::EINTR) => continue,
            Err(e) => {
                return Err(anyhow!(
                    "Failed to wait for guest process {}: {}",
                    child,
                    e
                ));
            }
        }
    }
}

impl GuestExecutor for ChrootExecutor {
    fn execute(
        &self,
        root: &Path,
        guest_path: &str,
        account: &GuestAccount,
        invocation: &Invocation,
    ) -> Result<i32> {
        let program = resolve_program(root, guest_path, account, invocation)?;
        let env = guest_environment(
            account,
            guest_path,
            std::env::var("TERM").ok(),
            invocation,
        );

        info!(
            "Running `{}` as {} in {}",
            shell_join(&program.argv),
            account.name,
            root.display()
        );

        // Allocate before forking
        let path = CString::new(program.path.to_string_lossy().as_bytes())
            .context("program path contains a NUL byte")?;
        let argv = to_cstrings(program.argv.iter().map(String::as_str))?;
        let env =
            to_cstrings(env.iter().map(|(key, value)| format!("{}={}", key, value)))?;

        match unsafe { fork() }.context("failed to fork")? {
            ForkResult::Parent { child } => {
                trace!("Guest process is {}", child);
                let status = wait_for_guest(child)?;
                debug!("Guest exited with status {}", status);
                Ok(status)
            }
            ForkResult::Child => {
                let Err(e) = enter_and_exec(root, account, &path, &argv, &env);
                error!(
                    "{:#} (in {})",
                    e,
                    within(root, &program.path).display()
                );
                // Skip atexit handlers and buffers inherited from the parent
                unsafe { libc::_exit(EXIT_NOT_EXECUTABLE) }
            }
        }
    }
}
