use nix::errno::Errno;
use nix::{sys::signal::kill, unistd::Pid};

/**
 * Whether `pid` names a process that is still running. Zombies count as
 * gone: they hold no resources and will never release a lock themselves.
 */
pub fn is_process_alive(pid: Pid) -> bool {
    if pid.as_raw() <= 0 {
        return false;
    }

    match kill(pid, None) {
        // EPERM means the process exists but belongs to someone else
        Ok(()) | Err(Errno::EPERM) => {}
        Err(_) => return false,
    }

    match std::fs::read_to_string(format!("/proc/{}/stat", pid.as_raw())) {
        Ok(stat) => process_state(&stat) != Some('Z'),
        Err(_) => false,
    }
}

/// The state field of /proc/<pid>/stat. The command name in field two may
/// itself contain spaces and parentheses, so parse from the last `)`.
fn process_state(stat: &str) -> Option<char> {
    let (_, after_comm) = stat.rsplit_once(')')?;
    after_comm.trim_start().chars().next()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_is_alive() {
        assert!(is_process_alive(Pid::this()));
        assert!(is_process_alive(Pid::parent()));
    }

    #[test]
    fn test_invalid_pids_are_dead() {
        assert!(!is_process_alive(Pid::from_raw(0)));
        assert!(!is_process_alive(Pid::from_raw(-1)));
        // above the kernel's pid_max ceiling
        assert!(!is_process_alive(Pid::from_raw(0x7ffffff0)));
    }

    #[test]
    fn test_reaped_child_is_dead() {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = Pid::from_raw(child.id() as i32);
        child.wait().unwrap();
        assert!(!is_process_alive(pid));
    }

    #[test]
    fn test_process_state() {
        assert_eq!(process_state("42 (sleep) S 1 42"), Some('S'));
        assert_eq!(process_state("42 (odd) name) Z 1 42"), Some('Z'));
        assert_eq!(process_state("garbage"), None);
    }
}
