use super::GuestAccount;

const DEFAULT_TERM: &str = "xterm";

/// What to start inside the sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// The account's login shell, interactive.
    Shell,
    /// An argument vector passed through verbatim.
    Command(Vec<String>),
}

impl Invocation {
    pub fn is_shell(&self) -> bool {
        matches!(self, Invocation::Shell)
    }
}

/**
 * The complete environment of a guest process. Nothing else leaks in from the
 * host; `TERM` is the only value copied over, and only so the terminal keeps
 * working.
 */
pub fn guest_environment(
    account: &GuestAccount,
    guest_path: &str,
    host_term: Option<String>,
    invocation: &Invocation,
) -> Vec<(String, String)> {
    let mut env = vec![
        ("HOME".to_string(), account.home.to_string_lossy().to_string()),
        (
            "TERM".to_string(),
            host_term
                .filter(|term| !term.is_empty())
                .unwrap_or(DEFAULT_TERM.to_string()),
        ),
        ("PATH".to_string(), guest_path.to_string()),
    ];
    if invocation.is_shell() {
        let prompt = if account.is_privileged() {
            r"(chroot) \u@\h:\w# "
        } else {
            r"(chroot) \u@\h:\w$ "
        };
        env.push(("PS1".to_string(), prompt.to_string()));
    }
    env
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::unistd::{Gid, Uid};
    use std::path::PathBuf;

    fn account(uid: u32) -> GuestAccount {
        GuestAccount {
            name: "builder".to_string(),
            uid: Uid::from_raw(uid),
            gid: Gid::from_raw(uid),
            home: PathBuf::from("/home/builder"),
            shell: PathBuf::from("/bin/bash"),
            groups: vec![],
        }
    }

    fn keys(env: &[(String, String)]) -> Vec<&str> {
        env.iter().map(|(k, _)| k.as_str()).collect()
    }

    #[test]
    fn test_command_environment_is_minimal() {
        let env = guest_environment(
            &account(1000),
            "/usr/bin:/bin",
            Some("screen-256color".to_string()),
            &Invocation::Command(vec!["make".to_string()]),
        );
        assert_eq!(keys(&env), vec!["HOME", "TERM", "PATH"]);
        assert_eq!(env[0].1, "/home/builder");
        assert_eq!(env[1].1, "screen-256color");
        assert_eq!(env[2].1, "/usr/bin:/bin");
    }

    #[test]
    fn test_shell_gets_prompt() {
        let env =
            guest_environment(&account(0), "/bin", None, &Invocation::Shell);
        assert_eq!(keys(&env), vec!["HOME", "TERM", "PATH", "PS1"]);
        assert_eq!(env[1].1, DEFAULT_TERM);
        assert!(env[3].1.ends_with("# "));

        let env = guest_environment(
            &account(1000),
            "/bin",
            Some(String::new()),
            &Invocation::Shell,
        );
        assert_eq!(env[1].1, DEFAULT_TERM);
        assert!(env[3].1.ends_with("$ "));
    }
}
