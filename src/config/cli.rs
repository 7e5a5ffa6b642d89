use super::resolve_config;
use crate::guest::list_account_names;
use clap::Parser;
use clap_complete::engine::{ArgValueCompleter, CompletionCandidate};

#[derive(Parser, Clone, Debug)]
#[command(version, about, long_about = None,
    override_usage = "\n    chrootctl [OPTIONS] <ACTION> [ACTION_ARGUMENTS...]")]
pub struct Args {
    /**********************/
    /* Flags and settings */
    /**********************/
    /// Set the log level to one of trace, debug, info, warn, or error.
    /// `-v` is shorthand for enabling verbose (trace) logging.
    #[arg(short = 'v',
        long,
        global = true,
        default_missing_value = "trace",
        num_args = 0..=1,
        require_equals = true,
        value_parser = parse_log_level
    )]
    pub log_level: Option<log::LevelFilter>,

    /// Directory holding the pre-populated chroot tree
    #[arg(long, global = true, value_hint = clap::ValueHint::DirPath)]
    pub root: Option<String>,

    /// Logical name of the sandbox, keys the lock file. Defaults to the last
    /// component of the root directory.
    #[arg(long, global = true, value_hint = clap::ValueHint::Other)]
    pub name: Option<String>,

    /// Default guest user for `shell` and `run`. Defaults to `root`.
    #[arg(long = "default-user", global = true, add = ArgValueCompleter::new(guest_user_completion))]
    pub default_user: Option<String>,

    /// Host directories to bind mount at the same path inside the root. Can be
    /// specified multiple times or as a comma-separated list.
    #[arg(
        long,
        global = true,
        value_delimiter = ',',
        action = clap::ArgAction::Append,
        value_hint = clap::ValueHint::DirPath
    )]
    pub bind: Option<Vec<String>>,

    /// Do not mount /proc inside the root
    #[arg(long, global = true, action = clap::ArgAction::SetTrue)]
    pub no_proc: bool,

    /// Do not mount /sys inside the root
    #[arg(long, global = true, action = clap::ArgAction::SetTrue)]
    pub no_sys: bool,

    /// Do not bind the host /dev inside the root
    #[arg(long, global = true, action = clap::ArgAction::SetTrue)]
    pub no_dev: bool,

    /// Do not mount a devpts instance on /dev/pts inside the root
    #[arg(long, global = true, action = clap::ArgAction::SetTrue)]
    pub no_dev_pts: bool,

    /// Do not mount a tmpfs on /dev/shm inside the root
    #[arg(long, global = true, action = clap::ArgAction::SetTrue)]
    pub no_dev_shm: bool,

    /// Do not copy the host's /etc/resolv.conf into the root
    #[arg(long, global = true, action = clap::ArgAction::SetTrue)]
    pub no_resolv_conf: bool,

    /// PATH given to guest commands
    #[arg(long, global = true)]
    pub path: Option<String>,

    /// Directory holding lock files. Defaults to `/run/chrootctl`.
    #[arg(long, global = true, value_hint = clap::ValueHint::DirPath)]
    pub lock_dir: Option<String>,

    /// Append-only log file. Defaults to `/var/log/chrootctl.log`.
    #[arg(long, global = true, value_hint = clap::ValueHint::FilePath)]
    pub log_file: Option<String>,

    /// Formats action output as a JSON blob. Does nothing for guest commands.
    #[arg(long, global = true, action = clap::ArgAction::SetTrue)]
    pub json: bool,

    /// Do not load config files.
    #[arg(long, global = true, action = clap::ArgAction::SetTrue)]
    pub no_config: bool,

    /// Take over the sandbox even if another running process holds its lock.
    #[arg(long, global = true, action = clap::ArgAction::SetTrue)]
    pub force: bool,

    /***************/
    /* Subcommands */
    /***************/
    #[command(subcommand)]
    pub action: Action,
}

#[derive(clap::Subcommand, Clone, Debug)]
#[command(subcommand_help_heading = "Actions")]
pub enum Action {
    /// Mount everything and leave the mounts in place for manual use
    Prepare,

    /// Mount everything, start an interactive shell, and tear down on exit
    Shell {
        /// Guest user to run the shell as
        #[arg(value_name = "USER", add = ArgValueCompleter::new(guest_user_completion))]
        user: Option<String>,
    },

    /// Mount everything, run a command, and tear down on exit
    Run {
        /// Guest user to run the command as
        #[arg(short, long, add = ArgValueCompleter::new(guest_user_completion))]
        user: Option<String>,

        /// The command and its arguments, passed through verbatim
        #[arg(
            value_name = "COMMAND",
            required = true,
            trailing_var_arg = true,
            allow_hyphen_values = true,
            num_args = 1..
        )]
        command: Vec<String>,
    },

    /// Unmount everything and release the lock. Safe to run repeatedly.
    Stop,

    /// Show mount and lock state without changing anything
    Status,

    /// Show the resolved configuration and where each value came from
    Config {
        /// The keys to show
        #[arg(value_name = "KEYS", num_args = 0..)]
        keys: Option<Vec<String>>,
    },
}

pub fn guest_user_completion(
    current: &std::ffi::OsStr,
) -> Vec<CompletionCandidate> {
    let Some(current) = current.to_str() else {
        return vec![];
    };

    // The command line being completed is incomplete, so the root comes from
    // config files and the environment only.
    let cli: Args = match Args::try_parse_from(["chrootctl", "status"]) {
        Ok(cli) => cli,
        Err(_) => return vec![],
    };
    let config = match resolve_config(cli) {
        Ok(config) => config,
        Err(_) => return vec![],
    };

    list_account_names(&config.sandbox.root)
        .into_iter()
        .filter(|name| name.starts_with(current))
        .map(CompletionCandidate::new)
        .collect()
}

fn parse_log_level(s: &str) -> Result<log::LevelFilter, String> {
    s.parse::<log::LevelFilter>().map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_preserves_argument_vector() {
        let args = Args::try_parse_from([
            "chrootctl",
            "--root",
            "/srv/jail",
            "run",
            "--user",
            "builder",
            "sh",
            "-c",
            "echo 'a  b'; ls -la",
        ])
        .unwrap();

        let Action::Run { user, command } = args.action else {
            unreachable!("expected run");
        };
        assert_eq!(user.as_deref(), Some("builder"));
        assert_eq!(command, vec!["sh", "-c", "echo 'a  b'; ls -la"]);
        assert_eq!(args.root.as_deref(), Some("/srv/jail"));
    }

    #[test]
    fn test_run_requires_command() {
        assert!(Args::try_parse_from(["chrootctl", "run"]).is_err());
    }

    #[test]
    fn test_global_flags_after_action() {
        let args = Args::try_parse_from([
            "chrootctl",
            "status",
            "--json",
            "--bind",
            "/srv/a,/srv/b",
            "--bind=/srv/c",
            "--no-dev-shm",
        ])
        .unwrap();
        assert!(matches!(args.action, Action::Status));
        assert!(args.json);
        assert!(args.no_dev_shm);
        assert_eq!(
            args.bind,
            Some(vec![
                "/srv/a".to_string(),
                "/srv/b".to_string(),
                "/srv/c".to_string()
            ])
        );
    }

    #[test]
    fn test_shell_user_is_optional() {
        let args = Args::try_parse_from(["chrootctl", "shell"]).unwrap();
        assert!(matches!(args.action, Action::Shell { user: None }));
        let args =
            Args::try_parse_from(["chrootctl", "shell", "alice"]).unwrap();
        assert!(matches!(
            args.action,
            Action::Shell { user: Some(ref u) } if u == "alice"
        ));
    }
}
