use anyhow::Result;
use rstest::*;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

const PASSWD: &str = "\
root:x:0:0:root:/root:/bin/sh
builder:x:1000:1000:Builder:/home/builder:/bin/sh
";

const GROUP: &str = "\
root:x:0:
builder:x:1000:
";

/// Host directories bound into the test root so that it has a working shell.
pub const HOST_TOOLS: &str = "/usr,/bin,/lib,/lib64";

pub fn is_root() -> bool {
    nix::unistd::geteuid().is_root()
}

pub struct ChrootManager {
    pub root: PathBuf,
    pub lock_dir: PathBuf,
    pub log_file: PathBuf,
    pub last_stdout: String,
    pub last_stderr: String,
    pub last_code: Option<i32>,
    pub no_default_options: bool,
    bin: PathBuf,
    scratch: Option<TempDir>,
}

impl ChrootManager {
    pub fn new() -> Result<Self> {
        let scratch = tempfile::tempdir()?;
        let root = scratch.path().join("jail");
        std::fs::create_dir_all(root.join("etc"))?;
        std::fs::write(root.join("etc/passwd"), PASSWD)?;
        std::fs::write(root.join("etc/group"), GROUP)?;

        Ok(Self {
            root: root.canonicalize()?,
            lock_dir: scratch.path().join("locks"),
            log_file: scratch.path().join("chrootctl.log"),
            last_stdout: String::new(),
            last_stderr: String::new(),
            last_code: None,
            no_default_options: false,
            bin: PathBuf::from(env!("CARGO_BIN_EXE_chrootctl")),
            scratch: Some(scratch),
        })
    }

    pub fn lock_file(&self) -> PathBuf {
        self.lock_dir.join("jail.lock")
    }

    pub fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.bin);
        // Keep the caller's own config files and environment out of it
        cmd.env_remove("CHROOTCTL_ROOT")
            .env_remove("CHROOTCTL_NAME")
            .env_remove("CHROOTCTL_BIND")
            .env_remove("CHROOTCTL_LOG_LEVEL")
            .env_remove("COMPLETE");
        if !self.no_default_options {
            let defaults = [
                ("--no-config", String::new()),
                ("--root", self.root.display().to_string()),
                ("--lock-dir", self.lock_dir.display().to_string()),
                ("--log-file", self.log_file.display().to_string()),
            ];
            for (flag, value) in defaults {
                if args.iter().any(|arg| arg.starts_with(flag)) {
                    continue;
                }
                if value.is_empty() {
                    cmd.arg(flag);
                } else {
                    cmd.arg(format!("{}={}", flag, value));
                }
            }
        }
        cmd.args(args);
        cmd
    }

    /// Runs the binary and returns its exit code, or -1 when killed.
    pub fn code(&mut self, args: &[&str]) -> i32 {
        let mut cmd = self.command(args);
        println!(
            "Running command: {} {}",
            cmd.get_program().to_string_lossy(),
            cmd.get_args()
                .map(|c| c.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );
        let output = match cmd.output() {
            Ok(output) => output,
            Err(e) => {
                self.last_stderr = e.to_string();
                self.last_code = None;
                return -1;
            }
        };
        self.last_stdout = String::from_utf8_lossy(&output.stdout).to_string();
        self.last_stderr = String::from_utf8_lossy(&output.stderr).to_string();
        self.last_code = output.status.code();
        println!("stdout: {}", self.last_stdout);
        println!("stderr: {}", self.last_stderr);
        self.last_code.unwrap_or(-1)
    }

    pub fn pass(&mut self, args: &[&str]) -> bool {
        self.code(args) == 0
    }

    pub fn xfail(&mut self, args: &[&str]) -> bool {
        let code = self.code(args);
        code != 0 && code != -1
    }

    pub fn json(&mut self, args: &[&str]) -> Result<serde_json::Value> {
        let mut full = vec!["--json"];
        full.extend_from_slice(args);
        self.code(&full);
        Ok(serde_json::from_str(&self.last_stdout)?)
    }

    pub fn is_mounted(&self, relative: &str) -> bool {
        let target = self.root.join(relative);
        std::fs::read_to_string("/proc/self/mounts")
            .unwrap_or_default()
            .lines()
            .filter_map(|line| line.split_whitespace().nth(1))
            .any(|mnt| Path::new(mnt) == target)
    }

    pub fn mounts_below_root(&self) -> Vec<String> {
        std::fs::read_to_string("/proc/self/mounts")
            .unwrap_or_default()
            .lines()
            .filter_map(|line| line.split_whitespace().nth(1))
            .filter(|mnt| Path::new(mnt).starts_with(&self.root))
            .map(String::from)
            .collect()
    }
}

impl Drop for ChrootManager {
    fn drop(&mut self) {
        if is_root() {
            self.no_default_options = false;
            let bind = format!("--bind={}", HOST_TOOLS);
            if !self.pass(&[&bind, "--force", "stop"]) {
                eprintln!("Failed to stop test sandbox: {}", self.last_stderr);
            }
        }

        // Never recursively delete through a mount that is still bound to a
        // host directory
        let leftovers = self.mounts_below_root();
        if !leftovers.is_empty() {
            if let Some(scratch) = self.scratch.take() {
                let path = scratch.into_path();
                eprintln!(
                    "Leaving {} in place, still mounted: {}",
                    path.display(),
                    leftovers.join(", ")
                );
            }
        }
    }
}

#[fixture]
pub fn chroot() -> ChrootManager {
    #[allow(clippy::expect_used)]
    ChrootManager::new().expect("Failed to set up test sandbox root")
}
