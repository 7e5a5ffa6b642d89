use super::impls::deserialize_level_filter;
use serde::Deserialize;
use std::{collections::HashMap, path::PathBuf};

pub const DEFAULT_USER: &str = "root";
pub const DEFAULT_GUEST_PATH: &str =
    "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";
pub const DEFAULT_LOCK_DIR: &str = "/run/chrootctl";
pub const DEFAULT_LOG_FILE: &str = "/var/log/chrootctl.log";

/// Which kernel filesystems get mounted inside the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialFilesystems {
    pub proc: bool,
    pub sys: bool,
    pub dev: bool,
    pub dev_pts: bool,
    pub dev_shm: bool,
}

impl Default for SpecialFilesystems {
    fn default() -> Self {
        SpecialFilesystems {
            proc: true,
            sys: true,
            dev: true,
            dev_pts: true,
            dev_shm: true,
        }
    }
}

/// Everything one sandbox needs, resolved once at startup and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxConfig {
    pub root: PathBuf,
    pub name: String,
    pub user: String,
    pub bind_dirs: Vec<PathBuf>,
    pub special: SpecialFilesystems,
    pub resolv_conf: bool,
    pub guest_path: String,
}

#[derive(Deserialize, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct PartialConfig {
    #[serde(deserialize_with = "deserialize_level_filter", default)]
    pub log_level: Option<log::LevelFilter>,
    pub root: Option<String>,
    pub name: Option<String>,
    pub user: Option<String>,
    #[serde(rename = "bind", default)]
    pub bind_dirs: Option<Vec<String>>,
    pub proc: Option<bool>,
    pub sys: Option<bool>,
    pub dev: Option<bool>,
    pub dev_pts: Option<bool>,
    pub dev_shm: Option<bool>,
    pub resolv_conf: Option<bool>,
    pub path: Option<String>,
    pub lock_dir: Option<String>,
    pub log_file: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: log::LevelFilter,
    pub lock_dir: PathBuf,
    pub log_file: PathBuf,
    pub sources: HashMap<String, String>,
    pub sandbox: SandboxConfig,
}
