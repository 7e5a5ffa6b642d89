use nix::mount::MsFlags;
use std::fmt;
use std::path::{Path, PathBuf};

/// Size of the /dev/shm tmpfs, the same as docker's default.
const SHM_OPTIONS: &str = "mode=1777,size=64m";
const DEVPTS_OPTIONS: &str = "newinstance,ptmxmode=0666,mode=0620,gid=5";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountKind {
    Proc,
    Sysfs,
    DevBind,
    Devpts,
    Tmpfs,
    /// Bind of a host directory onto the same path inside the root.
    Bind(PathBuf),
}

/// Arguments handed to mount(2) for one kind.
#[derive(Debug, PartialEq, Eq)]
pub struct MountParams<'a> {
    pub source: &'a Path,
    pub fstype: Option<&'static str>,
    pub flags: MsFlags,
    pub data: Option<&'static str>,
}

impl MountKind {
    /// The fixed option set of each kind. None of these are configurable.
    pub fn params(&self) -> MountParams<'_> {
        let hardened = MsFlags::MS_NOSUID | MsFlags::MS_NODEV | MsFlags::MS_NOEXEC;
        match self {
            MountKind::Proc => MountParams {
                source: Path::new("proc"),
                fstype: Some("proc"),
                flags: hardened,
                data: None,
            },
            MountKind::Sysfs => MountParams {
                source: Path::new("sysfs"),
                fstype: Some("sysfs"),
                flags: hardened | MsFlags::MS_RDONLY,
                data: None,
            },
            MountKind::DevBind => MountParams {
                source: Path::new("/dev"),
                fstype: None,
                flags: MsFlags::MS_BIND,
                data: None,
            },
            MountKind::Devpts => MountParams {
                source: Path::new("devpts"),
                fstype: Some("devpts"),
                flags: MsFlags::MS_NOSUID | MsFlags::MS_NOEXEC,
                data: Some(DEVPTS_OPTIONS),
            },
            MountKind::Tmpfs => MountParams {
                source: Path::new("shm"),
                fstype: Some("tmpfs"),
                flags: hardened,
                data: Some(SHM_OPTIONS),
            },
            MountKind::Bind(source) => MountParams {
                source: source.as_path(),
                fstype: None,
                flags: MsFlags::MS_BIND,
                data: None,
            },
        }
    }
}

impl fmt::Display for MountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MountKind::Proc => write!(f, "proc"),
            MountKind::Sysfs => write!(f, "sysfs"),
            MountKind::DevBind => write!(f, "dev-bind"),
            MountKind::Devpts => write!(f, "devpts"),
            MountKind::Tmpfs => write!(f, "tmpfs"),
            MountKind::Bind(source) => write!(f, "bind {}", source.display()),
        }
    }
}

/// One mount of a sandbox. `label` is the target relative to the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPoint {
    pub label: String,
    pub target: PathBuf,
    pub kind: MountKind,
}

impl MountPoint {
    pub fn new(root: &Path, relative: &Path, kind: MountKind) -> MountPoint {
        let relative = relative.strip_prefix("/").unwrap_or(relative);
        MountPoint {
            label: relative.to_string_lossy().to_string(),
            target: root.join(relative),
            kind,
        }
    }
}
