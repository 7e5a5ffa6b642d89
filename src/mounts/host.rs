use super::MountPoint;
use crate::util::{find_in_path, get_mounts, mount, read_mount_table, unmount};
use anyhow::Result;
use log::{debug, trace, warn};
use nix::mount::MsFlags;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// The kernel side of the orchestrator. Everything that touches real mount
/// state goes through here.
pub trait MountOps {
    fn is_mounted(&self, target: &Path) -> Result<bool>;
    fn mount(&self, point: &MountPoint) -> Result<()>;
    fn unmount(&self, target: &Path) -> Result<()>;
    /// Every mount at or below `root`, deepest first.
    fn mounts_under(&self, root: &Path) -> Result<Vec<PathBuf>>;
}

/// How mount points are detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountQuery {
    /// util-linux `mountpoint`
    Tool(PathBuf),
    /// Scanning the live mount table ourselves
    MountTable,
}

pub struct HostMounts {
    query: MountQuery,
}

/// `mountpoint -q` exits with this when the path is not a mount point.
const MOUNTPOINT_NOT_MOUNTED: i32 = 32;

impl HostMounts {
    pub fn detect() -> HostMounts {
        let search_path = std::env::var("PATH")
            .unwrap_or("/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin".into());
        let query = match find_in_path(Path::new("/"), &search_path, "mountpoint") {
            Some(tool) => {
                trace!("Using {} to detect mount points", tool.display());
                MountQuery::Tool(tool)
            }
            None => {
                debug!(
                    "mountpoint tool not found, falling back to scanning the mount table"
                );
                MountQuery::MountTable
            }
        };
        Self::with_query(query)
    }

    pub fn with_query(query: MountQuery) -> HostMounts {
        HostMounts { query }
    }

    fn listed_in_mount_table(target: &Path) -> Result<bool> {
        let target = target
            .canonicalize()
            .unwrap_or_else(|_| target.to_path_buf());
        Ok(read_mount_table()?.iter().any(|mnt_dir| *mnt_dir == target))
    }
}

impl MountOps for HostMounts {
    fn is_mounted(&self, target: &Path) -> Result<bool> {
        if !target.exists() {
            return Ok(false);
        }

        match &self.query {
            MountQuery::MountTable => Self::listed_in_mount_table(target),
            MountQuery::Tool(tool) => {
                let status = Command::new(tool)
                    .arg("-q")
                    .arg("--")
                    .arg(target)
                    .stdin(Stdio::null())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .status();
                match status.map(|status| status.code()) {
                    Ok(Some(0)) => Ok(true),
                    Ok(Some(MOUNTPOINT_NOT_MOUNTED)) => Ok(false),
                    other => {
                        debug!(
                            "{} gave no answer for {} ({:?}), scanning the mount table",
                            tool.display(),
                            target.display(),
                            other
                        );
                        Self::listed_in_mount_table(target)
                    }
                }
            }
        }
    }

    fn mount(&self, point: &MountPoint) -> Result<()> {
        let params = point.kind.params();
        debug!("Mounting {} on {}", point.kind, point.target.display());
        mount(
            Some(params.source),
            &point.target,
            params.fstype,
            params.flags,
            params.data,
        )?;

        // A bind of a shared mount joins its peer group, and dev/pts mounted
        // on top of the /dev bind would show up on the host's /dev/pts
        if params.flags.contains(MsFlags::MS_BIND) {
            mount(
                None::<&str>,
                &point.target,
                None::<&str>,
                MsFlags::MS_PRIVATE,
                None::<&str>,
            )?;
        }
        Ok(())
    }

    fn unmount(&self, target: &Path) -> Result<()> {
        debug!("Unmounting {}", target.display());
        if unmount(target)? {
            warn!(
                "{} was busy and has been lazily detached",
                target.display()
            );
        }
        Ok(())
    }

    fn mounts_under(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        get_mounts(&root)
    }
}
