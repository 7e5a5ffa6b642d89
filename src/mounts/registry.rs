use super::{MountKind, MountPoint};
use crate::config::SandboxConfig;
use log::warn;
use std::path::Path;

/**
 * The mounts of a sandbox in the order they must be established. Nested
 * targets always come after their parent (`dev/pts` after `dev`), and
 * teardown walks the list backwards.
 *
 * Bind directories whose host source is missing are skipped with a warning.
 */
pub fn resolve(config: &SandboxConfig) -> Vec<MountPoint> {
    plan(config, true)
}

/// Like `resolve`, but keeps bind directories whose source has disappeared
/// since they were mounted. Used by `stop` and `status`.
pub fn resolve_all(config: &SandboxConfig) -> Vec<MountPoint> {
    plan(config, false)
}

fn plan(config: &SandboxConfig, skip_missing: bool) -> Vec<MountPoint> {
    let root = config.root.as_path();
    let special = &config.special;

    let mut mounts: Vec<MountPoint> = [
        (special.proc, "proc", MountKind::Proc),
        (special.sys, "sys", MountKind::Sysfs),
        (special.dev, "dev", MountKind::DevBind),
        (special.dev_pts, "dev/pts", MountKind::Devpts),
        (special.dev_shm, "dev/shm", MountKind::Tmpfs),
    ]
    .into_iter()
    .filter(|(enabled, _, _)| *enabled)
    .map(|(_, target, kind)| MountPoint::new(root, Path::new(target), kind))
    .collect();

    for dir in &config.bind_dirs {
        if skip_missing && !dir.is_dir() {
            warn!(
                "Skipping bind directory {}: it does not exist on the host",
                dir.display()
            );
            continue;
        }
        mounts.push(MountPoint::new(root, dir, MountKind::Bind(dir.clone())));
    }

    mounts
}
