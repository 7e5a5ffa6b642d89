use crate::util::mkdir_within;
use anyhow::{Context, Result};
use log::{debug, warn};
use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use uuid::Uuid;

pub const HOST_RESOLV_CONF: &str = "/etc/resolv.conf";

/// Copies the host resolver config to `<root>/etc/resolv.conf`, replacing it
/// atomically. A symlink already sitting at the destination is replaced, never
/// followed.
pub fn copy_resolv_conf(host_file: &Path, root: &Path) -> Result<()> {
    let contents = std::fs::read(host_file)
        .context(format!("Failed to read {}", host_file.display()))?;

    let etc = root.join("etc");
    mkdir_within(root, &etc)?;

    let destination = etc.join("resolv.conf");
    let tmp = etc.join(format!(".resolv.conf.{}", Uuid::new_v4()));
    let write = || -> Result<()> {
        let mut file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .mode(0o644)
            .open(&tmp)
            .context(format!("Failed to create {}", tmp.display()))?;
        file.write_all(&contents)
            .and_then(|_| file.sync_all())
            .context(format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &destination).context(format!(
            "Failed to move {} into place",
            destination.display()
        ))
    };

    if let Err(e) = write() {
        let _ = std::fs::remove_file(&tmp);
        return Err(e);
    }

    debug!("Copied {} into {}", host_file.display(), destination.display());
    Ok(())
}

/// Missing DNS inside the sandbox is not worth aborting a session over.
pub fn propagate_resolv_conf(root: &Path) {
    if let Err(e) = copy_resolv_conf(Path::new(HOST_RESOLV_CONF), root) {
        warn!("Could not copy {} into the sandbox: {:#}", HOST_RESOLV_CONF, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn test_copy_resolv_conf() {
        let host = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let source = host.path().join("resolv.conf");
        std::fs::write(&source, "nameserver 192.0.2.1\n").unwrap();

        copy_resolv_conf(&source, root.path()).unwrap();

        let copied = root.path().join("etc/resolv.conf");
        assert_eq!(
            std::fs::read_to_string(&copied).unwrap(),
            "nameserver 192.0.2.1\n"
        );
        let mode = std::fs::metadata(&copied).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);

        // No temporary files left behind
        let leftovers: Vec<_> = std::fs::read_dir(root.path().join("etc"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with('.'))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_copy_replaces_symlink_without_following() {
        let host = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let source = host.path().join("resolv.conf");
        std::fs::write(&source, "nameserver 192.0.2.53\n").unwrap();

        let victim = host.path().join("victim");
        std::fs::write(&victim, "untouched").unwrap();
        std::fs::create_dir(root.path().join("etc")).unwrap();
        std::os::unix::fs::symlink(&victim, root.path().join("etc/resolv.conf"))
            .unwrap();

        copy_resolv_conf(&source, root.path()).unwrap();

        assert_eq!(std::fs::read_to_string(&victim).unwrap(), "untouched");
        let copied = root.path().join("etc/resolv.conf");
        assert!(!copied.symlink_metadata().unwrap().file_type().is_symlink());
    }

    #[test]
    fn test_missing_host_file() {
        let root = tempfile::tempdir().unwrap();
        assert!(
            copy_resolv_conf(&root.path().join("nope"), root.path()).is_err()
        );
    }
}
