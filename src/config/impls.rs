use super::structs::{SandboxConfig, SpecialFilesystems};
use crate::error::ChrootError;

use serde::Deserialize;
use std::{
    fmt::{self, Display},
    path::{Component, Path, PathBuf},
    str::FromStr,
};

/// Host directories that must never become a sandbox root.
const DENIED_ROOTS: [&str; 16] = [
    "/", "/root", "/home", "/etc", "/usr", "/bin", "/sbin", "/lib", "/lib64",
    "/boot", "/dev", "/proc", "/sys", "/var", "/run", "/tmp",
];

/// Guest directories the special filesystems are mounted on. Binds land at
/// the same path inside the root, so they must stay clear of these.
const KERNEL_MOUNT_DIRS: [&str; 3] = ["/proc", "/sys", "/dev"];

impl SandboxConfig {
    /// Checks every invariant of the configuration. Called when the config is
    /// resolved and again by each session entry point, before any lock or
    /// mount is touched.
    pub fn validate(&self) -> Result<(), ChrootError> {
        // First, so that `--root=/` is reported as a protected directory
        // rather than through the empty name derived from it
        check_root_path(&self.root)?;

        if self.name.is_empty()
            || self.name == "."
            || self.name == ".."
            || self.name.contains('/')
        {
            return Err(ChrootError::FatalConfig(format!(
                "invalid sandbox name: {:?}",
                self.name
            )));
        }

        if self.user.is_empty() || self.user.contains(':') {
            return Err(ChrootError::FatalConfig(format!(
                "invalid guest user: {:?}",
                self.user
            )));
        }

        for dir in &self.bind_dirs {
            if !dir.is_absolute() {
                return Err(ChrootError::FatalConfig(format!(
                    "bind directory {} is not an absolute path",
                    dir.display()
                )));
            }
            if normalize(dir) == Path::new("/") {
                return Err(ChrootError::FatalConfig(
                    "refusing to bind mount the host root directory".into(),
                ));
            }
            if let Some(kernel) = KERNEL_MOUNT_DIRS
                .iter()
                .find(|kernel| normalize(dir).starts_with(kernel))
            {
                return Err(ChrootError::FatalConfig(format!(
                    "bind directory {} overlaps the kernel filesystem mounted at {}",
                    dir.display(),
                    kernel
                )));
            }
        }

        Ok(())
    }
}

impl SpecialFilesystems {
    pub fn none() -> Self {
        SpecialFilesystems {
            proc: false,
            sys: false,
            dev: false,
            dev_pts: false,
            dev_shm: false,
        }
    }
}

impl Display for SpecialFilesystems {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let enabled: Vec<&str> = [
            (self.proc, "proc"),
            (self.sys, "sys"),
            (self.dev, "dev"),
            (self.dev_pts, "dev/pts"),
            (self.dev_shm, "dev/shm"),
        ]
        .iter()
        .filter(|(on, _)| *on)
        .map(|(_, name)| *name)
        .collect();
        write!(f, "{}", enabled.join(","))
    }
}

fn check_root_path(root: &Path) -> Result<(), ChrootError> {
    if !root.is_absolute() {
        return Err(ChrootError::FatalConfig(format!(
            "sandbox root {} is not an absolute path",
            root.display()
        )));
    }

    let lexical = normalize(root);
    if is_denied(&lexical) {
        return Err(ChrootError::FatalConfig(format!(
            "sandbox root {} is a protected host directory",
            root.display()
        )));
    }

    // A symlink pointing at a protected directory is just as dangerous.
    let resolved = root.canonicalize().map_err(|e| {
        ChrootError::FatalConfig(format!(
            "sandbox root {} is not accessible: {}",
            root.display(),
            e
        ))
    })?;
    if is_denied(&resolved) {
        return Err(ChrootError::FatalConfig(format!(
            "sandbox root {} resolves to protected host directory {}",
            root.display(),
            resolved.display()
        )));
    }

    if !resolved.is_dir() {
        return Err(ChrootError::FatalConfig(format!(
            "sandbox root {} is not a directory",
            root.display()
        )));
    }

    Ok(())
}

fn is_denied(path: &Path) -> bool {
    DENIED_ROOTS.iter().any(|denied| path == Path::new(denied))
}

/// Lexically resolves `.` and `..` and drops trailing slashes. `..` never
/// climbs above `/`.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::RootDir => out.push("/"),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
            Component::Prefix(_) => {}
        }
    }
    out
}

pub(crate) fn deserialize_level_filter<'de, D>(
    deserializer: D,
) -> Result<Option<log::LevelFilter>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: Option<String> = Option::deserialize(deserializer)?;
    s.map_or(Ok(None), |s| {
        log::LevelFilter::from_str(&s)
            .map(Some)
            .map_err(serde::de::Error::custom)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_GUEST_PATH;

    fn config_for(root: &Path) -> SandboxConfig {
        SandboxConfig {
            root: root.to_path_buf(),
            name: "jail".to_string(),
            user: "root".to_string(),
            bind_dirs: vec![],
            special: SpecialFilesystems::default(),
            resolv_conf: true,
            guest_path: DEFAULT_GUEST_PATH.to_string(),
        }
    }

    #[test]
    fn test_validate_accepts_plain_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(config_for(dir.path()).validate().is_ok());
    }

    #[test]
    fn test_validate_denies_sensitive_roots() {
        for root in ["/", "/root", "/home", "/etc", "/etc/", "/usr/../etc"] {
            let result = config_for(Path::new(root)).validate();
            assert!(
                matches!(result, Err(ChrootError::FatalConfig(_))),
                "{} should be rejected",
                root
            );
        }
    }

    #[test]
    fn test_validate_denies_symlink_to_sensitive_root() {
        let dir = tempfile::tempdir().unwrap();
        let link = dir.path().join("sneaky");
        std::os::unix::fs::symlink("/etc", &link).unwrap();
        assert!(matches!(
            config_for(&link).validate(),
            Err(ChrootError::FatalConfig(_))
        ));
    }

    #[test]
    fn test_validate_rejects_relative_and_missing_roots() {
        assert!(config_for(Path::new("relative/root")).validate().is_err());
        assert!(
            config_for(Path::new("/nonexistent-chrootctl-root"))
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_validate_names_and_binds() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_for(dir.path());

        config.name = "../jail".to_string();
        assert!(config.validate().is_err());
        config.name = "..".to_string();
        assert!(config.validate().is_err());
        config.name = "jail.v2".to_string();
        assert!(config.validate().is_ok());

        config.bind_dirs = vec![PathBuf::from("relative")];
        assert!(config.validate().is_err());
        config.bind_dirs = vec![PathBuf::from("/srv/../")];
        assert!(config.validate().is_err());
        config.bind_dirs = vec![PathBuf::from("/srv/data")];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_binds_over_kernel_filesystems() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_for(dir.path());

        for bind in ["/proc", "/sys/", "/dev/shm", "/srv/../dev/pts"] {
            config.bind_dirs = vec![PathBuf::from(bind)];
            assert!(
                matches!(config.validate(), Err(ChrootError::FatalConfig(_))),
                "{} should be rejected",
                bind
            );
        }

        // Only whole components count
        config.bind_dirs = vec![PathBuf::from("/devel"), PathBuf::from("/system")];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_reports_denied_root_before_name() {
        let mut config = config_for(Path::new("/"));
        config.name = String::new();
        let Err(ChrootError::FatalConfig(message)) = config.validate() else {
            unreachable!("expected FatalConfig");
        };
        assert!(message.contains("protected host directory"), "{}", message);
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("/a/./b/../c/")), PathBuf::from("/a/c"));
        assert_eq!(normalize(Path::new("/../..")), PathBuf::from("/"));
    }

    #[test]
    fn test_special_display() {
        assert_eq!(
            SpecialFilesystems::default().to_string(),
            "proc,sys,dev,dev/pts,dev/shm"
        );
        assert_eq!(SpecialFilesystems::none().to_string(), "");
    }
}
