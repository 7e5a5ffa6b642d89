use anyhow::{Context, Result};
use nix::errno::Errno;
use nix::mount::{MntFlags, MsFlags};
use std::ffi::{CStr, CString, OsStr};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

fn to_cstring<S: AsRef<OsStr>>(value: &S) -> Result<CString> {
    CString::new(value.as_ref().as_bytes())
        .context("mount argument contains a NUL byte")
}

/// Thin wrapper around mount(2) that reports every argument on failure.
pub fn mount<S1, S2, S3, S4>(
    source: Option<S1>,
    target: S2,
    fstype: Option<S3>,
    flags: MsFlags,
    data: Option<S4>,
) -> Result<()>
where
    S1: AsRef<OsStr>,
    S2: AsRef<OsStr>,
    S3: AsRef<OsStr>,
    S4: AsRef<OsStr>,
{
    let source_cstr = source.as_ref().map(to_cstring).transpose()?;
    let target_cstr = to_cstring(&target)?;
    let fstype_cstr = fstype.as_ref().map(to_cstring).transpose()?;
    let data_cstr = data.as_ref().map(to_cstring).transpose()?;

    nix::mount::mount::<CStr, CStr, CStr, CStr>(
        source_cstr.as_deref(),
        target_cstr.as_c_str(),
        fstype_cstr.as_deref(),
        flags,
        data_cstr.as_deref(),
    )
    .with_context(|| {
        let show = |value: &Option<CString>| {
            value
                .as_ref()
                .map(|v| v.to_string_lossy().into_owned())
                .unwrap_or("none".to_string())
        };
        format!(
            "mount {} {} [type={}, flags={:#x}, data={}]",
            show(&source_cstr),
            target_cstr.to_string_lossy(),
            show(&fstype_cstr),
            flags.bits(),
            show(&data_cstr),
        )
    })
}

/// Unmounts `target`. A busy target is detached lazily instead, which is
/// reported back to the caller as `Ok(true)`.
pub fn unmount(target: &Path) -> Result<bool> {
    match nix::mount::umount2(target, MntFlags::empty()) {
        Ok(()) => Ok(false),
        Err(Errno::EBUSY) => {
            nix::mount::umount2(target, MntFlags::MNT_DETACH).with_context(
                || format!("lazy unmount of busy {}", target.display()),
            )?;
            Ok(true)
        }
        Err(e) => {
            Err(e).with_context(|| format!("unmount {}", target.display()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mount_rejects_nul_bytes() {
        let result = mount(
            Some("none"),
            "/tmp/chrootctl\0test",
            Some("tmpfs"),
            MsFlags::empty(),
            None::<&str>,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_unmount_not_mounted() {
        let dir = tempfile::tempdir().unwrap();
        assert!(unmount(dir.path()).is_err());
    }
}
