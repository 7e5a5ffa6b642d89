use anyhow::{Result, anyhow};
use std::ffi::CStr;
use std::path::{Path, PathBuf};

pub const MOUNT_TABLE: &CStr = c"/proc/self/mounts";

/// Reads every mount directory listed in the live mount table, in table
/// order. getmntent(3) takes care of the octal escapes used for spaces.
pub fn read_mount_table() -> Result<Vec<PathBuf>> {
    let mut mounts = Vec::new();

    let system_mounts =
        unsafe { libc::setmntent(MOUNT_TABLE.as_ptr(), c"r".as_ptr()) };

    if system_mounts.is_null() {
        return Err(anyhow!(
            "Failed to open {}",
            MOUNT_TABLE.to_string_lossy()
        ));
    }

    loop {
        let mnt = unsafe { libc::getmntent(system_mounts) };
        if mnt.is_null() {
            break;
        }

        let mnt_dir = unsafe { CStr::from_ptr((*mnt).mnt_dir) };
        mounts.push(PathBuf::from(mnt_dir.to_string_lossy().into_owned()));
    }

    unsafe { libc::endmntent(system_mounts) };

    Ok(mounts)
}

/// Mount points at or below `base`, deepest first so they can be unmounted
/// in the order returned.
pub fn get_mounts(base: &Path) -> Result<Vec<PathBuf>> {
    let mut mounts: Vec<PathBuf> = read_mount_table()?
        .into_iter()
        .filter(|mnt_dir| mnt_dir.starts_with(base))
        .collect();
    mounts.sort_by(|a, b| b.cmp(a));
    mounts.dedup();
    Ok(mounts)
}
