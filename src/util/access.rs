use anyhow::{Result, anyhow};
use log::trace;
use nix::unistd::{Gid, Uid, eaccess, getegid, geteuid, setegid, seteuid};
use std::path::Path;

/// Checks `path` with the permissions of `uid`/`gid` rather than our own, so
/// running as root never lets a user read config they couldn't otherwise.
pub fn can_access(
    path: &Path,
    uid: Uid,
    gid: Gid,
    mode: nix::unistd::AccessFlags,
) -> Result<()> {
    let current_uid = geteuid();
    let current_gid = getegid();

    if current_uid == uid && current_gid == gid {
        return eaccess(path, mode).map_err(|e| {
            anyhow!("Failed to access {}: {}", path.display(), e)
        });
    }

    setegid(gid)?;
    seteuid(uid)?;

    let res = eaccess(path, mode);
    trace!("can_access({}, {}, {}) = {:?}", path.display(), uid, gid, res);

    seteuid(current_uid)?;
    setegid(current_gid)?;

    res.map_err(|e| anyhow!("Failed to access {}: {}", path.display(), e))
}
