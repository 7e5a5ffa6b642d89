use anyhow::{Context, Result};
use nix::unistd::{Gid, Uid, setgid, setgroups, setuid};

/// Permanently switches to `uid`/`gid` with exactly `groups` as the
/// supplementary group list. Groups must be set first, while still root.
pub fn drop_privileges(uid: Uid, gid: Gid, groups: &[Gid]) -> Result<()> {
    setgroups(groups).context("failed to set supplementary groups")?;
    setgid(gid).context(format!("failed to setgid {}", gid))?;
    setuid(uid).context(format!("failed to setuid {}", uid))?;
    Ok(())
}
