use anyhow::{Result, anyhow};
use nix::unistd::{Gid, Uid, getresgid, getresuid};
use std::path::Path;

use crate::types::UidGidHome;

/**
 * We are normally run through sudo. Config files and `~` expansion should
 * follow the user who invoked us, not root, so this figures out who that is.
 */
pub fn resolve_uid_gid_home() -> Result<UidGidHome> {
    let resuid = getresuid()?;
    let resgid = getresgid()?;

    // With setuid bits the real uid is the caller and SUDO_* can't be trusted
    let is_setuid =
        resuid.real != resuid.effective && resuid.effective == Uid::from_raw(0);

    let (uid, gid, home) = if is_setuid {
        let home = std::env::var("HOME").unwrap_or("/tmp".to_string());
        (resuid.real, resgid.real, home)
    } else {
        let home = std::env::var("SUDO_HOME")
            .or(std::env::var("HOME"))
            .unwrap_or("/tmp".to_string());

        let uid = match std::env::var("SUDO_UID") {
            Ok(uid) => Uid::from_raw(uid.parse::<u32>().map_err(|_| {
                anyhow!("Failed to parse SUDO_UID: {:?}", uid)
            })?),
            Err(_) => resuid.real,
        };

        let gid = match std::env::var("SUDO_GID") {
            Ok(gid) => Gid::from_raw(gid.parse::<u32>().map_err(|_| {
                anyhow!("Failed to parse SUDO_GID: {:?}", gid)
            })?),
            Err(_) => resgid.real,
        };

        (uid, gid, home)
    };

    let home_path = Path::new(&home);
    if !home_path.is_absolute() {
        return Err(anyhow!("Home directory is not absolute: {:?}", home));
    }

    Ok(UidGidHome {
        uid,
        gid,
        home: home_path.to_path_buf(),
    })
}
