use crate::util::resolve_uid_gid_home;
use anyhow::Result;
use std::path::{Path, PathBuf};

/// Expands a leading `~` to the invoking user's home directory
pub fn expand_tilde_path(path: &Path) -> Result<PathBuf> {
    let Some(path_str) = path.to_str() else {
        return Ok(path.to_path_buf());
    };
    if path_str == "~" {
        return Ok(resolve_uid_gid_home()?.home);
    }
    if let Some(rest) = path_str.strip_prefix("~/") {
        return Ok(resolve_uid_gid_home()?.home.join(rest));
    }
    Ok(path.to_path_buf())
}
