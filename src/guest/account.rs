use crate::config::DEFAULT_USER;
use crate::error::ChrootError;
use anyhow::{Context, Result};
use log::{debug, warn};
use nix::unistd::{Gid, Uid};
use std::path::{Path, PathBuf};

/// An account from the sandbox's own user database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestAccount {
    pub name: String,
    pub uid: Uid,
    pub gid: Gid,
    pub home: PathBuf,
    pub shell: PathBuf,
    /// Supplementary groups, primary group first.
    pub groups: Vec<Gid>,
}

impl GuestAccount {
    pub fn is_privileged(&self) -> bool {
        self.uid.is_root()
    }

    fn fallback_root() -> GuestAccount {
        GuestAccount {
            name: DEFAULT_USER.to_string(),
            uid: Uid::from_raw(0),
            gid: Gid::from_raw(0),
            home: PathBuf::from("/root"),
            shell: PathBuf::from("/bin/sh"),
            groups: vec![Gid::from_raw(0)],
        }
    }
}

struct PasswdEntry<'a> {
    name: &'a str,
    uid: u32,
    gid: u32,
    home: &'a str,
    shell: &'a str,
}

fn parse_passwd_line(line: &str) -> Option<PasswdEntry<'_>> {
    let line = line.trim_end();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let fields: Vec<&str> = line.split(':').collect();
    if fields.len() < 7 {
        return None;
    }
    Some(PasswdEntry {
        name: fields[0],
        uid: fields[2].parse().ok()?,
        gid: fields[3].parse().ok()?,
        home: fields[5],
        shell: fields[6],
    })
}

fn read_guest_file(root: &Path, file: &str) -> Result<Option<String>> {
    let path = root.join("etc").join(file);
    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).context(format!("Failed to read {}", path.display())),
    }
}

/// Groups listing `user` as a member, from `<root>/etc/group`.
fn member_groups(group_file: &str, user: &str) -> Vec<Gid> {
    group_file
        .lines()
        .filter(|line| !line.starts_with('#'))
        .filter_map(|line| {
            let fields: Vec<&str> = line.trim_end().split(':').collect();
            if fields.len() < 4 {
                return None;
            }
            let gid = fields[2].parse::<u32>().ok()?;
            fields[3]
                .split(',')
                .any(|member| member.trim() == user)
                .then_some(Gid::from_raw(gid))
        })
        .collect()
}

/**
 * Looks `user` up in `<root>/etc/passwd`, never the host's. `root` falls back
 * to uid 0 with home `/root` and shell `/bin/sh` when the sandbox has no entry
 * for it. Any other missing user is an error.
 */
pub fn lookup_account(root: &Path, user: &str) -> Result<GuestAccount> {
    let passwd = read_guest_file(root, "passwd")?.unwrap_or_default();
    let entry = passwd
        .lines()
        .filter_map(parse_passwd_line)
        .find(|entry| entry.name == user);

    let Some(entry) = entry else {
        if user == DEFAULT_USER {
            warn!(
                "No root entry in {}/etc/passwd, using uid 0 with home /root",
                root.display()
            );
            return Ok(GuestAccount::fallback_root());
        }
        return Err(ChrootError::UnknownGuestUser(user.to_string()).into());
    };

    let gid = Gid::from_raw(entry.gid);
    let mut groups = vec![gid];
    if let Some(group_file) = read_guest_file(root, "group")? {
        for group in member_groups(&group_file, user) {
            if !groups.contains(&group) {
                groups.push(group);
            }
        }
    }

    let home = match entry.home {
        "" => PathBuf::from("/"),
        home => PathBuf::from(home),
    };
    let shell = match entry.shell {
        "" => PathBuf::from("/bin/sh"),
        shell => PathBuf::from(shell),
    };

    let account = GuestAccount {
        name: user.to_string(),
        uid: Uid::from_raw(entry.uid),
        gid,
        home,
        shell,
        groups,
    };
    debug!(
        "Guest account {}: uid={} gid={} groups={:?}",
        account.name, account.uid, account.gid, account.groups
    );
    Ok(account)
}

/// Names of every account in `<root>/etc/passwd`, for shell completion.
pub fn list_account_names(root: &Path) -> Vec<String> {
    let passwd = read_guest_file(root, "passwd")
        .ok()
        .flatten()
        .unwrap_or_default();
    passwd
        .lines()
        .filter_map(parse_passwd_line)
        .map(|entry| entry.name.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PASSWD: &str = "\
root:x:0:0:root:/root:/bin/bash
# comment
builder:x:1000:1000:Build User,,,:/home/builder:/bin/zsh
nobody:x:65534:65534:nobody:/nonexistent:/usr/sbin/nologin
broken:line
";

    const GROUP: &str = "\
root:x:0:
wheel:x:10:builder,other
builder:x:1000:
docker:x:998:builder
audio:x:29:other
";

    fn sandbox_root(passwd: Option<&str>, group: Option<&str>) -> tempfile::TempDir {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("etc")).unwrap();
        if let Some(passwd) = passwd {
            std::fs::write(root.path().join("etc/passwd"), passwd).unwrap();
        }
        if let Some(group) = group {
            std::fs::write(root.path().join("etc/group"), group).unwrap();
        }
        root
    }

    #[test]
    fn test_lookup_regular_user() {
        let root = sandbox_root(Some(PASSWD), Some(GROUP));
        let account = lookup_account(root.path(), "builder").unwrap();
        assert_eq!(account.uid, Uid::from_raw(1000));
        assert_eq!(account.gid, Gid::from_raw(1000));
        assert_eq!(account.home, PathBuf::from("/home/builder"));
        assert_eq!(account.shell, PathBuf::from("/bin/zsh"));
        assert_eq!(
            account.groups,
            vec![Gid::from_raw(1000), Gid::from_raw(10), Gid::from_raw(998)]
        );
        assert!(!account.is_privileged());
    }

    #[test]
    fn test_lookup_root() {
        let root = sandbox_root(Some(PASSWD), None);
        let account = lookup_account(root.path(), "root").unwrap();
        assert!(account.is_privileged());
        assert_eq!(account.shell, PathBuf::from("/bin/bash"));
        assert_eq!(account.groups, vec![Gid::from_raw(0)]);
    }

    #[test]
    fn test_root_without_entry_falls_back() {
        let root = sandbox_root(None, None);
        let account = lookup_account(root.path(), "root").unwrap();
        assert_eq!(account, GuestAccount::fallback_root());
    }

    #[test]
    fn test_unknown_user_never_becomes_root() {
        let root = sandbox_root(Some(PASSWD), Some(GROUP));
        let error = lookup_account(root.path(), "mallory").unwrap_err();
        assert!(matches!(
            error.downcast_ref::<ChrootError>(),
            Some(ChrootError::UnknownGuestUser(name)) if name == "mallory"
        ));

        let empty = sandbox_root(None, None);
        assert!(lookup_account(empty.path(), "builder").is_err());
    }

    #[test]
    fn test_list_account_names() {
        let root = sandbox_root(Some(PASSWD), None);
        assert_eq!(
            list_account_names(root.path()),
            vec!["root", "builder", "nobody"]
        );
        let empty = tempfile::tempdir().unwrap();
        assert!(list_account_names(empty.path()).is_empty());
    }
}
