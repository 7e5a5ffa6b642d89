use nix::unistd::Gid;
use nix::unistd::Uid;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct UidGidHome {
    pub uid: Uid,
    pub gid: Gid,
    pub home: PathBuf,
}
