use super::{MountOps, MountPoint};
use anyhow::{Result, anyhow};
use std::cell::RefCell;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Mount(PathBuf),
    Unmount(PathBuf),
}

/// In-memory mount table for exercising sessions without root.
#[derive(Default)]
pub struct FakeMounts {
    pub mounted: RefCell<Vec<PathBuf>>,
    pub log: RefCell<Vec<Op>>,
    pub fail_mount: Option<PathBuf>,
    pub fail_unmount: Option<PathBuf>,
}

impl FakeMounts {
    pub fn mounted(&self) -> Vec<PathBuf> {
        self.mounted.borrow().clone()
    }

    pub fn log(&self) -> Vec<Op> {
        self.log.borrow().clone()
    }

    pub fn mount_calls(&self) -> usize {
        self.log
            .borrow()
            .iter()
            .filter(|op| matches!(op, Op::Mount(_)))
            .count()
    }

    /// Pretends something else mounted `target`.
    pub fn preload(&self, target: PathBuf) {
        self.mounted.borrow_mut().push(target);
    }
}

impl MountOps for FakeMounts {
    fn is_mounted(&self, target: &Path) -> Result<bool> {
        Ok(self.mounted.borrow().iter().any(|m| m == target))
    }

    fn mount(&self, point: &MountPoint) -> Result<()> {
        if self.fail_mount.as_deref() == Some(point.target.as_path()) {
            return Err(anyhow!("EPERM: Operation not permitted"));
        }
        self.log.borrow_mut().push(Op::Mount(point.target.clone()));
        self.mounted.borrow_mut().push(point.target.clone());
        Ok(())
    }

    fn unmount(&self, target: &Path) -> Result<()> {
        if self.fail_unmount.as_deref() == Some(target) {
            return Err(anyhow!("EBUSY: Device or resource busy"));
        }
        self.log.borrow_mut().push(Op::Unmount(target.to_path_buf()));
        self.mounted.borrow_mut().retain(|m| m != target);
        Ok(())
    }

    fn mounts_under(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let mut mounts: Vec<PathBuf> = self
            .mounted
            .borrow()
            .iter()
            .filter(|m| m.starts_with(root))
            .cloned()
            .collect();
        mounts.sort_by_key(|m| std::cmp::Reverse(m.components().count()));
        Ok(mounts)
    }
}
