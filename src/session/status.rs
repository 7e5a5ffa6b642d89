use crate::mounts::{MountKind, MountOps, MountPoint};
use crate::util::lock_record::LockState;
use log::debug;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct MountStatus {
    pub label: String,
    pub target: PathBuf,
    pub kind: String,
    pub mounted: bool,
    /// Whether the host directory still exists. Bind mounts only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_exists: Option<bool>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct LockStatus {
    pub state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub name: String,
    pub root: PathBuf,
    pub lock: LockStatus,
    pub mounts: Vec<MountStatus>,
    /// Mounts below the root that this configuration doesn't account for.
    pub other_mounts: Vec<PathBuf>,
}

impl StatusReport {
    pub fn mounted_count(&self) -> usize {
        self.mounts.iter().filter(|m| m.mounted).count()
    }
}

impl From<LockState> for LockStatus {
    fn from(state: LockState) -> Self {
        match state {
            LockState::Absent => LockStatus {
                state: "absent",
                pid: None,
            },
            LockState::Held(pid) => LockStatus {
                state: "held",
                pid: Some(pid.as_raw()),
            },
            LockState::Stale(pid) => LockStatus {
                state: "stale",
                pid: pid.map(|pid| pid.as_raw()),
            },
        }
    }
}

pub fn mount_status<M: MountOps + ?Sized>(ops: &M, point: &MountPoint) -> MountStatus {
    let mounted = ops.is_mounted(&point.target).unwrap_or_else(|e| {
        debug!("Could not query {}: {:#}", point.target.display(), e);
        false
    });
    let source_exists = match &point.kind {
        MountKind::Bind(source) => Some(source.is_dir()),
        _ => None,
    };
    MountStatus {
        label: point.label.clone(),
        target: point.target.clone(),
        kind: point.kind.to_string(),
        mounted,
        source_exists,
    }
}

/// Mounts under `root` not among `known`.
pub fn other_mounts<M: MountOps + ?Sized>(
    ops: &M,
    root: &Path,
    known: &[MountPoint],
) -> Vec<PathBuf> {
    ops.mounts_under(root)
        .unwrap_or_default()
        .into_iter()
        .filter(|mount| !known.iter().any(|point| point.target == *mount))
        .collect()
}
