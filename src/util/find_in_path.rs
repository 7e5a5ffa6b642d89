use nix::unistd::{AccessFlags, access};
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

/// Same limit as the kernel's ELOOP.
const MAX_SYMLINKS: usize = 40;

/// Looks `program` up along a colon separated search path the way execvp(3)
/// would. Every candidate is interpreted relative to `root`, so passing the
/// sandbox root searches the guest's filesystem rather than the host's.
///
/// The returned path is the unresolved candidate, so the guest sees the
/// program under the name it asked for.
pub fn find_in_path(root: &Path, search_path: &str, program: &str) -> Option<PathBuf> {
    if program.is_empty() {
        return None;
    }

    if program.contains('/') {
        let candidate = Path::new("/").join(program);
        return is_executable(root, &candidate).then(|| within(root, &candidate));
    }

    search_path
        .split(':')
        .filter(|dir| !dir.is_empty())
        .map(|dir| Path::new("/").join(dir).join(program))
        .find(|candidate| is_executable(root, candidate))
        .map(|candidate| within(root, &candidate))
}

/// Host view of an absolute guest path.
pub fn within(root: &Path, guest_path: &Path) -> PathBuf {
    root.join(guest_path.strip_prefix("/").unwrap_or(guest_path))
}

/**
 * Host view of `guest_path` with every symlink resolved the way the kernel
 * would resolve it after chroot: absolute targets restart at `root` and `..`
 * never climbs above it. Returns `None` when a component is missing or the
 * links loop.
 */
pub fn resolve_within(root: &Path, guest_path: &Path) -> Option<PathBuf> {
    let mut pending: Vec<OsString> = vec![];
    push_components(&mut pending, guest_path);

    let mut resolved = PathBuf::from("/");
    let mut links = 0;
    while let Some(part) = pending.pop() {
        if part == ".." {
            resolved.pop();
            continue;
        }

        let candidate = resolved.join(&part);
        let host = within(root, &candidate);
        let metadata = std::fs::symlink_metadata(&host).ok()?;
        if !metadata.file_type().is_symlink() {
            resolved = candidate;
            continue;
        }

        links += 1;
        if links > MAX_SYMLINKS {
            return None;
        }
        let target = std::fs::read_link(&host).ok()?;
        if target.is_absolute() {
            resolved = PathBuf::from("/");
        }
        push_components(&mut pending, &target);
    }

    Some(within(root, &resolved))
}

/// Pushes the components of `path` so that the first one is popped first.
fn push_components(pending: &mut Vec<OsString>, path: &Path) {
    for component in path.components().rev() {
        match component {
            Component::Normal(part) => pending.push(part.to_os_string()),
            Component::ParentDir => pending.push("..".into()),
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }
}

fn is_executable(root: &Path, guest_path: &Path) -> bool {
    match resolve_within(root, guest_path) {
        Some(path) => path.is_file() && access(&path, AccessFlags::X_OK).is_ok(),
        None => false,
    }
}
