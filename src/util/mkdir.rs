use anyhow::{Result, anyhow};
use std::path::{Component, Path};

/**
 * Creates `target` (and its parents) if needed and checks that, once every
 * symlink along the way is resolved, it is a directory still inside `root`.
 * Mounting onto a symlink that points back out to the host would otherwise
 * mount over a host directory.
 */
pub fn mkdir_within(root: &Path, target: &Path) -> Result<()> {
    let relative = target.strip_prefix(root).map_err(|_| {
        anyhow!(
            "{} is not below the sandbox root {}",
            target.display(),
            root.display()
        )
    })?;
    let root = root
        .canonicalize()
        .map_err(|e| anyhow!("Failed to resolve {}: {}", root.display(), e))?;

    // Walk one component at a time so nothing is ever created through a
    // symlink that leads out of the root.
    let mut current = root.clone();
    for component in relative.components() {
        let Component::Normal(part) = component else {
            return Err(anyhow!(
                "{} contains a non-normal path component",
                target.display()
            ));
        };
        let next = current.join(part);
        if std::fs::symlink_metadata(&next).is_err() {
            std::fs::create_dir(&next).map_err(|e| {
                anyhow!("Failed to create directory {}: {}", next.display(), e)
            })?;
        }

        current = next.canonicalize().map_err(|e| {
            anyhow!("Failed to resolve {}: {}", next.display(), e)
        })?;
        if !current.starts_with(&root) || current == root {
            return Err(anyhow!(
                "{} resolves to {} which is outside the sandbox root {}",
                target.display(),
                current.display(),
                root.display()
            ));
        }
        if !current.is_dir() {
            return Err(anyhow!(
                "{} exists but is not a directory",
                next.display()
            ));
        }
    }

    if current == root {
        return Err(anyhow!(
            "refusing to mount over the sandbox root {}",
            root.display()
        ));
    }

    Ok(())
}
