use crate::error::{DeployError, Result};
use std::path::Path;
use tempfile::Builder;

/// Create a directory and all parents, idempotent.
pub fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| DeployError::filesystem(path, e))
}

/// Point `link` at `target`, replacing any existing link.
///
/// The new symlink is created under a random name in the same directory and
/// renamed over `link`, so readers see either the old or the new target and
/// never a missing link.
pub fn atomic_symlink(target: &Path, link: &Path) -> Result<()> {
    let dir = link.parent().unwrap_or(Path::new("."));
    ensure_dir(dir)?;
    let tmp = Builder::new()
        .prefix(".nixcd-link-")
        .make_in(dir, |path| std::os::unix::fs::symlink(target, path))
        .map_err(|e| DeployError::filesystem(dir, e))?;
    tmp.persist(link)
        .map_err(|e| DeployError::filesystem(link, e.error))?;
    Ok(())
}
