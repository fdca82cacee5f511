use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::Result;
use crate::io::{atomic_symlink, ensure_dir};
use crate::paths::{gcroot_path, gcroots_dir};
use crate::types::ExecutionMode;

/// One symlink per host under `<state_dir>/gcroots`, pointing at the last
/// successfully deployed system closure so it survives garbage collection.
#[derive(Debug, Clone)]
pub struct GcRoots {
    state_dir: PathBuf,
}

impl GcRoots {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    pub fn root_path(&self, hostname: &str) -> PathBuf {
        gcroot_path(&self.state_dir, hostname)
    }

    /// Target of the host's root, if one was ever recorded.
    pub fn current(&self, hostname: &str) -> Option<PathBuf> {
        std::fs::read_link(self.root_path(hostname)).ok()
    }

    /// Replace the host's root with a link to `output_path`.
    pub fn record(&self, hostname: &str, output_path: &Path, mode: ExecutionMode) -> Result<PathBuf> {
        ensure_dir(&gcroots_dir(&self.state_dir))?;
        let root = self.root_path(hostname);
        if mode.is_simulate() {
            info!(
                "Dry-run enabled: 'ln -s {} {}' has not been executed",
                output_path.display(),
                root.display()
            );
            return Ok(root);
        }
        atomic_symlink(output_path, &root)?;
        info!("Creating gcroot '{}'", root.display());
        Ok(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn record_creates_root_for_host() {
        let dir = TempDir::new().unwrap();
        let roots = GcRoots::new(dir.path());
        let root = roots
            .record("web1", Path::new("/nix/store/abc-web1"), ExecutionMode::Apply)
            .unwrap();
        assert_eq!(root, dir.path().join("gcroots/switch-to-configuration-web1"));
        assert_eq!(roots.current("web1"), Some(PathBuf::from("/nix/store/abc-web1")));
    }

    #[test]
    fn record_overwrites_previous_root() {
        let dir = TempDir::new().unwrap();
        let roots = GcRoots::new(dir.path());
        roots
            .record("web1", Path::new("/nix/store/old-web1"), ExecutionMode::Apply)
            .unwrap();
        roots
            .record("web1", Path::new("/nix/store/new-web1"), ExecutionMode::Apply)
            .unwrap();
        assert_eq!(roots.current("web1"), Some(PathBuf::from("/nix/store/new-web1")));
    }

    #[test]
    fn simulate_leaves_root_unchanged() {
        let dir = TempDir::new().unwrap();
        let roots = GcRoots::new(dir.path());
        roots
            .record("web1", Path::new("/nix/store/old-web1"), ExecutionMode::Apply)
            .unwrap();
        roots
            .record("web1", Path::new("/nix/store/new-web1"), ExecutionMode::Simulate)
            .unwrap();
        assert_eq!(roots.current("web1"), Some(PathBuf::from("/nix/store/old-web1")));
    }

    #[test]
    fn roots_are_per_host() {
        let dir = TempDir::new().unwrap();
        let roots = GcRoots::new(dir.path());
        roots
            .record("web1", Path::new("/nix/store/abc-web1"), ExecutionMode::Apply)
            .unwrap();
        assert_eq!(roots.current("web2"), None);
    }
}
