//! Synchronous last-chance removal of the download root.

use std::path::PathBuf;

use tracing::{debug, warn};

/// Removes a download root when dropped.
///
/// The server's async shutdown path normally removes the root first; this
/// guard covers unwinding and early returns. Forced termination skips both,
/// which is what the startup purge is for.
#[derive(Debug)]
pub struct RootCleanupGuard {
    root: PathBuf,
    armed: bool,
}

impl RootCleanupGuard {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            armed: true,
        }
    }

    /// Keep the root on drop.
    pub fn disarm(&mut self) {
        self.armed = false;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }
}

impl Drop for RootCleanupGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_dir_all(&self.root) {
            Ok(()) => debug!(path = %self.root.display(), "Removed download root on drop"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.root.display(), error = %e, "Failed to remove download root"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_removes_root() {
        let tmp = tempfile::TempDir::new().unwrap();
        let root = tmp.path().join("ado-mcp-server-1");
        std::fs::create_dir_all(root.join("downloads/job-logs/5")).unwrap();
        std::fs::write(root.join("downloads/job-logs/5/log.txt"), b"x").unwrap();

        drop(RootCleanupGuard::new(&root));
        assert!(!root.exists());
    }

    #[test]
    fn test_disarmed_guard_keeps_root() {
        let tmp = tempfile::TempDir::new().unwrap();
        let root = tmp.path().join("ado-mcp-server-1");
        std::fs::create_dir_all(&root).unwrap();

        let mut guard = RootCleanupGuard::new(&root);
        guard.disarm();
        assert!(!guard.is_armed());
        drop(guard);
        assert!(root.exists());
    }

    #[test]
    fn test_missing_root_is_fine() {
        let tmp = tempfile::TempDir::new().unwrap();
        drop(RootCleanupGuard::new(tmp.path().join("never-created")));
    }
}
