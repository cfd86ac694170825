//! Advisory run lock: one coordinator per tree.
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write as _};
use std::path::{Path, PathBuf};

use crate::error::CoordinatorError;

/// Held for the duration of a run; removes the lock file when dropped.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Create the lock file exclusively and record this process id in it.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::Locked`] if the file already exists, or
    /// [`CoordinatorError::Io`] if it cannot be created.
    pub fn acquire(path: &Path) -> Result<Self, CoordinatorError> {
        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(CoordinatorError::Locked(path.to_path_buf()));
            }
            Err(e) => return Err(CoordinatorError::io(path, e)),
        };
        let lock = Self {
            path: path.to_path_buf(),
        };
        writeln!(file, "{}", std::process::id()).map_err(|e| CoordinatorError::io(path, e))?;
        Ok(lock)
    }

    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!("failed to remove lock {}: {e}", self.path.display());
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_is_locked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".dotsync.lock");
        let lock = RunLock::acquire(&path).unwrap();
        assert_eq!(
            std::fs::read_to_string(lock.path()).unwrap().trim(),
            std::process::id().to_string()
        );

        let err = RunLock::acquire(&path).unwrap_err();
        assert!(matches!(err, CoordinatorError::Locked(p) if p == path));
    }

    #[test]
    fn drop_releases_lock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".dotsync.lock");
        drop(RunLock::acquire(&path).unwrap());
        assert!(!path.exists());
        RunLock::acquire(&path).unwrap();
    }

    #[test]
    fn missing_directory_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = RunLock::acquire(&dir.path().join("missing/.dotsync.lock")).unwrap_err();
        assert!(matches!(err, CoordinatorError::Io { .. }));
    }
}
