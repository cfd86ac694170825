//! Backup resource: moves a conflicting entry out of a target's way.
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

use super::fs::{entry_metadata, files_identical, move_entry, paths_equal};
use super::{Resource, ResourceChange, ResourceState};
use crate::error::SyncError;

/// Timestamp format of run folders under `backups/`.
const RUN_STAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// The backup folder of one sync run: `backups/<timestamp>[-N]`.
///
/// The folder name is chosen so it never reuses an existing run folder; the
/// directory itself is only created when the first entry is moved into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRun {
    dir: PathBuf,
}

impl BackupRun {
    /// Pick the run folder for a run started at `now`.
    #[must_use]
    pub fn allocate(backups_root: &Path, now: DateTime<Utc>) -> Self {
        let stamp = now.format(RUN_STAMP_FORMAT).to_string();
        let mut dir = backups_root.join(&stamp);
        let mut suffix = 1u32;
        while dir.symlink_metadata().is_ok() {
            dir = backups_root.join(format!("{stamp}-{suffix}"));
            suffix += 1;
        }
        Self { dir }
    }

    /// The run folder.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the entry for `relative_path` is preserved.
    #[must_use]
    pub fn destination(&self, relative_path: &str) -> PathBuf {
        relative_path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .fold(self.dir.clone(), |acc, segment| acc.join(segment))
    }
}

/// Preserves whatever occupies `target` unless it already is the desired
/// link or an exact copy of `source`.
///
/// The desired state is "nothing foreign at `target`": an empty location, a
/// link to `source`, or a byte-identical regular file are all
/// [`ResourceState::Correct`].
#[derive(Debug, Clone)]
pub struct BackupResource {
    /// Rendered file the target should end up linking to.
    pub source: PathBuf,
    /// Location that may hold a pre-existing entry.
    pub target: PathBuf,
    /// Where a pre-existing entry is moved to.
    pub destination: PathBuf,
}

impl BackupResource {
    /// Create a backup resource.
    #[must_use]
    pub const fn new(source: PathBuf, target: PathBuf, destination: PathBuf) -> Self {
        Self {
            source,
            target,
            destination,
        }
    }
}

impl Resource for BackupResource {
    fn description(&self) -> String {
        format!("{} -> {}", self.target.display(), self.destination.display())
    }

    fn current_state(&self) -> Result<ResourceState, SyncError> {
        let Some(meta) =
            entry_metadata(&self.target).map_err(|e| SyncError::io(&self.target, e))?
        else {
            return Ok(ResourceState::Correct);
        };

        if meta.is_symlink() {
            let existing =
                std::fs::read_link(&self.target).map_err(|e| SyncError::io(&self.target, e))?;
            return Ok(if paths_equal(&existing, &self.source) {
                ResourceState::Correct
            } else {
                ResourceState::Incorrect {
                    current: format!("link to {}", existing.display()),
                }
            });
        }

        if meta.is_dir() {
            return Ok(ResourceState::Incorrect {
                current: "directory".to_string(),
            });
        }

        let identical = files_identical(&self.target, &self.source).map_err(|e| {
            // Attribute the failure to whichever side cannot be read.
            if std::fs::File::open(&self.target).is_err() {
                SyncError::io(&self.target, e)
            } else {
                SyncError::io(&self.source, e)
            }
        })?;
        Ok(if identical {
            ResourceState::Correct
        } else {
            ResourceState::Incorrect {
                current: "file with different content".to_string(),
            }
        })
    }

    fn apply(&self) -> Result<ResourceChange, SyncError> {
        if !self.needs_change()? {
            return Ok(ResourceChange::AlreadyCorrect);
        }
        super::fs::ensure_parent_dir(&self.destination)
            .map_err(|e| SyncError::io(&self.destination, e))?;
        move_entry(&self.target, &self.destination).map_err(|e| SyncError::io(&self.target, e))?;
        Ok(ResourceChange::Applied)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone as _;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
    }

    fn fixture() -> (tempfile::TempDir, BackupResource) {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("tree/common/.gitconfig");
        std::fs::create_dir_all(source.parent().unwrap()).unwrap();
        std::fs::write(&source, "[user]\n").unwrap();
        let run = BackupRun::allocate(&dir.path().join("tree/backups"), fixed_now());
        let resource = BackupResource::new(
            source,
            dir.path().join("home/.gitconfig"),
            run.destination(".gitconfig"),
        );
        std::fs::create_dir_all(dir.path().join("home")).unwrap();
        (dir, resource)
    }

    #[test]
    fn run_folder_uses_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let run = BackupRun::allocate(dir.path(), fixed_now());
        assert_eq!(run.dir(), dir.path().join("20240309-140507"));
        assert!(!run.dir().exists(), "folder is created lazily");
    }

    #[test]
    fn run_folder_never_reuses_existing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("20240309-140507")).unwrap();
        std::fs::create_dir(dir.path().join("20240309-140507-1")).unwrap();
        let run = BackupRun::allocate(dir.path(), fixed_now());
        assert_eq!(run.dir(), dir.path().join("20240309-140507-2"));
    }

    #[test]
    fn destination_keeps_relative_layout() {
        let run = BackupRun::allocate(Path::new("/t/backups"), fixed_now());
        assert_eq!(
            run.destination(".config/nvim/init.lua"),
            Path::new("/t/backups/20240309-140507/.config/nvim/init.lua")
        );
    }

    #[test]
    fn nothing_at_target_needs_no_backup() {
        let (_dir, resource) = fixture();
        assert_eq!(resource.current_state().unwrap(), ResourceState::Correct);
        assert!(!resource.needs_change().unwrap());
        assert_eq!(resource.apply().unwrap(), ResourceChange::AlreadyCorrect);
    }

    #[test]
    fn identical_file_needs_no_backup() {
        let (_dir, resource) = fixture();
        std::fs::write(&resource.target, "[user]\n").unwrap();
        assert_eq!(resource.current_state().unwrap(), ResourceState::Correct);
    }

    #[test]
    fn differing_file_is_moved_with_content() {
        let (_dir, resource) = fixture();
        std::fs::write(&resource.target, "old content").unwrap();
        assert!(resource.needs_change().unwrap());

        assert_eq!(resource.apply().unwrap(), ResourceChange::Applied);
        assert!(resource.target.symlink_metadata().is_err());
        assert_eq!(
            std::fs::read_to_string(&resource.destination).unwrap(),
            "old content"
        );
    }

    #[test]
    fn directory_at_target_is_moved() {
        let (_dir, resource) = fixture();
        std::fs::create_dir_all(resource.target.join("inner")).unwrap();
        std::fs::write(resource.target.join("inner/file"), "x").unwrap();
        assert!(matches!(
            resource.current_state().unwrap(),
            ResourceState::Incorrect { .. }
        ));
        resource.apply().unwrap();
        assert_eq!(
            std::fs::read_to_string(resource.destination.join("inner/file")).unwrap(),
            "x"
        );
    }

    #[test]
    fn existing_backup_is_never_overwritten() {
        let (_dir, resource) = fixture();
        std::fs::write(&resource.target, "new").unwrap();
        std::fs::create_dir_all(resource.destination.parent().unwrap()).unwrap();
        std::fs::write(&resource.destination, "preserved").unwrap();

        let err = resource.apply().unwrap_err();
        assert_eq!(err.kind(), "IOError");
        assert_eq!(
            std::fs::read_to_string(&resource.destination).unwrap(),
            "preserved"
        );
        assert_eq!(std::fs::read_to_string(&resource.target).unwrap(), "new");
    }

    #[cfg(unix)]
    #[test]
    fn link_to_source_needs_no_backup() {
        let (_dir, resource) = fixture();
        std::os::unix::fs::symlink(&resource.source, &resource.target).unwrap();
        assert_eq!(resource.current_state().unwrap(), ResourceState::Correct);
    }

    #[cfg(unix)]
    #[test]
    fn differing_link_is_moved_as_link() {
        let (dir, resource) = fixture();
        let elsewhere = dir.path().join("elsewhere");
        std::fs::write(&elsewhere, "x").unwrap();
        std::os::unix::fs::symlink(&elsewhere, &resource.target).unwrap();

        assert!(matches!(
            resource.current_state().unwrap(),
            ResourceState::Incorrect { .. }
        ));
        resource.apply().unwrap();
        assert_eq!(std::fs::read_link(&resource.destination).unwrap(), elsewhere);
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_target_is_io_error() {
        use std::os::unix::fs::PermissionsExt as _;
        let (_dir, resource) = fixture();
        std::fs::write(&resource.target, "secret!").unwrap();
        std::fs::set_permissions(&resource.target, std::fs::Permissions::from_mode(0o000))
            .unwrap();
        // Root can read anything; the check is meaningless there.
        if std::fs::read(&resource.target).is_ok() {
            return;
        }
        let err = resource.current_state().unwrap_err();
        assert_eq!(err.kind(), "IOError");
    }
}
