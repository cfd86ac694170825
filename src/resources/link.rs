//! The link from a home-directory location to a rendered file in the tree.
use std::io;
use std::path::{Path, PathBuf};

use super::fs::{ensure_parent_dir, entry_metadata, files_identical, paths_equal};
use super::{Resource, ResourceChange, ResourceState};
use crate::error::SyncError;

/// Windows `ERROR_PRIVILEGE_NOT_HELD`.
const PRIVILEGE_NOT_HELD: i32 = 1314;

/// `target` should be a symbolic link whose content is `source`.
#[derive(Debug, Clone)]
pub struct LinkResource {
    /// Rendered file inside the tree.
    pub source: PathBuf,
    /// Location under the home directory.
    pub target: PathBuf,
}

impl LinkResource {
    /// Link `target` to `source`.
    #[must_use]
    pub const fn new(source: PathBuf, target: PathBuf) -> Self {
        Self { source, target }
    }

    /// Clear the way for the new link.
    ///
    /// Only a symlink or a byte-identical copy of `source` may be removed;
    /// the backup step has already moved anything else aside.
    fn clear_target(&self) -> Result<(), SyncError> {
        let Some(meta) =
            entry_metadata(&self.target).map_err(|e| SyncError::io(&self.target, e))?
        else {
            return Ok(());
        };

        if meta.is_symlink() {
            return remove_link(&self.target, &meta)
                .map_err(|e| SyncError::link(&self.target, "remove stale link", e));
        }
        let identical = meta.is_file()
            && files_identical(&self.target, &self.source)
                .map_err(|e| SyncError::io(&self.target, e))?;
        if !identical {
            return Err(SyncError::link(
                &self.target,
                "target is occupied",
                io::Error::from(io::ErrorKind::AlreadyExists),
            ));
        }
        std::fs::remove_file(&self.target)
            .map_err(|e| SyncError::link(&self.target, "remove identical copy", e))
    }
}

impl Resource for LinkResource {
    fn description(&self) -> String {
        format!("{} => {}", self.target.display(), self.source.display())
    }

    fn current_state(&self) -> Result<ResourceState, SyncError> {
        let source_present = entry_metadata(&self.source)
            .map_err(|e| SyncError::io(&self.source, e))?
            .is_some();
        if !source_present {
            return Ok(ResourceState::Invalid {
                reason: format!("rendered file {} is missing", self.source.display()),
            });
        }

        let target_meta =
            entry_metadata(&self.target).map_err(|e| SyncError::io(&self.target, e))?;
        let state = match target_meta {
            None => ResourceState::Missing,
            Some(meta) if meta.is_dir() => ResourceState::Incorrect {
                current: "directory".to_owned(),
            },
            Some(meta) if !meta.is_symlink() => ResourceState::Incorrect {
                current: "regular file".to_owned(),
            },
            Some(_) => {
                let points_to = std::fs::read_link(&self.target)
                    .map_err(|e| SyncError::io(&self.target, e))?;
                if paths_equal(&points_to, &self.source) {
                    ResourceState::Correct
                } else {
                    ResourceState::Incorrect {
                        current: format!("link to {}", points_to.display()),
                    }
                }
            }
        };
        Ok(state)
    }

    fn apply(&self) -> Result<ResourceChange, SyncError> {
        if self.current_state()? == ResourceState::Correct {
            return Ok(ResourceChange::AlreadyCorrect);
        }
        ensure_parent_dir(&self.target)
            .map_err(|e| SyncError::link(&self.target, "create target directory", e))?;
        self.clear_target()?;

        symlink(&self.source, &self.target).map_err(|e| {
            let reason = match (e.raw_os_error(), e.kind()) {
                (Some(PRIVILEGE_NOT_HELD), _) => {
                    "symlink creation requires Developer Mode or an elevated shell"
                }
                (_, io::ErrorKind::Unsupported) => "symlinks are not supported on this platform",
                _ => "create symlink",
            };
            SyncError::link(&self.target, reason, e)
        })?;
        Ok(ResourceChange::Applied)
    }
}

/// Remove a symlink. Windows directory links must go through `remove_dir`,
/// and only the `FILE_ATTRIBUTE_DIRECTORY` bit tells them apart.
#[cfg(windows)]
fn remove_link(path: &Path, meta: &std::fs::Metadata) -> io::Result<()> {
    use std::os::windows::fs::MetadataExt as _;
    if meta.file_attributes() & 0x10 != 0 {
        std::fs::remove_dir(path)
    } else {
        std::fs::remove_file(path)
    }
}

#[cfg(not(windows))]
fn remove_link(path: &Path, _meta: &std::fs::Metadata) -> io::Result<()> {
    std::fs::remove_file(path)
}

#[cfg(unix)]
fn symlink(source: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(source, link)
}

#[cfg(windows)]
fn symlink(source: &Path, link: &Path) -> io::Result<()> {
    if source.is_dir() {
        std::os::windows::fs::symlink_dir(source, link)
    } else {
        std::os::windows::fs::symlink_file(source, link)
    }
}

#[cfg(not(any(unix, windows)))]
fn symlink(_source: &Path, _link: &Path) -> io::Result<()> {
    Err(io::Error::from(io::ErrorKind::Unsupported))
}
