//! Per-tree settings from `.dotsync/config.toml`.
use serde::Deserialize;
use std::path::Path;

use crate::error::SyncError;

/// Commit phase settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CommitSettings {
    /// Whether runs commit their result.
    pub enabled: bool,
    /// Author name used when git has no `user.name` configured.
    pub author_name: String,
    /// Author email used when git has no `user.email` configured.
    pub author_email: String,
}

impl Default for CommitSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            author_name: "dotsync".to_string(),
            author_email: "dotsync@localhost".to_string(),
        }
    }
}

/// External template tool settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CopierSettings {
    /// Program invoked for the copier engine.
    pub program: String,
}

impl Default for CopierSettings {
    fn default() -> Self {
        Self {
            program: "copier".to_string(),
        }
    }
}

/// Settings for one dotsync tree. Every field is optional in the file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// `[commit]` table.
    pub commit: CommitSettings,
    /// `[copier]` table.
    pub copier: CopierSettings,
}

impl Settings {
    /// Load settings from `path`; a missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Io`] if the file cannot be read, or
    /// [`SyncError::Config`] if it is not valid TOML for this schema.
    pub fn load(path: &Path) -> Result<Self, SyncError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(SyncError::io(path, e)),
        };
        toml::from_str(&content)
            .map_err(|e| SyncError::config(format!("{}: {}", path.display(), e.message())))
    }
}
