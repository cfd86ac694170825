//! Files dotsync reads from a managed tree and where they live.
pub mod manifest;
pub mod settings;
pub mod state;

use std::path::{Path, PathBuf};

use crate::error::SyncError;

pub use manifest::{ActionPlatform, Manifest, PathMapping, SetupAction};
pub use settings::Settings;
pub use state::TreeState;

/// Mapping manifest, at the root of the rendered tree.
pub const MANIFEST_FILE: &str = "dotsync.json";
/// Directory holding dotsync's own bookkeeping.
pub const STATE_DIR: &str = ".dotsync";
/// Advisory lock file.
pub const LOCK_FILE: &str = ".dotsync.lock";
/// Root of the append-only backup store.
pub const BACKUPS_DIR: &str = "backups";

/// Well-known paths inside a dotsync tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    /// Layout rooted at `root`.
    #[must_use]
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    /// The tree root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `dotsync.json`.
    #[must_use]
    pub fn manifest(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    /// `.dotsync/`.
    #[must_use]
    pub fn state_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR)
    }

    /// `.dotsync/state.json`.
    #[must_use]
    pub fn state_file(&self) -> PathBuf {
        self.state_dir().join("state.json")
    }

    /// `.dotsync/config.toml`.
    #[must_use]
    pub fn settings_file(&self) -> PathBuf {
        self.state_dir().join("config.toml")
    }

    /// `.dotsync/baseline/`, the last rendered template.
    #[must_use]
    pub fn baseline_dir(&self) -> PathBuf {
        self.state_dir().join("baseline")
    }

    /// `backups/`.
    #[must_use]
    pub fn backups_dir(&self) -> PathBuf {
        self.root.join(BACKUPS_DIR)
    }

    /// `.dotsync.lock`.
    #[must_use]
    pub fn lock_file(&self) -> PathBuf {
        self.root.join(LOCK_FILE)
    }
}

/// Manifest and settings of one tree.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Parsed `dotsync.json`.
    pub manifest: Manifest,
    /// Parsed `.dotsync/config.toml`.
    pub settings: Settings,
}

impl Config {
    /// Load both files; missing files yield defaults.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] if either file is malformed, or
    /// [`SyncError::Io`] if one exists but cannot be read.
    pub fn load(layout: &Layout) -> Result<Self, SyncError> {
        Ok(Self {
            manifest: Manifest::load(&layout.manifest())?,
            settings: Settings::load(&layout.settings_file())?,
        })
    }
}
