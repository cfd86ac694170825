//! Domain-specific error types for the sync engine.
//!
//! Internal plumbing returns [`anyhow::Error`] with context, while the parts
//! of the engine whose failures the operator has to act on return typed
//! errors:
//!
//! ```text
//! SyncError                — resolver and per-file failures
//! ├── Config               — malformed or ambiguous mapping manifest (pre-flight)
//! ├── Structure            — rendered tree layout is ambiguous (pre-flight)
//! ├── Io                   — an existing target cannot be inspected or backed up
//! └── Link                 — the symbolic link cannot be created
//!
//! CoordinatorError         — reasons a whole run stops
//! ```
//!
//! Command handlers convert both into [`anyhow::Error`] via `?`.

use std::path::PathBuf;

use thiserror::Error;

/// Failures raised while resolving, backing up or linking managed files.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The mapping manifest is malformed or ambiguous.
    #[error("ConfigError: {message}")]
    Config {
        /// What is wrong with the manifest.
        message: String,
    },

    /// The rendered tree does not have a usable layout.
    #[error("StructureError: {message}")]
    Structure {
        /// What is wrong with the rendered tree.
        message: String,
    },

    /// An existing entry at a target could not be read or moved aside.
    #[error("IOError: {path}: {source}")]
    Io {
        /// Path of the entry that could not be processed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The link could not be installed at its target.
    #[error("LinkError: {target}: {reason}")]
    Link {
        /// Path where the link was to be created.
        target: PathBuf,
        /// Human-readable description of the step that failed.
        reason: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

impl SyncError {
    /// Build a [`SyncError::Config`].
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Build a [`SyncError::Structure`].
    pub fn structure(message: impl Into<String>) -> Self {
        Self::Structure {
            message: message.into(),
        }
    }

    /// Build a [`SyncError::Io`] for `path`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Build a [`SyncError::Link`] for `target`.
    pub fn link(target: impl Into<PathBuf>, reason: impl Into<String>, source: std::io::Error) -> Self {
        Self::Link {
            target: target.into(),
            reason: reason.into(),
            source,
        }
    }

    /// Whether this error must abort a run before any file is touched.
    #[must_use]
    pub const fn is_preflight(&self) -> bool {
        matches!(self, Self::Config { .. } | Self::Structure { .. })
    }

    /// Short name of the error class, as shown in the run summary.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Config { .. } => "ConfigError",
            Self::Structure { .. } => "StructureError",
            Self::Io { .. } => "IOError",
            Self::Link { .. } => "LinkError",
        }
    }
}

/// Reasons a coordinator run ends in the `Aborted` state.
#[derive(Error, Debug)]
pub enum CoordinatorError {
    /// Another run holds the advisory lock.
    #[error("another dotsync run holds the lock {0} (remove it if no run is active)")]
    Locked(PathBuf),

    /// The working tree has uncommitted changes.
    #[error("working tree has uncommitted changes: {}", .0.join(", "))]
    DirtyTree(Vec<String>),

    /// `init` was pointed at a directory that already has content.
    #[error("{0} is not empty")]
    NotEmpty(PathBuf),

    /// The directory was never initialised by `dotsync init`.
    #[error("{0} is not a dotsync tree (run `dotsync init` first)")]
    NotInitialized(PathBuf),

    /// The template update produced conflicts that need manual resolution.
    #[error("template update produced {0} conflict(s)")]
    Conflicted(usize),

    /// The renderer failed.
    #[error("rendering failed: {0}")]
    Render(String),

    /// `.dotsync/state.json` could not be read or written.
    #[error("tree state: {0}")]
    State(String),

    /// A pre-flight resolver error.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// A git operation failed.
    #[error("version control error: {0}")]
    Vcs(#[from] git2::Error),

    /// A filesystem operation outside the per-file pipeline failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path involved in the failed operation.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The run was interrupted by the operator.
    #[error("interrupted")]
    Interrupted,
}

impl CoordinatorError {
    /// Build a [`CoordinatorError::Io`] for `path`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use std::io;

    // -----------------------------------------------------------------------
    // SyncError
    // -----------------------------------------------------------------------

    #[test]
    fn config_error_display() {
        let e = SyncError::config("duplicate mapping for 'common/.zshrc'");
        assert_eq!(
            e.to_string(),
            "ConfigError: duplicate mapping for 'common/.zshrc'"
        );
    }

    #[test]
    fn structure_error_display() {
        let e = SyncError::structure("both unix/ and windows/ exist");
        assert_eq!(e.to_string(), "StructureError: both unix/ and windows/ exist");
    }

    #[test]
    fn io_error_display_and_source() {
        use std::error::Error as StdError;
        let e = SyncError::io(
            "/home/u/.zshrc",
            io::Error::new(io::ErrorKind::PermissionDenied, "permission denied"),
        );
        assert!(e.to_string().starts_with("IOError: /home/u/.zshrc"));
        assert!(e.source().is_some());
    }

    #[test]
    fn link_error_display() {
        let e = SyncError::link(
            "/home/u/.zshrc",
            "create link",
            io::Error::new(io::ErrorKind::Unsupported, "unsupported"),
        );
        assert_eq!(e.to_string(), "LinkError: /home/u/.zshrc: create link");
    }

    #[test]
    fn preflight_classification() {
        assert!(SyncError::config("x").is_preflight());
        assert!(SyncError::structure("x").is_preflight());
        assert!(!SyncError::io("/x", io::Error::other("x")).is_preflight());
        assert!(!SyncError::link("/x", "x", io::Error::other("x")).is_preflight());
    }

    #[test]
    fn kind_names() {
        assert_eq!(SyncError::config("x").kind(), "ConfigError");
        assert_eq!(SyncError::structure("x").kind(), "StructureError");
        assert_eq!(SyncError::io("/x", io::Error::other("x")).kind(), "IOError");
        assert_eq!(
            SyncError::link("/x", "x", io::Error::other("x")).kind(),
            "LinkError"
        );
    }

    // -----------------------------------------------------------------------
    // CoordinatorError
    // -----------------------------------------------------------------------

    #[test]
    fn dirty_tree_lists_paths() {
        let e = CoordinatorError::DirtyTree(vec!["common/.zshrc".into(), "notes".into()]);
        assert_eq!(
            e.to_string(),
            "working tree has uncommitted changes: common/.zshrc, notes"
        );
    }

    #[test]
    fn sync_error_is_transparent() {
        let e: CoordinatorError = SyncError::config("bad").into();
        assert_eq!(e.to_string(), "ConfigError: bad");
    }

    #[test]
    fn locked_mentions_path() {
        let e = CoordinatorError::Locked(PathBuf::from("/dots/.dotsync.lock"));
        assert!(e.to_string().contains("/dots/.dotsync.lock"));
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn error_types_are_send_sync() {
        assert_send_sync::<SyncError>();
        assert_send_sync::<CoordinatorError>();
    }

    #[test]
    fn errors_convert_to_anyhow() {
        let _a: anyhow::Error = SyncError::config("x").into();
        let _b: anyhow::Error = CoordinatorError::Interrupted.into();
    }
}
