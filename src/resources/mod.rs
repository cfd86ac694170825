//! Filesystem resources touched by a sync: the backup of whatever occupies a
//! link location, and the link itself.
//!
//! Both are driven the same way: inspect with
//! [`current_state`](Resource::current_state), then
//! [`apply`](Resource::apply) only when [`needs_change`](Resource::needs_change)
//! says so.
pub mod backup;
pub mod fs;
pub mod link;

use crate::error::SyncError;

/// What was found at a resource's location.
///
/// ```
/// use dotsync_cli::resources::ResourceState;
///
/// let stale = ResourceState::Incorrect { current: "points to /old/.zshrc".into() };
/// assert_ne!(stale, ResourceState::Missing);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceState {
    /// Nothing there.
    Missing,
    /// Already in the desired state.
    Correct,
    /// Occupied by something else.
    Incorrect {
        /// What occupies it, for log messages.
        current: String,
    },
    /// Cannot be brought into the desired state, e.g. the rendered file is gone.
    Invalid {
        /// Why not.
        reason: String,
    },
}

/// What [`Resource::apply`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceChange {
    /// The location was changed.
    Applied,
    /// Nothing to do.
    AlreadyCorrect,
}

/// A location on disk with a desired state.
pub trait Resource {
    /// Short `from -> to` text for log lines.
    fn description(&self) -> String;

    /// Inspect the location.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Io`] if the location cannot be inspected.
    fn current_state(&self) -> Result<ResourceState, SyncError>;

    /// Bring the location into the desired state.
    ///
    /// # Errors
    ///
    /// Returns the [`SyncError`] for this file.
    fn apply(&self) -> Result<ResourceChange, SyncError>;

    /// Whether [`apply`](Self::apply) would change anything. An
    /// [`Invalid`](ResourceState::Invalid) resource never needs a change;
    /// callers report it instead.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`current_state`](Self::current_state).
    fn needs_change(&self) -> Result<bool, SyncError> {
        let state = self.current_state()?;
        Ok(matches!(
            state,
            ResourceState::Missing | ResourceState::Incorrect { .. }
        ))
    }
}
