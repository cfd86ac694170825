//! Template renderers: produce or update the rendered tree.
pub mod builtin;
pub mod copier;
pub mod merge;
pub mod source;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::config::Settings;
use crate::sync::SyncContext;

pub use builtin::BuiltinRenderer;
pub use copier::CopierRenderer;
pub use merge::{ConflictHunk, MergeOutcome, merge_file};

/// Which renderer drives a tree.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    /// Copy the template and merge updates against a tracked baseline.
    #[default]
    Builtin,
    /// Delegate to the external `copier` tool.
    Copier,
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Builtin => "builtin",
            Self::Copier => "copier",
        })
    }
}

impl Engine {
    /// Build the renderer for this engine.
    #[must_use]
    pub fn renderer(self, settings: &Settings, cache_dir: PathBuf) -> Box<dyn Renderer> {
        match self {
            Self::Builtin => Box::new(BuiltinRenderer::new(cache_dir)),
            Self::Copier => Box::new(CopierRenderer::new(&settings.copier.program)),
        }
    }
}

/// A file whose template update could not be applied automatically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    /// Path relative to the tree root.
    pub path: String,
    /// Overlapping regions, when the renderer can describe them.
    pub hunks: Vec<ConflictHunk>,
}

/// Result of a render step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    /// Changes were applied (or previewed in a dry run).
    Applied {
        /// Paths relative to the tree root that were written or removed.
        changed: Vec<String>,
    },
    /// The update needs manual resolution; see each conflict.
    Conflicted(Vec<Conflict>),
}

/// Produces the rendered tree from a template.
pub trait Renderer {
    /// Short engine name for logs.
    fn name(&self) -> &'static str;

    /// Render `template` into the empty tree at the context root.
    ///
    /// # Errors
    ///
    /// Returns an error if the template cannot be fetched or written.
    fn render_new(&self, ctx: &SyncContext, template: &str, trust: bool) -> Result<RenderOutcome>;

    /// Apply the current state of `template` to an already rendered tree,
    /// keeping local edits that do not overlap template changes.
    ///
    /// # Errors
    ///
    /// Returns an error if the template cannot be fetched or the tree
    /// cannot be updated.
    fn render_update(
        &self,
        ctx: &SyncContext,
        template: &str,
        trust: bool,
    ) -> Result<RenderOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_names() {
        assert_eq!(Engine::Builtin.to_string(), "builtin");
        assert_eq!(Engine::Copier.to_string(), "copier");
        assert_eq!(Engine::default(), Engine::Builtin);
    }

    #[test]
    fn renderer_matches_engine() {
        let settings = Settings::default();
        let cache = std::env::temp_dir();
        assert_eq!(
            Engine::Builtin.renderer(&settings, cache.clone()).name(),
            "builtin"
        );
        assert_eq!(Engine::Copier.renderer(&settings, cache).name(), "copier");
    }
}
