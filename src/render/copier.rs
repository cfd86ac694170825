//! Renderer delegating to the external `copier` tool.
use anyhow::{Context as _, Result, bail};
use walkdir::WalkDir;

use super::{Conflict, RenderOutcome, Renderer};
use crate::config::{BACKUPS_DIR, STATE_DIR};
use crate::sync::SyncContext;

/// Runs `copier copy` for new trees and `copier update` for existing ones.
#[derive(Debug, Clone)]
pub struct CopierRenderer {
    program: String,
}

impl CopierRenderer {
    /// Create a renderer invoking `program`.
    #[must_use]
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
        }
    }

    fn ensure_available(&self, ctx: &SyncContext) -> Result<()> {
        if !ctx.executor.which(&self.program) {
            bail!(
                "{} not found on PATH; install it or select --engine builtin",
                self.program
            );
        }
        Ok(())
    }
}

impl Renderer for CopierRenderer {
    fn name(&self) -> &'static str {
        "copier"
    }

    fn render_new(&self, ctx: &SyncContext, template: &str, trust: bool) -> Result<RenderOutcome> {
        let root = ctx.root().to_string_lossy().into_owned();
        let mut args = vec!["copy"];
        if trust {
            args.push("--trust");
        }
        args.extend([template, root.as_str()]);

        if ctx.dry_run {
            ctx.log
                .dry_run(&format!("would run {} {}", self.program, args.join(" ")));
            return Ok(RenderOutcome::Applied { changed: vec![] });
        }

        self.ensure_available(ctx)?;
        ctx.executor
            .run_interactive_in(ctx.root(), &self.program, &args)
            .with_context(|| format!("rendering {template}"))?;
        Ok(RenderOutcome::Applied { changed: vec![] })
    }

    fn render_update(
        &self,
        ctx: &SyncContext,
        template: &str,
        trust: bool,
    ) -> Result<RenderOutcome> {
        let mut args = vec!["update", "--conflict", "rej"];
        if trust {
            args.push("--trust");
        }

        if ctx.dry_run {
            ctx.log
                .dry_run(&format!("would run {} {}", self.program, args.join(" ")));
            return Ok(RenderOutcome::Applied { changed: vec![] });
        }

        self.ensure_available(ctx)?;
        ctx.executor
            .run_interactive_in(ctx.root(), &self.program, &args)
            .with_context(|| format!("updating from {template}"))?;

        let rejects = reject_files(ctx)?;
        if rejects.is_empty() {
            Ok(RenderOutcome::Applied { changed: vec![] })
        } else {
            Ok(RenderOutcome::Conflicted(rejects))
        }
    }
}

/// `*.rej` files copier leaves next to hunks it could not apply. Backups and
/// dotsync's own state are not template output and are skipped.
fn reject_files(ctx: &SyncContext) -> Result<Vec<Conflict>> {
    let root = ctx.root();
    let mut conflicts = Vec::new();
    let walker = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            let name = e.file_name();
            name != ".git" && !(e.depth() == 1 && (name == BACKUPS_DIR || name == STATE_DIR))
        });
    for entry in walker {
        let entry = entry.with_context(|| format!("scanning {}", root.display()))?;
        if !entry.file_type().is_file()
            || entry.path().extension().is_none_or(|ext| ext != "rej")
        {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");
        conflicts.push(Conflict {
            path: rel,
            hunks: vec![],
        });
    }
    Ok(conflicts)
}
