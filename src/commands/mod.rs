//! Subcommand handlers: build the run context, drive the coordinator and
//! turn its outcome into a summary and an exit status.
pub mod init;
pub mod sync;
pub mod update;
pub mod version;

use anyhow::{Context as _, Result, bail};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use crate::cli::GlobalOpts;
use crate::coordinator::{Outcome, Phase, RunOptions};
use crate::error::CoordinatorError;
use crate::logging::{Log, Logger, dotsync_cache_dir};
use crate::sync::SyncContext;

/// Everything a command handler needs besides its own options.
#[derive(Debug)]
pub struct CommandSetup {
    /// Run context for the coordinator.
    pub ctx: SyncContext,
    /// Coordinator options.
    pub opts: RunOptions,
}

impl CommandSetup {
    /// Build the context for the tree at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined or `path`
    /// cannot be made absolute.
    pub fn new(
        path: &Path,
        global: &GlobalOpts,
        trust: bool,
        log: &Arc<Logger>,
        cancelled: Arc<AtomicBool>,
    ) -> Result<Self> {
        let home = resolve_home(global.home.as_deref())?;
        let root = absolute_root(path)?;
        log.debug(&format!("tree: {}", root.display()));
        log.debug(&format!("home: {}", home.display()));

        let dyn_log: Arc<dyn Log> = Arc::<Logger>::clone(log);
        let ctx = SyncContext::new(&root, &home, dyn_log)
            .with_dry_run(global.dry_run)
            .with_cancel_flag(cancelled);
        let opts = RunOptions {
            trust,
            commit: !global.no_commit,
            cache_dir: dotsync_cache_dir().unwrap_or_else(|| std::env::temp_dir().join("dotsync")),
        };
        Ok(Self { ctx, opts })
    }
}

/// Home directory: `--home`, else `HOME` (or `USERPROFILE` on Windows).
///
/// # Errors
///
/// Returns an error if no override is given and the environment variable is
/// not set.
pub fn resolve_home(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(home) = explicit {
        return Ok(home.to_path_buf());
    }
    let home = if cfg!(target_os = "windows") {
        std::env::var("USERPROFILE")
            .or_else(|_| std::env::var("HOME"))
            .map_err(|_| anyhow::anyhow!("neither USERPROFILE nor HOME environment variable is set"))?
    } else {
        std::env::var("HOME").map_err(|_| anyhow::anyhow!("HOME environment variable is not set"))?
    };
    Ok(PathBuf::from(home))
}

/// Canonical path of an existing tree, or the absolute form of one that
/// `init` has yet to create.
fn absolute_root(path: &Path) -> Result<PathBuf> {
    if path.exists() {
        dunce::canonicalize(path).with_context(|| format!("resolving {}", path.display()))
    } else {
        std::path::absolute(path).with_context(|| format!("resolving {}", path.display()))
    }
}

/// Print the summary and map the outcome to the process result.
///
/// # Errors
///
/// Returns an error if the run aborted or any file or action failed.
pub fn finish(outcome: Outcome, log: &Logger) -> Result<()> {
    match outcome {
        Outcome::Completed(report) => {
            log.print_summary();
            if let Some(dir) = &report.sync.backup_dir {
                log.info(&format!("previous files saved in {}", dir.display()));
            }
            if report.has_failures() {
                bail!(
                    "{} file(s) and {} setup action(s) failed; fix the cause and run `dotsync sync` again",
                    report.sync.failed(),
                    report.failed_actions.len()
                );
            }
            Ok(())
        }
        Outcome::Aborted(abort) => {
            if abort.report.is_some() {
                log.print_summary();
            }
            let hint = match &abort.error {
                CoordinatorError::Sync(e) if e.is_preflight() => Some("no files were touched"),
                CoordinatorError::Interrupted if abort.phase == Phase::Syncing => Some(
                    "the rendered tree was kept; run `dotsync sync` to link the remaining files",
                ),
                CoordinatorError::Interrupted => Some("nothing was changed; run the command again"),
                _ => None,
            };
            if let Some(hint) = hint {
                log.info(hint);
            }
            let phase = abort.phase;
            Err(anyhow::Error::new(abort.error).context(format!("run aborted while {phase}")))
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::coordinator::{Abort, RunReport};

    #[test]
    fn explicit_home_wins() {
        assert_eq!(
            resolve_home(Some(Path::new("/srv/home"))).unwrap(),
            PathBuf::from("/srv/home")
        );
    }

    #[test]
    fn missing_root_is_made_absolute() {
        let root = absolute_root(Path::new("not-yet-created")).unwrap();
        assert!(root.is_absolute());
        assert!(root.ends_with("not-yet-created"));
    }

    #[test]
    fn completed_run_without_failures_is_ok() {
        let log = Logger::with_log_file(None);
        finish(Outcome::Completed(RunReport::default()), &log).unwrap();
    }

    #[test]
    fn failed_action_is_an_error() {
        let log = Logger::with_log_file(None);
        let report = RunReport {
            failed_actions: vec!["plugins".to_string()],
            ..RunReport::default()
        };
        let err = finish(Outcome::Completed(report), &log).unwrap_err();
        assert!(err.to_string().contains("1 setup action(s) failed"));
    }

    #[test]
    fn interrupted_sync_is_an_error() {
        let log = Logger::with_log_file(None);
        let outcome = Outcome::Aborted(Abort {
            phase: Phase::Syncing,
            error: CoordinatorError::Interrupted,
            report: Some(crate::sync::SyncReport::default()),
        });
        let err = finish(outcome, &log).unwrap_err();
        assert_eq!(format!("{err:#}"), "run aborted while syncing: interrupted");
    }

    #[test]
    fn abort_names_phase_and_cause() {
        let log = Logger::with_log_file(None);
        let outcome = Outcome::Aborted(Abort {
            phase: Phase::Clean,
            error: CoordinatorError::DirtyTree(vec!["common/.zshrc".to_string()]),
            report: None,
        });
        let err = finish(outcome, &log).unwrap_err();
        assert_eq!(err.to_string(), "run aborted while checking");
        assert_eq!(
            format!("{err:#}"),
            "run aborted while checking: working tree has uncommitted changes: common/.zshrc"
        );
    }
}
