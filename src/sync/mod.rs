//! Sync engine: resolve managed files, back up what is in the way, link.
//!
//! Each file goes through the same check-then-apply sequence:
//!
//! ```text
//! link already correct?  ── yes ──> Skipped
//!        │ no
//! back up foreign entry  ── IOError ──> Failed
//!        │
//! install link           ── LinkError ──> Failed
//!        │
//!     Synced
//! ```
//!
//! Failures are isolated per file; the batch always continues unless the
//! operator interrupts it.
pub mod context;
pub mod resolver;

use std::io;
use std::path::PathBuf;

use crate::error::SyncError;
use crate::logging::EntryStatus;
use crate::platform::Category;
use crate::resources::backup::{BackupResource, BackupRun};
use crate::resources::link::LinkResource;
use crate::resources::{Resource, ResourceState};

pub use context::{Clock, FixedClock, SyncContext, SystemClock};
pub use resolver::{Resolution, resolve};

/// One dotfile under management.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedFile {
    /// Category folder the file was found in.
    pub category: Category,
    /// `/`-separated path inside the category folder.
    pub relative_path: String,
    /// Absolute path of the rendered file.
    pub source: PathBuf,
    /// Where the link is installed.
    pub target_path: PathBuf,
}

impl ManagedFile {
    /// Category-qualified name, e.g. `unix/.zshrc`.
    #[must_use]
    pub fn name(&self) -> String {
        format!("{}/{}", self.category, self.relative_path)
    }
}

/// What happened to one managed file.
#[derive(Debug)]
pub enum FileOutcome {
    /// The link was installed, after moving any foreign entry to `backup`.
    Synced {
        /// Backup location of the previous entry, if one was moved.
        backup: Option<PathBuf>,
    },
    /// The correct link was already in place.
    Skipped,
    /// Dry run: the link would have been installed.
    DryRun {
        /// Whether an existing entry would have been backed up first.
        would_backup: bool,
    },
    /// Backing up or linking failed.
    Failed(SyncError),
}

/// Outcome of one file in a [`SyncReport`].
#[derive(Debug)]
pub struct FileReport {
    /// The managed file.
    pub file: ManagedFile,
    /// What happened to it.
    pub outcome: FileOutcome,
}

/// Result of running the engine over a batch of managed files.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Per-file outcomes in processing order.
    pub files: Vec<FileReport>,
    /// The run's backup folder, if anything was backed up.
    pub backup_dir: Option<PathBuf>,
    /// Whether the batch stopped early on an interrupt.
    pub interrupted: bool,
}

impl SyncReport {
    fn count(&self, pred: impl Fn(&FileOutcome) -> bool) -> usize {
        self.files.iter().filter(|r| pred(&r.outcome)).count()
    }

    /// Number of files linked during this run.
    #[must_use]
    pub fn synced(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Synced { .. }))
    }

    /// Number of files whose link was already correct.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Skipped))
    }

    /// Number of entries moved into the backup folder.
    #[must_use]
    pub fn backups(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Synced { backup: Some(_) }))
    }

    /// Number of failed files.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Failed(_)))
    }

    /// Whether any file failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }

    /// Failed files with their errors.
    pub fn failures(&self) -> impl Iterator<Item = (&ManagedFile, &SyncError)> {
        self.files.iter().filter_map(|r| match &r.outcome {
            FileOutcome::Failed(e) => Some((&r.file, e)),
            _ => None,
        })
    }
}

/// Back up and link every file, in order, collecting per-file outcomes.
///
/// Stops before the next file once the context's cancellation flag is set.
#[must_use]
pub fn sync_all(ctx: &SyncContext, files: &[ManagedFile]) -> SyncReport {
    let run = BackupRun::allocate(&ctx.layout.backups_dir(), ctx.clock.now());
    let mut report = SyncReport::default();

    for file in files {
        if ctx.is_cancelled() {
            ctx.log
                .warn("interrupted; remaining files were not processed");
            report.interrupted = true;
            break;
        }

        let outcome = sync_file(ctx, &run, file).unwrap_or_else(FileOutcome::Failed);
        record(ctx, file, &outcome);
        if matches!(outcome, FileOutcome::Synced { backup: Some(_) }) {
            report.backup_dir = Some(run.dir().to_path_buf());
        }
        report.files.push(FileReport {
            file: file.clone(),
            outcome,
        });
    }

    report
}

fn sync_file(
    ctx: &SyncContext,
    run: &BackupRun,
    file: &ManagedFile,
) -> Result<FileOutcome, SyncError> {
    let link = LinkResource::new(file.source.clone(), file.target_path.clone());
    match link.current_state()? {
        ResourceState::Correct => {
            ctx.log.debug(&format!("ok: {}", link.description()));
            return Ok(FileOutcome::Skipped);
        }
        ResourceState::Invalid { reason } => {
            return Err(SyncError::io(
                &file.source,
                io::Error::new(io::ErrorKind::NotFound, reason),
            ));
        }
        ResourceState::Missing | ResourceState::Incorrect { .. } => {}
    }

    let backup = BackupResource::new(
        file.source.clone(),
        file.target_path.clone(),
        run.destination(&file.relative_path),
    );
    let needs_backup = backup.needs_change()?;

    if ctx.dry_run {
        if needs_backup {
            ctx.log.dry_run(&format!("would back up {}", backup.description()));
        }
        ctx.log.dry_run(&format!("would link {}", link.description()));
        return Ok(FileOutcome::DryRun {
            would_backup: needs_backup,
        });
    }

    let backed_up = if needs_backup {
        backup.apply()?;
        ctx.log.debug(&format!("backed up {}", backup.description()));
        Some(backup.destination)
    } else {
        None
    };

    link.apply()?;
    ctx.log.debug(&format!("linked {}", link.description()));

    Ok(FileOutcome::Synced { backup: backed_up })
}

fn record(ctx: &SyncContext, file: &ManagedFile, outcome: &FileOutcome) {
    let name = file.name();
    match outcome {
        FileOutcome::Synced { backup } => {
            let message = backup
                .as_ref()
                .map(|path| format!("backed up to {}", path.display()));
            ctx.log.record(&name, EntryStatus::Synced, message.as_deref());
        }
        FileOutcome::Skipped => ctx.log.record(&name, EntryStatus::Skipped, None),
        FileOutcome::DryRun { would_backup } => {
            let message = would_backup.then_some("would back up existing entry");
            ctx.log.record(&name, EntryStatus::DryRun, message);
        }
        FileOutcome::Failed(err) => {
            ctx.log.error(&format!("{name}: {err}"));
            ctx.log
                .record(&name, EntryStatus::Failed, Some(&err.to_string()));
        }
    }
}
