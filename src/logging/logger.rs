//! [`Logger`]: forwards messages to [`tracing`] and collects the run summary.
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::subscriber::{DRY_RUN_TARGET, STAGE_TARGET};
use super::types::{EntryStatus, Log, SummaryEntry};
use super::utils::log_file_path;

/// Production [`Log`] implementation.
///
/// Console and file output are handled by the subscriber installed with
/// [`init_subscriber`](super::init_subscriber); the logger itself only keeps
/// the summary entries and the path of the run log.
#[derive(Debug)]
pub struct Logger {
    entries: Mutex<Vec<SummaryEntry>>,
    log_file: Option<PathBuf>,
}

impl Logger {
    /// Logger for `command`, whose run log is `<cache>/dotsync/<command>.log`.
    #[must_use]
    pub fn new(command: &str) -> Self {
        Self::with_log_file(log_file_path(command))
    }

    /// Logger whose summary footer points at `log_file`.
    #[must_use]
    pub const fn with_log_file(log_file: Option<PathBuf>) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            log_file,
        }
    }

    /// Path of the run log, if one could be created.
    #[must_use]
    pub fn log_path(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }

    /// Snapshot of the recorded summary entries.
    #[must_use]
    pub fn entries(&self) -> Vec<SummaryEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Number of entries with `status`.
    #[must_use]
    pub fn count(&self, status: EntryStatus) -> usize {
        self.entries.lock().map_or(0, |entries| {
            entries.iter().filter(|e| e.status == status).count()
        })
    }

    /// Number of failed entries.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.count(EntryStatus::Failed)
    }

    /// Log one line per recorded entry followed by the totals.
    pub fn print_summary(&self) {
        let entries = self.entries();
        if entries.is_empty() {
            return;
        }

        self.stage("Summary");
        for entry in &entries {
            let (marker, colour) = entry.status.marker();
            let detail = entry
                .message
                .as_deref()
                .map(|msg| format!(" ({msg})"))
                .unwrap_or_default();
            self.info(&format!("{colour}{marker} {}{detail}\x1b[0m", entry.name));
        }

        let totals: Vec<String> = EntryStatus::ALL
            .iter()
            .map(|&status| {
                let n = entries.iter().filter(|e| e.status == status).count();
                let (_, colour) = status.marker();
                format!("{colour}{n} {}\x1b[0m", status.label())
            })
            .collect();
        self.info(&format!("{} entries: {}", entries.len(), totals.join(", ")));

        if let Some(path) = self.log_path() {
            self.info(&format!("\x1b[2mlog: {}\x1b[0m", path.display()));
        }
    }
}

impl Log for Logger {
    fn stage(&self, msg: &str) {
        tracing::info!(target: STAGE_TARGET, "{msg}");
    }

    fn info(&self, msg: &str) {
        tracing::info!("{msg}");
    }

    fn debug(&self, msg: &str) {
        tracing::debug!("{msg}");
    }

    fn warn(&self, msg: &str) {
        tracing::warn!("{msg}");
    }

    fn error(&self, msg: &str) {
        tracing::error!("{msg}");
    }

    fn dry_run(&self, msg: &str) {
        tracing::info!(target: DRY_RUN_TARGET, "{msg}");
    }

    fn record(&self, name: &str, status: EntryStatus, message: Option<&str>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(SummaryEntry {
                name: name.to_owned(),
                status,
                message: message.map(str::to_owned),
            });
        }
    }
}
