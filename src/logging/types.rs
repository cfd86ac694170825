//! Summary entries, their status, and the [`Log`] trait engine code writes to.

/// One line of the end-of-run summary.
#[derive(Debug, Clone)]
pub struct SummaryEntry {
    /// Managed file (`unix/.zshrc`) or setup action (`action plugins`).
    pub name: String,
    /// How it ended.
    pub status: EntryStatus,
    /// Backup location or error text.
    pub message: Option<String>,
}

/// How a managed file or setup action ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    /// Linked (or run) during this run.
    Synced,
    /// Already correct.
    Skipped,
    /// Previewed only.
    DryRun,
    /// Failed; the message says why.
    Failed,
}

impl EntryStatus {
    /// Every status, in summary order.
    pub const ALL: [Self; 4] = [Self::Synced, Self::Skipped, Self::DryRun, Self::Failed];

    /// Summary marker and its colour code.
    #[must_use]
    pub const fn marker(self) -> (&'static str, &'static str) {
        match self {
            Self::Synced => ("✓", "\x1b[32m"),
            Self::Skipped => ("·", "\x1b[2m"),
            Self::DryRun => ("~", "\x1b[37m"),
            Self::Failed => ("✗", "\x1b[31m"),
        }
    }

    /// Word used in the summary totals.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Synced => "synced",
            Self::Skipped => "skipped",
            Self::DryRun => "dry-run",
            Self::Failed => "failed",
        }
    }
}

/// Sink for engine and coordinator messages.
///
/// [`Logger`](super::Logger) is the production implementation; it forwards
/// to [`tracing`] and keeps the summary entries.
pub trait Log: Send + Sync {
    /// Coordinator phase header.
    fn stage(&self, msg: &str);
    /// Progress message.
    fn info(&self, msg: &str);
    /// Detail shown only with `--verbose`; always in the run log.
    fn debug(&self, msg: &str);
    /// Something the operator should look at.
    fn warn(&self, msg: &str);
    /// Something failed.
    fn error(&self, msg: &str);
    /// A change a dry run would have made.
    fn dry_run(&self, msg: &str);
    /// Add a line to the end-of-run summary.
    fn record(&self, name: &str, status: EntryStatus, message: Option<&str>);
}
