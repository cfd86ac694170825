//! Per-run context shared by the coordinator, renderers and sync engine.
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};

use crate::config::Layout;
use crate::exec::{Executor, SystemExecutor};
use crate::logging::Log;
use crate::platform::Platform;

/// Source of run timestamps.
#[cfg_attr(test, mockall::automock)]
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// [`Clock`] reading the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// [`Clock`] frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Everything one run needs, passed explicitly to every component.
pub struct SyncContext {
    /// Paths inside the managed tree.
    pub layout: Layout,
    /// Home directory used for default targets and `~` expansion.
    pub home: PathBuf,
    /// Host platform; selects the `unix/` or `windows/` folder.
    pub platform: Platform,
    /// Logger for output and summary recording.
    pub log: Arc<dyn Log>,
    /// Runs the template tool and setup actions.
    pub executor: Arc<dyn Executor>,
    /// Timestamp source for backup run folders.
    pub clock: Arc<dyn Clock>,
    /// Preview changes without writing.
    pub dry_run: bool,
    /// Set by the interrupt handler; checked between files.
    pub cancelled: Arc<AtomicBool>,
}

impl std::fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncContext")
            .field("layout", &self.layout)
            .field("home", &self.home)
            .field("platform", &self.platform)
            .field("log", &"<dyn Log>")
            .field("executor", &"<dyn Executor>")
            .field("clock", &"<dyn Clock>")
            .field("dry_run", &self.dry_run)
            .field("cancelled", &self.cancelled)
            .finish()
    }
}

impl SyncContext {
    /// Create a context for the tree at `root` with system defaults.
    #[must_use]
    pub fn new(root: &Path, home: &Path, log: Arc<dyn Log>) -> Self {
        Self {
            layout: Layout::new(root),
            home: home.to_path_buf(),
            platform: Platform::detect(),
            log,
            executor: Arc::new(SystemExecutor),
            clock: Arc::new(SystemClock),
            dry_run: false,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Root of the managed tree.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.layout.root()
    }

    /// Whether the operator asked the run to stop.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Replace the host platform.
    #[must_use]
    pub const fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Replace the executor.
    #[must_use]
    pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = executor;
        self
    }

    /// Replace the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Enable or disable dry-run mode.
    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Share an externally owned cancellation flag.
    #[must_use]
    pub fn with_cancel_flag(mut self, cancelled: Arc<AtomicBool>) -> Self {
        self.cancelled = cancelled;
        self
    }
}
