//! Template update coordinator: drives one run of `init`, `update` or `sync`
//! through its phases.
//!
//! ```text
//! Clean ──> Rendering ──> Syncing ──> Committing ──> Completed
//!   │           │            │             │
//!   └───────────┴────────────┴─────────────┴──────> Aborted
//! ```
//!
//! `sync` enters at `Syncing`. Per-file failures do not abort a run; they are
//! carried in the [`RunReport`] of a completed run.
pub mod actions;
pub mod lock;
pub mod vcs;

use std::fmt;
use std::path::PathBuf;

use git2::{Oid, Repository};

use crate::config::{Config, LOCK_FILE, Settings, TreeState};
use crate::error::CoordinatorError;
use crate::render::{Engine, RenderOutcome, source};
use crate::sync::{SyncContext, SyncReport, resolve, sync_all};

pub use lock::RunLock;

/// Phases of a run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Preconditions: lock, clean working tree, recorded state.
    Clean,
    /// The renderer produces or updates the tree.
    Rendering,
    /// Managed files are backed up and linked.
    Syncing,
    /// The result is committed.
    Committing,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Clean => "checking",
            Self::Rendering => "rendering",
            Self::Syncing => "syncing",
            Self::Committing => "committing",
        })
    }
}

/// Options shared by every coordinator entry point.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Allow the template to run code: copier tasks and setup actions.
    pub trust: bool,
    /// Commit the result (still subject to `[commit] enabled`).
    pub commit: bool,
    /// Where remote templates are cloned.
    pub cache_dir: PathBuf,
}

/// Result of a completed run.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Per-file outcomes of the sync phase.
    pub sync: SyncReport,
    /// Setup actions that failed.
    pub failed_actions: Vec<String>,
    /// The commit created, if any.
    pub commit: Option<Oid>,
}

impl RunReport {
    /// Whether any file or action failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.sync.has_failures() || !self.failed_actions.is_empty()
    }
}

/// Why and where a run stopped.
#[derive(Debug)]
pub struct Abort {
    /// Phase that was running.
    pub phase: Phase,
    /// What went wrong.
    pub error: CoordinatorError,
    /// Partial sync report when the run stopped mid-sync.
    pub report: Option<SyncReport>,
}

impl Abort {
    fn new(phase: Phase, error: impl Into<CoordinatorError>) -> Self {
        Self {
            phase,
            error: error.into(),
            report: None,
        }
    }
}

impl fmt::Display for Abort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "aborted while {}: {}", self.phase, self.error)
    }
}

/// Terminal state of a run.
#[derive(Debug)]
pub enum Outcome {
    /// Every phase ran.
    Completed(RunReport),
    /// The run stopped early.
    Aborted(Abort),
}

impl From<Result<RunReport, Abort>> for Outcome {
    fn from(result: Result<RunReport, Abort>) -> Self {
        match result {
            Ok(report) => Self::Completed(report),
            Err(abort) => Self::Aborted(abort),
        }
    }
}

fn at<E: Into<CoordinatorError>>(phase: Phase) -> impl FnOnce(E) -> Abort {
    move |e| Abort::new(phase, e)
}

fn render_error(phase: Phase) -> impl FnOnce(anyhow::Error) -> Abort {
    move |e| Abort::new(phase, CoordinatorError::Render(format!("{e:#}")))
}

/// Render `template` into the empty directory at the context root, record
/// it, run setup actions when trusted, then sync and commit.
pub fn init(ctx: &SyncContext, template: &str, engine: Engine, opts: &RunOptions) -> Outcome {
    run_init(ctx, template, engine, opts).into()
}

/// Re-render the tree from its recorded template, merging upstream changes
/// into local edits, then sync and commit.
pub fn update(ctx: &SyncContext, opts: &RunOptions) -> Outcome {
    run_update(ctx, opts).into()
}

/// Back up and link the managed files of the current tree, then commit.
pub fn sync(ctx: &SyncContext, opts: &RunOptions) -> Outcome {
    run_sync(ctx, opts).into()
}

fn run_init(
    ctx: &SyncContext,
    template: &str,
    engine: Engine,
    opts: &RunOptions,
) -> Result<RunReport, Abort> {
    let root = ctx.root();
    ctx.log.stage("Preparing tree");
    ensure_empty(root).map_err(at(Phase::Clean))?;
    let template = source::normalize(template).map_err(render_error(Phase::Clean))?;
    let settings = Settings::default();
    let renderer = engine.renderer(&settings, opts.cache_dir.clone());

    if ctx.dry_run {
        ctx.log
            .dry_run(&format!("would initialise {} from {template}", root.display()));
        check_interrupt(ctx, Phase::Rendering)?;
        ctx.log.stage("Rendering");
        renderer
            .render_new(ctx, &template, opts.trust)
            .map_err(render_error(Phase::Rendering))?;
        ctx.log
            .dry_run("would record tree state, run setup actions, link and commit");
        return Ok(RunReport::default());
    }

    std::fs::create_dir_all(root)
        .map_err(|e| Abort::new(Phase::Clean, CoordinatorError::io(root, e)))?;
    let _lock = acquire_lock(ctx)?;
    let repo = vcs::open_or_init(root).map_err(at(Phase::Clean))?;
    vcs::ensure_excluded(&repo, LOCK_FILE).map_err(at(Phase::Clean))?;

    check_interrupt(ctx, Phase::Rendering)?;
    ctx.log
        .stage(&format!("Rendering {template} with {}", renderer.name()));
    match renderer
        .render_new(ctx, &template, opts.trust)
        .map_err(render_error(Phase::Rendering))?
    {
        RenderOutcome::Applied { .. } => {}
        RenderOutcome::Conflicted(conflicts) => {
            return Err(Abort::new(
                Phase::Rendering,
                CoordinatorError::Conflicted(conflicts.len()),
            ));
        }
    }
    TreeState {
        template: template.clone(),
        engine,
    }
    .save(&ctx.layout.state_file())
    .map_err(|e| Abort::new(Phase::Rendering, CoordinatorError::State(format!("{e:#}"))))?;

    let config = load_config(ctx, Phase::Syncing)?;
    let failed_actions = if opts.trust {
        ctx.log.stage("Running setup actions");
        actions::run_actions(ctx, &config.manifest)
    } else {
        let pending = config.manifest.actions_for(&ctx.platform).count();
        if pending > 0 {
            ctx.log.warn(&format!(
                "skipping {pending} setup action(s); pass --trust to run them"
            ));
        }
        Vec::new()
    };

    let sync = sync_phase(ctx, &config)?;
    let commit = commit_phase(
        ctx,
        &repo,
        &config.settings,
        opts,
        &format!("dotsync init: {template}"),
    )?;
    finish_run(sync, failed_actions, commit)
}

fn run_update(ctx: &SyncContext, opts: &RunOptions) -> Result<RunReport, Abort> {
    let layout = &ctx.layout;
    ctx.log.stage("Checking tree");
    let state = TreeState::load(&layout.state_file())
        .map_err(|e| Abort::new(Phase::Clean, CoordinatorError::State(format!("{e:#}"))))?
        .ok_or_else(|| {
            Abort::new(
                Phase::Clean,
                CoordinatorError::NotInitialized(ctx.root().to_path_buf()),
            )
        })?;
    let _lock = acquire_lock(ctx)?;
    let repo = Repository::open(ctx.root()).map_err(at(Phase::Clean))?;
    let dirty = vcs::dirty_paths(&repo).map_err(at(Phase::Clean))?;
    if !dirty.is_empty() {
        return Err(Abort::new(Phase::Clean, CoordinatorError::DirtyTree(dirty)));
    }
    let settings = Settings::load(&layout.settings_file()).map_err(at(Phase::Clean))?;

    let renderer = state.engine.renderer(&settings, opts.cache_dir.clone());
    check_interrupt(ctx, Phase::Rendering)?;
    ctx.log
        .stage(&format!("Rendering {} with {}", state.template, renderer.name()));
    match renderer
        .render_update(ctx, &state.template, opts.trust)
        .map_err(render_error(Phase::Rendering))?
    {
        RenderOutcome::Applied { changed } => {
            ctx.log
                .info(&format!("{} file(s) changed by the template", changed.len()));
            for path in &changed {
                ctx.log.debug(&format!("changed: {path}"));
            }
        }
        RenderOutcome::Conflicted(conflicts) => {
            for conflict in &conflicts {
                ctx.log.error(&format!("conflict in {}", conflict.path));
                for hunk in &conflict.hunks {
                    ctx.log.info(hunk.render().trim_end());
                }
            }
            return Err(Abort::new(
                Phase::Rendering,
                CoordinatorError::Conflicted(conflicts.len()),
            ));
        }
    }

    let config = load_config(ctx, Phase::Syncing)?;
    let sync = sync_phase(ctx, &config)?;
    let commit = commit_phase(
        ctx,
        &repo,
        &config.settings,
        opts,
        &format!("dotsync update: {}", state.template),
    )?;
    finish_run(sync, Vec::new(), commit)
}

fn run_sync(ctx: &SyncContext, opts: &RunOptions) -> Result<RunReport, Abort> {
    let _lock = acquire_lock(ctx)?;
    let repo = Repository::open(ctx.root()).map_err(at(Phase::Clean))?;
    let config = load_config(ctx, Phase::Syncing)?;
    let sync = sync_phase(ctx, &config)?;
    let commit = commit_phase(ctx, &repo, &config.settings, opts, "dotsync sync")?;
    finish_run(sync, Vec::new(), commit)
}

/// Abort in `phase` if the operator has asked the run to stop. Only called
/// before the renderer has written anything.
fn check_interrupt(ctx: &SyncContext, phase: Phase) -> Result<(), Abort> {
    if ctx.is_cancelled() {
        return Err(Abort::new(phase, CoordinatorError::Interrupted));
    }
    Ok(())
}

/// An interrupted sync still reaches the commit phase so the rendered tree
/// is recorded; the run then aborts with the partial report.
fn finish_run(
    sync: SyncReport,
    failed_actions: Vec<String>,
    commit: Option<Oid>,
) -> Result<RunReport, Abort> {
    if sync.interrupted {
        return Err(Abort {
            phase: Phase::Syncing,
            error: CoordinatorError::Interrupted,
            report: Some(sync),
        });
    }
    Ok(RunReport {
        sync,
        failed_actions,
        commit,
    })
}

/// Dry runs write nothing, the lock file included.
fn acquire_lock(ctx: &SyncContext) -> Result<Option<RunLock>, Abort> {
    if ctx.dry_run {
        return Ok(None);
    }
    let lock = RunLock::acquire(&ctx.layout.lock_file()).map_err(at(Phase::Clean))?;
    ctx.log.debug(&format!("holding {}", lock.path().display()));
    Ok(Some(lock))
}

fn ensure_empty(root: &std::path::Path) -> Result<(), CoordinatorError> {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(CoordinatorError::io(root, e)),
    };
    for entry in entries {
        let entry = entry.map_err(|e| CoordinatorError::io(root, e))?;
        if entry.file_name() != ".git" {
            return Err(CoordinatorError::NotEmpty(root.to_path_buf()));
        }
    }
    Ok(())
}

fn load_config(ctx: &SyncContext, phase: Phase) -> Result<Config, Abort> {
    Config::load(&ctx.layout).map_err(at(phase))
}

/// Resolve, then back up and link. Resolver errors abort before any file is
/// touched; an interrupt ends the batch early and is reported by the caller
/// after the commit.
fn sync_phase(ctx: &SyncContext, config: &Config) -> Result<SyncReport, Abort> {
    ctx.log.stage("Syncing dotfiles");
    let resolution = resolve(ctx.root(), &config.manifest, &ctx.platform, &ctx.home)
        .map_err(at(Phase::Syncing))?;
    for key in &resolution.unmatched {
        ctx.log.warn(&format!("mapping {key} matches no file"));
    }
    ctx.log
        .debug(&format!("{} managed file(s)", resolution.files.len()));

    Ok(sync_all(ctx, &resolution.files))
}

fn commit_phase(
    ctx: &SyncContext,
    repo: &Repository,
    settings: &Settings,
    opts: &RunOptions,
    message: &str,
) -> Result<Option<Oid>, Abort> {
    if !opts.commit || !settings.commit.enabled {
        ctx.log.debug("commit disabled");
        return Ok(None);
    }
    ctx.log.stage("Committing");
    if ctx.dry_run {
        ctx.log.dry_run(&format!("would commit \"{message}\""));
        return Ok(None);
    }
    let commit = vcs::commit_all(repo, message, &settings.commit).map_err(at(Phase::Committing))?;
    match commit {
        Some(id) => ctx.log.info(&format!("committed {id}: {message}")),
        None => ctx.log.info("nothing to commit"),
    }
    Ok(commit)
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use crate::logging::{EntryStatus, Log, Logger};
    use crate::platform::{Os, Platform};
    use std::path::Path;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Sets the cancel flag when the sync stage starts, as a Ctrl-C landing
    /// right after rendering would.
    struct CancelOnSync {
        inner: Logger,
        flag: Arc<AtomicBool>,
    }

    impl Log for CancelOnSync {
        fn stage(&self, msg: &str) {
            if msg == "Syncing dotfiles" {
                self.flag.store(true, Ordering::SeqCst);
            }
            self.inner.stage(msg);
        }
        fn info(&self, msg: &str) {
            self.inner.info(msg);
        }
        fn debug(&self, msg: &str) {
            self.inner.debug(msg);
        }
        fn warn(&self, msg: &str) {
            self.inner.warn(msg);
        }
        fn error(&self, msg: &str) {
            self.inner.error(msg);
        }
        fn dry_run(&self, msg: &str) {
            self.inner.dry_run(msg);
        }
        fn record(&self, name: &str, status: EntryStatus, message: Option<&str>) {
            self.inner.record(name, status, message);
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let fx = Self {
                dir: tempfile::tempdir().unwrap(),
            };
            for (rel, content) in [
                ("dotsync.json", r#"{ "mappings": { "common/.vimrc": "~/.config/vim/vimrc" } }"#),
                ("common/.gitconfig", "[user]\n\tname = me\n"),
                ("common/.vimrc", "set nu\n"),
                ("unix/.zshrc", "export A=1\n"),
                ("windows/profile.ps1", "Set-Alias ll ls\n"),
            ] {
                let path = fx.template().join(rel);
                std::fs::create_dir_all(path.parent().unwrap()).unwrap();
                std::fs::write(path, content).unwrap();
            }
            std::fs::create_dir_all(fx.home()).unwrap();
            fx
        }

        fn template(&self) -> PathBuf {
            self.dir.path().join("template")
        }

        fn root(&self) -> PathBuf {
            self.dir.path().join("tree")
        }

        fn home(&self) -> PathBuf {
            self.dir.path().join("home")
        }

        fn context(&self) -> SyncContext {
            let log: Arc<dyn Log> = Arc::new(Logger::with_log_file(None));
            SyncContext::new(&self.root(), &self.home(), log)
                .with_platform(Platform::new(Os::Unix))
        }

        /// Context whose cancel flag is raised once syncing begins.
        fn context_cancelled_on_sync(&self) -> SyncContext {
            let flag = Arc::new(AtomicBool::new(false));
            let log: Arc<dyn Log> = Arc::new(CancelOnSync {
                inner: Logger::with_log_file(None),
                flag: Arc::clone(&flag),
            });
            SyncContext::new(&self.root(), &self.home(), log)
                .with_platform(Platform::new(Os::Unix))
                .with_cancel_flag(flag)
        }

        fn options(&self) -> RunOptions {
            RunOptions {
                trust: false,
                commit: true,
                cache_dir: self.dir.path().join("cache"),
            }
        }

        fn init(&self) -> Outcome {
            init(
                &self.context(),
                &self.template().to_string_lossy(),
                Engine::Builtin,
                &self.options(),
            )
        }
    }

    fn completed(outcome: Outcome) -> RunReport {
        match outcome {
            Outcome::Completed(report) => report,
            Outcome::Aborted(abort) => panic!("run aborted: {abort}"),
        }
    }

    fn aborted(outcome: Outcome) -> Abort {
        match outcome {
            Outcome::Aborted(abort) => abort,
            Outcome::Completed(_) => panic!("run completed"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn init_renders_links_and_commits() {
        let fx = Fixture::new();
        let report = completed(fx.init());

        assert_eq!(report.sync.synced(), 3);
        assert!(report.commit.is_some());
        assert_eq!(
            std::fs::read_link(fx.home().join(".config/vim/vimrc")).unwrap(),
            fx.root().join("common/.vimrc")
        );
        assert!(!fx.root().join("windows").exists());
        assert!(!fx.root().join(LOCK_FILE).exists());

        let state = TreeState::load(&fx.root().join(".dotsync/state.json"))
            .unwrap()
            .unwrap();
        assert_eq!(state.engine, Engine::Builtin);

        let repo = Repository::open(fx.root()).unwrap();
        assert!(vcs::dirty_paths(&repo).unwrap().is_empty());
    }

    #[test]
    fn init_rejects_non_empty_directory() {
        let fx = Fixture::new();
        std::fs::create_dir_all(fx.root()).unwrap();
        std::fs::write(fx.root().join("notes.txt"), "x").unwrap();

        let abort = aborted(fx.init());
        assert_eq!(abort.phase, Phase::Clean);
        assert!(matches!(abort.error, CoordinatorError::NotEmpty(_)));
    }

    #[test]
    fn init_dry_run_creates_nothing() {
        let fx = Fixture::new();
        let ctx = fx.context().with_dry_run(true);
        let outcome = init(
            &ctx,
            &fx.template().to_string_lossy(),
            Engine::Builtin,
            &fx.options(),
        );
        completed(outcome);
        assert!(!fx.root().exists());
    }

    #[test]
    fn update_requires_initialised_tree() {
        let fx = Fixture::new();
        std::fs::create_dir_all(fx.root()).unwrap();
        let abort = aborted(update(&fx.context(), &fx.options()));
        assert!(matches!(abort.error, CoordinatorError::NotInitialized(_)));
    }

    #[cfg(unix)]
    #[test]
    fn update_aborts_on_dirty_tree() {
        let fx = Fixture::new();
        completed(fx.init());
        std::fs::write(fx.root().join("common/.vimrc"), "set nu rnu\n").unwrap();

        let abort = aborted(update(&fx.context(), &fx.options()));
        assert_eq!(abort.phase, Phase::Clean);
        let CoordinatorError::DirtyTree(paths) = abort.error else {
            panic!("expected dirty tree");
        };
        assert_eq!(paths, vec!["common/.vimrc"]);
    }

    #[cfg(unix)]
    #[test]
    fn locked_tree_aborts() {
        let fx = Fixture::new();
        completed(fx.init());
        let _held = RunLock::acquire(&fx.root().join(LOCK_FILE)).unwrap();

        let abort = aborted(sync(&fx.context(), &fx.options()));
        assert!(matches!(abort.error, CoordinatorError::Locked(_)));
    }

    #[cfg(unix)]
    #[test]
    fn bad_manifest_aborts_before_linking() {
        let fx = Fixture::new();
        let opts = RunOptions {
            commit: false,
            ..fx.options()
        };
        std::fs::create_dir_all(fx.root().join("common")).unwrap();
        std::fs::write(fx.root().join("common/.zshrc"), "x\n").unwrap();
        std::fs::write(
            fx.root().join("dotsync.json"),
            r#"{ "mappings": { "common/.zshrc": "/a", ".zshrc": "/b" } }"#,
        )
        .unwrap();
        vcs::open_or_init(&fx.root()).unwrap();

        let abort = aborted(sync(&fx.context(), &opts));
        assert_eq!(abort.phase, Phase::Syncing);
        assert!(matches!(
            abort.error,
            CoordinatorError::Sync(crate::error::SyncError::Config { .. })
        ));
        assert!(!fx.home().join(".zshrc").exists());
    }

    #[cfg(unix)]
    #[test]
    fn interrupt_before_rendering_changes_nothing() {
        let fx = Fixture::new();
        completed(fx.init());
        std::fs::write(fx.template().join("common/.inputrc"), "set bell-style none\n").unwrap();

        let ctx = fx.context();
        ctx.cancelled.store(true, Ordering::SeqCst);
        let abort = aborted(update(&ctx, &fx.options()));
        assert_eq!(abort.phase, Phase::Rendering);
        assert!(matches!(abort.error, CoordinatorError::Interrupted));
        assert!(!fx.root().join("common/.inputrc").exists());
        assert!(!fx.root().join(LOCK_FILE).exists());

        let report = completed(update(&fx.context(), &fx.options()));
        assert_eq!(report.sync.synced(), 1);
        assert!(fx.home().join(".inputrc").is_symlink());
    }

    #[cfg(unix)]
    #[test]
    fn interrupt_after_rendering_commits_and_allows_rerun() {
        let fx = Fixture::new();
        completed(fx.init());
        std::fs::write(fx.template().join("common/.inputrc"), "set bell-style none\n").unwrap();

        let abort = aborted(update(&fx.context_cancelled_on_sync(), &fx.options()));
        assert_eq!(abort.phase, Phase::Syncing);
        assert!(matches!(abort.error, CoordinatorError::Interrupted));
        let partial = abort.report.unwrap();
        assert!(partial.interrupted);
        assert!(partial.files.is_empty());
        assert!(fx.root().join("common/.inputrc").is_file());
        assert!(!fx.home().join(".inputrc").exists());

        let repo = Repository::open(fx.root()).unwrap();
        assert!(vcs::dirty_paths(&repo).unwrap().is_empty());

        completed(update(&fx.context(), &fx.options()));
        completed(sync(&fx.context(), &fx.options()));
        assert_eq!(
            std::fs::read_link(fx.home().join(".inputrc")).unwrap(),
            fx.root().join("common/.inputrc")
        );
    }

    #[test]
    fn abort_display_names_phase() {
        let abort = Abort::new(Phase::Rendering, CoordinatorError::Conflicted(2));
        assert_eq!(
            abort.to_string(),
            "aborted while rendering: template update produced 2 conflict(s)"
        );
    }

    #[test]
    fn ensure_empty_allows_git_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        ensure_empty(dir.path()).unwrap();
        ensure_empty(&dir.path().join("missing")).unwrap();
        std::fs::write(dir.path().join("x"), "").unwrap();
        assert!(ensure_empty(Path::new(dir.path())).is_err());
    }
}
