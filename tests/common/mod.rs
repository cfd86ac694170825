// Shared helpers for integration tests.
//
// Provides a temporary-directory-backed environment (template, tree, home
// and cache directories) and thin wrappers around the coordinator so each
// integration test can drive whole runs without repeating boilerplate.
//
// Used by all integration test binaries that declare `mod common;`.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dotsync_cli::config::settings::CommitSettings;
use dotsync_cli::coordinator::{self, Abort, Outcome, RunOptions, RunReport, vcs};
use dotsync_cli::logging::{Log, Logger};
use dotsync_cli::platform::{Os, Platform};
use dotsync_cli::render::Engine;
use dotsync_cli::sync::SyncContext;

/// An isolated environment backed by a [`tempfile::TempDir`].
///
/// ```text
/// <tmp>/template/   template the tree is rendered from
/// <tmp>/tree/       rendered tree (created by `init`)
/// <tmp>/home/       home directory links are installed under
/// <tmp>/cache/      template cache
/// ```
pub struct TestEnv {
    dir: tempfile::TempDir,
}

impl TestEnv {
    /// Create an environment with empty template and home directories.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        std::fs::create_dir_all(dir.path().join("template")).expect("create template dir");
        std::fs::create_dir_all(dir.path().join("home")).expect("create home dir");
        Self { dir }
    }

    pub fn template(&self) -> PathBuf {
        self.dir.path().join("template")
    }

    pub fn root(&self) -> PathBuf {
        self.dir.path().join("tree")
    }

    pub fn home(&self) -> PathBuf {
        self.dir.path().join("home")
    }

    /// Write a file into the template.
    pub fn write_template(&self, rel: &str, content: &str) -> &Self {
        write(&self.template().join(rel), content);
        self
    }

    /// Write a file into the rendered tree.
    pub fn write_tree(&self, rel: &str, content: &str) -> &Self {
        write(&self.root().join(rel), content);
        self
    }

    /// Write a file under the home directory.
    pub fn write_home(&self, rel: &str, content: &str) -> &Self {
        write(&self.home().join(rel), content);
        self
    }

    pub fn read_tree(&self, rel: &str) -> String {
        std::fs::read_to_string(self.root().join(rel)).expect("read tree file")
    }

    /// A fresh context on a Unix host, with its logger.
    pub fn context(&self) -> (SyncContext, Arc<Logger>) {
        let logger = Arc::new(Logger::with_log_file(None));
        let log: Arc<dyn Log> = Arc::<Logger>::clone(&logger);
        let ctx = SyncContext::new(&self.root(), &self.home(), log)
            .with_platform(Platform::new(Os::Unix));
        (ctx, logger)
    }

    pub fn options(&self, trust: bool) -> RunOptions {
        RunOptions {
            trust,
            commit: true,
            cache_dir: self.dir.path().join("cache"),
        }
    }

    pub fn init(&self, trust: bool) -> Outcome {
        let (ctx, _) = self.context();
        coordinator::init(
            &ctx,
            &self.template().to_string_lossy(),
            Engine::Builtin,
            &self.options(trust),
        )
    }

    pub fn update(&self) -> Outcome {
        let (ctx, _) = self.context();
        coordinator::update(&ctx, &self.options(false))
    }

    pub fn sync(&self) -> Outcome {
        let (ctx, _) = self.context();
        coordinator::sync(&ctx, &self.options(false))
    }

    /// Commit local edits in the tree so `update` sees a clean tree.
    pub fn commit_tree(&self, message: &str) {
        let repo = git2::Repository::open(self.root()).expect("open tree repository");
        vcs::commit_all(&repo, message, &CommitSettings::default()).expect("commit tree");
    }

    /// Number of run folders under `backups/`.
    pub fn backup_runs(&self) -> usize {
        std::fs::read_dir(self.root().join("backups")).map_or(0, Iterator::count)
    }
}

fn write(path: &Path, content: &str) {
    std::fs::create_dir_all(path.parent().expect("parent dir")).expect("create parent dir");
    std::fs::write(path, content).expect("write file");
}

/// Unwrap a completed run.
pub fn completed(outcome: Outcome) -> RunReport {
    match outcome {
        Outcome::Completed(report) => report,
        Outcome::Aborted(abort) => panic!("run aborted: {abort}"),
    }
}

/// Unwrap an aborted run.
pub fn aborted(outcome: Outcome) -> Abort {
    match outcome {
        Outcome::Aborted(abort) => abort,
        Outcome::Completed(_) => panic!("run completed"),
    }
}
