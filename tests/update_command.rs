#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::wildcard_imports,
    clippy::indexing_slicing,
    clippy::panic
)]
//! Integration tests for `update`: merge upstream template changes into a
//! customised tree, or stop without touching it.
#![cfg(unix)]

mod common;

use common::*;
use dotsync_cli::coordinator::{Phase, RunLock};
use dotsync_cli::error::CoordinatorError;

const ZSHRC: &str = "export EDITOR=vi\nalias ll='ls -l'\nsetopt autocd\n";

fn initialised() -> TestEnv {
    let env = TestEnv::new();
    env.write_template("common/.gitconfig", "[user]\n\tname = me\n")
        .write_template("unix/.zshrc", ZSHRC);
    completed(env.init(false));
    env
}

#[test]
fn upstream_change_is_merged_into_local_edit() {
    let env = initialised();
    env.write_tree(
        "unix/.zshrc",
        "export EDITOR=nvim\nalias ll='ls -l'\nsetopt autocd\n",
    );
    env.commit_tree("local edit");
    env.write_template(
        "unix/.zshrc",
        "export EDITOR=vi\nalias ll='ls -l'\nsetopt autocd extendedglob\n",
    );

    let report = completed(env.update());
    assert!(report.commit.is_some());
    assert_eq!(
        env.read_tree("unix/.zshrc"),
        "export EDITOR=nvim\nalias ll='ls -l'\nsetopt autocd extendedglob\n"
    );
    assert_eq!(report.sync.skipped(), 2);
}

#[test]
fn new_template_file_is_linked() {
    let env = initialised();
    env.write_template("common/.vimrc", "set nu\n");

    let report = completed(env.update());
    assert_eq!(report.sync.synced(), 1);
    assert_eq!(
        std::fs::read_link(env.home().join(".vimrc")).unwrap(),
        env.root().join("common/.vimrc")
    );
}

#[test]
fn conflicting_edit_aborts_without_touching_tree() {
    let env = initialised();
    env.write_tree(
        "unix/.zshrc",
        "export EDITOR=nvim\nalias ll='ls -l'\nsetopt autocd\n",
    );
    env.commit_tree("local edit");
    env.write_template(
        "unix/.zshrc",
        "export EDITOR=emacs\nalias ll='ls -l'\nsetopt autocd\n",
    );
    env.write_template("common/.gitconfig", "[user]\n\tname = upstream\n");

    let abort = aborted(env.update());
    assert_eq!(abort.phase, Phase::Rendering);
    assert!(matches!(abort.error, CoordinatorError::Conflicted(1)));
    assert_eq!(
        env.read_tree("unix/.zshrc"),
        "export EDITOR=nvim\nalias ll='ls -l'\nsetopt autocd\n"
    );
    assert_eq!(env.read_tree("common/.gitconfig"), "[user]\n\tname = me\n");
}

#[test]
fn dirty_tree_aborts_update() {
    let env = initialised();
    env.write_tree("unix/.zshrc", "uncommitted\n");
    env.write_template("common/.gitconfig", "[user]\n\tname = upstream\n");

    let abort = aborted(env.update());
    assert_eq!(abort.phase, Phase::Clean);
    assert!(matches!(abort.error, CoordinatorError::DirtyTree(_)));
    assert_eq!(env.read_tree("common/.gitconfig"), "[user]\n\tname = me\n");
}

#[test]
fn held_lock_aborts_update() {
    let env = initialised();
    let _held = RunLock::acquire(&env.root().join(".dotsync.lock")).unwrap();

    let abort = aborted(env.update());
    assert!(matches!(abort.error, CoordinatorError::Locked(_)));
}

#[test]
fn update_without_changes_commits_nothing() {
    let env = initialised();
    let report = completed(env.update());
    assert!(report.commit.is_none());
    assert_eq!(report.sync.skipped(), 2);
}
