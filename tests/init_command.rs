#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::wildcard_imports,
    clippy::indexing_slicing,
    clippy::panic
)]
//! Integration tests for `init`: render, record, run actions, link, commit.
#![cfg(unix)]

mod common;

use common::*;
use dotsync_cli::config::TreeState;
use dotsync_cli::coordinator::{Phase, vcs};
use dotsync_cli::error::CoordinatorError;
use dotsync_cli::render::Engine;

fn template_with_action(env: &TestEnv) {
    env.write_template("common/.gitconfig", "[user]\n")
        .write_template(
            "dotsync.json",
            r#"{
                "actions": [
                    { "name": "marker", "platform": "unix", "command": ["sh", "-c", "touch \"$DOTSYNC_ROOT/action-ran\""] },
                    { "name": "windows only", "platform": "windows", "command": ["false"] }
                ]
            }"#,
        );
}

#[test]
fn init_records_state_and_commits() {
    let env = TestEnv::new();
    env.write_template("common/.gitconfig", "[user]\n")
        .write_template(".git/config", "not copied\n");

    let report = completed(env.init(false));
    assert!(report.commit.is_some());

    let state = TreeState::load(&env.root().join(".dotsync/state.json"))
        .unwrap()
        .unwrap();
    assert_eq!(state.engine, Engine::Builtin);
    assert_eq!(
        state.template,
        dunce::canonicalize(env.template())
            .unwrap()
            .to_string_lossy()
    );

    let repo = git2::Repository::open(env.root()).unwrap();
    let head = repo.head().unwrap().peel_to_commit().unwrap();
    assert!(head.message().unwrap().starts_with("dotsync init: "));
    assert!(vcs::dirty_paths(&repo).unwrap().is_empty());
    assert_eq!(env.read_tree(".dotsync/baseline/common/.gitconfig"), "[user]\n");
}

#[test]
fn actions_do_not_run_without_trust() {
    let env = TestEnv::new();
    template_with_action(&env);

    let report = completed(env.init(false));
    assert!(report.failed_actions.is_empty());
    assert!(!env.root().join("action-ran").exists());
}

#[test]
fn trusted_init_runs_host_actions() {
    let env = TestEnv::new();
    template_with_action(&env);

    let report = completed(env.init(true));
    assert!(report.failed_actions.is_empty());
    assert!(env.root().join("action-ran").exists());
}

#[test]
fn init_refuses_existing_content() {
    let env = TestEnv::new();
    env.write_template("common/.gitconfig", "[user]\n");
    env.write_tree("README.md", "mine\n");

    let abort = aborted(env.init(false));
    assert_eq!(abort.phase, Phase::Clean);
    assert!(matches!(abort.error, CoordinatorError::NotEmpty(_)));
    assert_eq!(env.read_tree("README.md"), "mine\n");
}

#[test]
fn template_without_common_folder_aborts_sync() {
    let env = TestEnv::new();
    env.write_template("unix/.zshrc", "x\n");

    let abort = aborted(env.init(false));
    assert_eq!(abort.phase, Phase::Syncing);
    assert!(!env.home().join(".zshrc").exists());
}
