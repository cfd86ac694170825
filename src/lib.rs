//! Dotfiles sync engine.
//!
//! Renders a dotfiles template into a local tree, links the managed files
//! into the home directory after backing up whatever was in the way, and
//! records every run in the tree's git history.
//!
//! The public API is organised into layers:
//!
//! - **[`config`]**: manifest, per-tree settings and recorded state
//! - **[`resources`]**: idempotent `check + apply` primitives (backup, link)
//! - **[`sync`]**: path resolution and the per-file backup/link pipeline
//! - **[`render`]**: template renderers and the three-way merge
//! - **[`coordinator`]**: the `init` / `update` / `sync` state machine
//! - **[`commands`]**: top-level subcommand handlers
#![deny(clippy::or_fun_call)]
#![deny(clippy::bool_to_int_with_if)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod exec;
pub mod logging;
pub mod platform;
pub mod render;
pub mod resources;
pub mod sync;
