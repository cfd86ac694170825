//! Command: back up and link the managed files of a tree.
use anyhow::Result;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use super::{CommandSetup, finish};
use crate::cli::{GlobalOpts, SyncOpts};
use crate::coordinator;
use crate::logging::Logger;

/// Run the sync command.
///
/// # Errors
///
/// Returns an error if the run aborts or any file fails.
pub fn run(
    global: &GlobalOpts,
    opts: &SyncOpts,
    log: &Arc<Logger>,
    cancelled: Arc<AtomicBool>,
) -> Result<()> {
    let setup = CommandSetup::new(&opts.path, global, false, log, cancelled)?;
    let outcome = coordinator::sync(&setup.ctx, &setup.opts);
    finish(outcome, log)
}
