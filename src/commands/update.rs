//! Command: merge template changes into an existing tree and relink.
use anyhow::Result;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use super::{CommandSetup, finish};
use crate::cli::{GlobalOpts, UpdateOpts};
use crate::coordinator;
use crate::logging::{Log as _, Logger};

/// Run the update command.
///
/// # Errors
///
/// Returns an error if the run aborts (dirty tree, conflicts, lock held,
/// pre-flight errors) or any file fails.
pub fn run(
    global: &GlobalOpts,
    opts: &UpdateOpts,
    log: &Arc<Logger>,
    cancelled: Arc<AtomicBool>,
) -> Result<()> {
    log.info(&format!("dotsync {}", super::version::version()));
    let setup = CommandSetup::new(&opts.path, global, opts.trust, log, cancelled)?;
    let outcome = coordinator::update(&setup.ctx, &setup.opts);
    finish(outcome, log)
}
