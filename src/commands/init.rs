//! Command: render a template into a new tree and link it.
use anyhow::Result;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use super::{CommandSetup, finish};
use crate::cli::{GlobalOpts, InitOpts};
use crate::coordinator;
use crate::logging::{Log as _, Logger};

/// Run the init command.
///
/// # Errors
///
/// Returns an error if the run aborts or any file or setup action fails.
pub fn run(
    global: &GlobalOpts,
    opts: &InitOpts,
    log: &Arc<Logger>,
    cancelled: Arc<AtomicBool>,
) -> Result<()> {
    log.info(&format!("dotsync {}", super::version::version()));
    let setup = CommandSetup::new(&opts.path, global, opts.trust, log, cancelled)?;
    let outcome = coordinator::init(&setup.ctx, &opts.template, opts.engine, &setup.opts);
    finish(outcome, log)
}
