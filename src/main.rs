//! `dotsync` command-line entry point.

use anyhow::Result;
use clap::{CommandFactory as _, Parser as _};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dotsync_cli::cli::{Cli, Command};
use dotsync_cli::commands;
use dotsync_cli::logging::{Log as _, Logger, init_subscriber};

fn main() -> Result<()> {
    let _ = enable_ansi_support::enable_ansi_support();
    let args = Cli::parse();
    let command = args.command.name();
    init_subscriber(args.verbose, command);
    let log = Arc::new(Logger::new(command));

    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancelled);
    let handler_log = Arc::clone(&log);
    if let Err(e) = ctrlc::set_handler(move || {
        if flag.swap(true, Ordering::SeqCst) {
            std::process::exit(130);
        }
        handler_log.warn("stopping after the current step; press Ctrl-C again to quit now");
    }) {
        log.debug(&format!("interrupt handler not installed: {e}"));
    }

    match args.command {
        Command::Init(opts) => commands::init::run(&args.global, &opts, &log, cancelled),
        Command::Update(opts) => commands::update::run(&args.global, &opts, &log, cancelled),
        Command::Sync(opts) => commands::sync::run(&args.global, &opts, &log, cancelled),
        Command::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "dotsync", &mut std::io::stdout());
            Ok(())
        }
        Command::Version => {
            commands::version::run();
            Ok(())
        }
    }
}
