//! Command-line definitions.
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::render::Engine;

/// Top-level CLI entry point for the dotfiles sync engine.
#[derive(Parser, Debug)]
#[command(
    name = "dotsync",
    about = "Render a dotfiles template, link it into place and keep it updated",
    version
)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Options shared by every subcommand.
    #[command(flatten)]
    pub global: GlobalOpts,
}

/// Options shared across all subcommands.
#[derive(Parser, Debug, Clone)]
pub struct GlobalOpts {
    /// Preview changes without applying
    #[arg(short = 'd', long, global = true)]
    pub dry_run: bool,

    /// Home directory links are installed under (default: $HOME)
    #[arg(long, global = true)]
    pub home: Option<PathBuf>,

    /// Skip the commit phase
    #[arg(long, global = true)]
    pub no_commit: bool,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Render a template into a new tree and link it
    Init(InitOpts),
    /// Merge template changes into the tree and relink
    Update(UpdateOpts),
    /// Back up and link the managed files of a tree
    Sync(SyncOpts),
    /// Generate shell completions
    Completions {
        /// Target shell
        shell: clap_complete::Shell,
    },
    /// Print version information
    Version,
}

impl Command {
    /// Name used for the log file.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Init(_) => "init",
            Self::Update(_) => "update",
            Self::Sync(_) => "sync",
            Self::Completions { .. } => "completions",
            Self::Version => "version",
        }
    }
}

/// Options for the `init` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct InitOpts {
    /// Template directory or git URL
    pub template: String,

    /// Directory to create the tree in
    pub path: PathBuf,

    /// Allow the template to run code (copier tasks, setup actions)
    #[arg(long)]
    pub trust: bool,

    /// Renderer to use
    #[arg(long, value_enum, default_value_t = Engine::Builtin)]
    pub engine: Engine,
}

/// Options for the `update` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct UpdateOpts {
    /// Tree to update
    pub path: PathBuf,

    /// Allow the template to run code (copier tasks)
    #[arg(long)]
    pub trust: bool,
}

/// Options for the `sync` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct SyncOpts {
    /// Tree to sync
    pub path: PathBuf,
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
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_init_defaults() {
        let cli = Cli::parse_from(["dotsync", "init", "gh:me/dotfiles", "/tmp/dots"]);
        let Command::Init(opts) = cli.command else {
            panic!("expected init");
        };
        assert_eq!(opts.template, "gh:me/dotfiles");
        assert_eq!(opts.path, PathBuf::from("/tmp/dots"));
        assert!(!opts.trust);
        assert_eq!(opts.engine, Engine::Builtin);
    }

    #[test]
    fn parse_init_with_copier_and_trust() {
        let cli = Cli::parse_from([
            "dotsync", "init", "--engine", "copier", "--trust", "tpl", "dots",
        ]);
        let Command::Init(opts) = cli.command else {
            panic!("expected init");
        };
        assert_eq!(opts.engine, Engine::Copier);
        assert!(opts.trust);
    }

    #[test]
    fn parse_update_trust() {
        let cli = Cli::parse_from(["dotsync", "update", "--trust", "dots"]);
        assert!(matches!(cli.command, Command::Update(UpdateOpts { trust: true, .. })));
    }

    #[test]
    fn parse_sync_dry_run_short() {
        let cli = Cli::parse_from(["dotsync", "-d", "sync", "dots"]);
        assert!(cli.global.dry_run);
        assert!(matches!(cli.command, Command::Sync(_)));
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "dotsync", "sync", "dots", "--home", "/home/u", "--no-commit", "-v",
        ]);
        assert_eq!(cli.global.home, Some(PathBuf::from("/home/u")));
        assert!(cli.global.no_commit);
        assert!(cli.verbose);
    }

    #[test]
    fn parse_completions() {
        let cli = Cli::parse_from(["dotsync", "completions", "zsh"]);
        assert!(matches!(
            cli.command,
            Command::Completions {
                shell: clap_complete::Shell::Zsh
            }
        ));
    }

    #[test]
    fn parse_version() {
        let cli = Cli::parse_from(["dotsync", "version"]);
        assert!(matches!(cli.command, Command::Version));
        assert_eq!(cli.command.name(), "version");
    }

    #[test]
    fn missing_path_is_rejected() {
        assert!(Cli::try_parse_from(["dotsync", "sync"]).is_err());
    }
}
