//! mig command-line front end
//!
//! Maps the `new`, `up`, `down`, `log` and `status` subcommands onto the
//! migration engine. The binary (main.rs) only parses arguments, sets up
//! logging and turns the result of [`commands::run`] into an exit status.

use clap::{Parser, Subcommand};

pub mod commands;

pub use commands::{dispatch, execute, run};

/// One-line usage summary.
pub const USAGE: &str = "usage: mig new|up|down|log|status";

/// Usage of `new` when the description is missing.
pub const NEW_USAGE: &str = "usage: mig new <NAME>";

/// `env_logger` filter used when `RUST_LOG` is unset.
pub fn default_log_filter(verbose: bool, quiet: bool) -> &'static str {
    if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "info"
    }
}

#[derive(Debug, Parser)]
#[command(name = "mig")]
#[command(about = "Timestamp-versioned SQL migrations for MySQL")]
#[command(version)]
#[command(disable_help_subcommand = true)]
pub struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet output (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Create an up/down script pair
    New {
        /// Migration name (e.g. "create_users")
        description: Option<String>,
    },

    /// Apply all pending migrations
    #[command(alias = "run")]
    Up {
        /// Show what would run without executing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Revert the most recently applied migration
    Down {
        /// Show what would be reverted without executing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// List applied migrations
    Log,

    /// Show applied and pending migrations
    Status,

    /// Print usage
    Help,

    #[command(external_subcommand)]
    Unknown(Vec<String>),
}

/// Subcommands that need the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseCommand {
    Up { dry_run: bool },
    Down { dry_run: bool },
    Log,
    Status,
}

impl Command {
    pub fn database_command(&self) -> Option<DatabaseCommand> {
        match *self {
            Command::Up { dry_run } => Some(DatabaseCommand::Up { dry_run }),
            Command::Down { dry_run } => Some(DatabaseCommand::Down { dry_run }),
            Command::Log => Some(DatabaseCommand::Log),
            Command::Status => Some(DatabaseCommand::Status),
            Command::New { .. } | Command::Help | Command::Unknown(_) => None,
        }
    }
}
