//! Command line interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::transfer::{Direction, DEFAULT_WORKERS};

/// Back up and restore game saves to S3-compatible storage
#[derive(Parser, Debug)]
#[command(name = "savepoint", version, about)]
pub struct Cli {
    /// Path to config.json (default: <config dir>/savepoint/config.json)
    #[arg(short, long, env = "SAVEPOINT_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Maximum number of concurrent transfers
    #[arg(short = 'j', long, default_value_t = DEFAULT_WORKERS, global = true)]
    pub workers: usize,

    /// Enable debug logging (also enabled by SAVEPOINT_DEBUG)
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Hide the progress display
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List configured games
    List,

    /// Upload a game's saves to the bucket
    Upload {
        /// Game name, slug, or index from `list`
        game: String,
    },

    /// Download a game's saves from the bucket, overwriting local files
    Download {
        /// Game name, slug, or index from `list`
        game: String,
    },
}

impl Cli {
    /// Debug output from the flag or the SAVEPOINT_DEBUG variable.
    pub fn debug_enabled(&self) -> bool {
        self.debug || std::env::var_os("SAVEPOINT_DEBUG").is_some()
    }

    /// The spinner is drawn only for transfers, and per-file debug lines
    /// replace it.
    pub fn shows_progress(&self, debug: bool) -> bool {
        !self.quiet && !debug && self.command.transfer().is_some()
    }
}

/// Default tracing directive when RUST_LOG is unset. While the spinner is on
/// stderr only warnings get through, so log lines do not tear it.
pub fn default_log_directive(debug: bool, progress: bool) -> &'static str {
    if debug {
        "savepoint=debug"
    } else if progress {
        "savepoint=warn"
    } else {
        "savepoint=info"
    }
}

impl Command {
    /// Direction and game selector for transfer commands.
    pub fn transfer(&self) -> Option<(Direction, &str)> {
        match self {
            Command::List => None,
            Command::Upload { game } => Some((Direction::Upload, game)),
            Command::Download { game } => Some((Direction::Download, game)),
        }
    }
}
