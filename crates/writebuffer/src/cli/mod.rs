//! Command-line interface for the `wbuf` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{ConfigCommand, PendingCommand, RunCommand, StatusCommand, SubmitCommand};

/// wbuf - Offline write buffer
///
/// Submits records to a remote API, keeps them in a local store while the
/// server is unreachable, and delivers them once the network is back.
#[derive(Debug, Parser)]
#[command(name = "wbuf")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Watch connectivity and flush buffered records when online
    Run(RunCommand),

    /// Create a record, buffering it if the server is unreachable
    Submit(SubmitCommand),

    /// Flush buffered records now
    Flush,

    /// List buffered records
    Pending(PendingCommand),

    /// Show store and remote status
    Status(StatusCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        crate::logging::Verbosity::from_flags(self.verbose, self.quiet)
    }
}
