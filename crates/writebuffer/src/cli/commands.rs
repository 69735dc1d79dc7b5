//! CLI command definitions.

use std::path::PathBuf;

use clap::{Args, Subcommand};

/// Run command arguments.
#[derive(Debug, Args)]
pub struct RunCommand {
    /// Report the network as offline until the first probe says otherwise
    #[arg(long)]
    pub start_offline: bool,
}

/// Submit command arguments.
#[derive(Debug, Args)]
pub struct SubmitCommand {
    /// Record as a JSON document (read from stdin when omitted)
    #[arg(conflicts_with = "file")]
    pub record: Option<String>,

    /// Read the record from a JSON file
    #[arg(short, long, value_name = "FILE")]
    pub file: Option<PathBuf>,
}

/// Pending command arguments.
#[derive(Debug, Args)]
pub struct PendingCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_command_debug() {
        let cmd = StatusCommand { json: true };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("json"));
    }

    #[test]
    fn test_submit_command_debug() {
        let cmd = SubmitCommand {
            record: Some(r#"{"pizzaName":"A"}"#.to_string()),
            file: None,
        };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("pizzaName"));
    }

    #[test]
    fn test_config_command_debug() {
        let cmd = ConfigCommand::Show { json: false };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("Show"));
    }
}
