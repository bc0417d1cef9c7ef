//! CLI definitions for warden.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// warden CLI.
#[derive(Parser)]
#[command(name = "warden")]
#[command(about = "Control plane for a fleet of reverse-proxy nodes")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(
        short,
        long,
        env = "WARDEN_CONFIG",
        default_value = "/etc/warden/warden.toml",
        global = true
    )]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run the coordinator in foreground (default)
    Run,

    /// Job registry commands
    Jobs {
        #[command(subcommand)]
        action: JobsAction,
    },

    /// Load and validate the configuration file
    CheckConfig,
}

#[derive(Subcommand)]
pub(crate) enum JobsAction {
    /// List every valid job declared by the plugin roots
    List,

    /// Run one job once with the current settings
    Run {
        /// Job name
        name: String,
    },
}
