//! CLI argument parsing and command definitions.

use clap::{Parser, Subcommand};
use uuid::Uuid;

// ============================================================================
// CLI argument types
// ============================================================================

/// Top-level arguments for `homeman`.
#[derive(Parser, Debug)]
#[command(name = "homeman", author, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file.
    #[arg(short, long, env = "HOMEMAN_CONFIG")]
    pub config: Option<String>,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress non-essential output.
    #[arg(short, long)]
    pub quiet: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// `homeman` subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Bootstrap dependencies and serve the API.
    Serve {
        /// Use the in-process store and task queue instead of Postgres and
        /// Redis.
        #[arg(long)]
        in_memory: bool,

        /// Override `server.port`.
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print version information.
    Version,

    /// Configuration operations.
    Config(ConfigCommand),

    /// Issue an access token without going through login.
    Token {
        /// User id the token is issued for.
        #[arg(short, long)]
        subject: Uuid,

        /// Mark the token as privileged.
        #[arg(long)]
        privileged: bool,

        /// Lifetime in minutes (defaults to `auth.access_token_ttl_minutes`).
        #[arg(long)]
        ttl_minutes: Option<i64>,
    },
}

/// Config-specific subcommands.
#[derive(Parser, Debug)]
pub struct ConfigCommand {
    /// Config subcommand to execute.
    #[command(subcommand)]
    pub command: ConfigAction,
}

/// Available config subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the resolved config file path.
    Path,

    /// Print the effective configuration as TOML.
    Show,

    /// Create a default configuration file.
    Init {
        /// Output file path (defaults to XDG config path).
        #[arg(short, long)]
        file: Option<String>,

        /// Overwrite existing file.
        #[arg(long)]
        force: bool,
    },
}

// ============================================================================
// Tests
// ============================================================================
