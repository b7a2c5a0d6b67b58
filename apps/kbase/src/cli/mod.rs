//! # kbase CLI Module
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `config` - Print the effective configuration
//! - `stages` - List the transformation pipeline stages

mod commands;

use clap::{Parser, Subcommand};
use kbase_core::KbError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// kbase - versioned Knowledge Base server
#[derive(Parser, Debug)]
#[command(name = "kbase")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the TOML configuration file
    #[arg(short, long, global = true, default_value = "kbase.toml")]
    pub config: PathBuf,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Server {
        /// Host to bind to (overrides [server] host)
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to (overrides [server] port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Namespace for minted identifiers
        #[arg(short, long)]
        namespace: Option<String>,
    },

    /// Print the effective configuration
    Config,

    /// List the transformation pipeline stages
    Stages,
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), KbError> {
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Server {
            host,
            port,
            namespace,
        }) => cmd_server(&cli.config, host, port, namespace).await,
        Some(Commands::Config) => cmd_config(&cli.config, json_mode),
        Some(Commands::Stages) | None => cmd_stages(json_mode),
    }
}
