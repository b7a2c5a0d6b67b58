//! # kbase - Knowledge Base Server
//!
//! The main binary for the versioned Knowledge Base store.
//!
//! This application provides:
//! - HTTP REST API server (axum-based)
//! - CLI for configuration inspection
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 apps/kbase (THE BINARY)             │
//! │                                                     │
//! │   ┌─────────────┐          ┌─────────────┐          │
//! │   │    CLI      │          │  HTTP API   │          │
//! │   │   (clap)    │          │   (axum)    │          │
//! │   └──────┬──────┘          └──────┬──────┘          │
//! │          └──────────────┬─────────┘                 │
//! │                         ▼                           │
//! │                 ┌───────────────┐                   │
//! │                 │  kbase-core   │                   │
//! │                 │ (store, ops,  │                   │
//! │                 │  pipeline)    │                   │
//! │                 └───────────────┘                   │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the HTTP server
//! kbase server --host 0.0.0.0 --port 8080
//!
//! # Print the effective configuration
//! kbase --config kbase.toml config
//!
//! # List the transformation pipeline stages
//! kbase stages
//! ```

mod cli;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // KBASE_LOG_FORMAT=json switches to machine-parseable output.
    let log_format = std::env::var("KBASE_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let cli = cli::Cli::parse();

    let default_filter = if cli.verbose {
        "kbase=debug,kbase_core=debug,tower_http=debug"
    } else {
        "kbase=info,kbase_core=info,tower_http=debug"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

fn print_banner() {
    println!(
        r#"
  ██╗  ██╗██████╗  █████╗ ███████╗███████╗
  ██║ ██╔╝██╔══██╗██╔══██╗██╔════╝██╔════╝
  █████╔╝ ██████╔╝███████║███████╗█████╗
  ██╔═██╗ ██╔══██╗██╔══██║╚════██║██╔══╝
  ██║  ██╗██████╔╝██║  ██║███████║███████╗
  ╚═╝  ╚═╝╚═════╝ ╚═╝  ╚═╝╚══════╝╚══════╝

  Knowledge Base Server v{}

  Versioned • Copy-on-write • Pipelined
"#,
        env!("CARGO_PKG_VERSION")
    );
}
