//! # Paceline - SLA Deadline Server
//!
//! The main binary for the Paceline deterministic deadline engine.
//!
//! This application provides:
//! - HTTP REST API server (axum-based)
//! - CLI interface for policy and stage-instance operations
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                apps/paceline (THE BINARY)               │
//! │                                                         │
//! │       ┌─────────────┐         ┌─────────────┐          │
//! │       │   CLI       │         │   HTTP API  │          │
//! │       │  (clap)     │         │   (axum)    │          │
//! │       └──────┬──────┘         └──────┬──────┘          │
//! │              │                       │                  │
//! │              └───────────┬───────────┘                  │
//! │                          ▼                              │
//! │                 ┌─────────────────┐                     │
//! │                 │  paceline-core  │                     │
//! │                 │   (THE LOGIC)   │                     │
//! │                 └─────────────────┘                     │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the HTTP server
//! paceline server --host 0.0.0.0 --port 8080
//!
//! # CLI operations
//! paceline init --seed
//! paceline open --stage evaluation --owner applicant
//! paceline inspect --id 1
//! ```

mod api;
mod cli;
mod config;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // Initialize tracing — PACELINE_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("PACELINE_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "paceline=info,tower_http=debug".into());

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

    // Parse CLI arguments
    let cli = cli::Cli::parse();

    // Display startup banner
    if !cli.quiet {
        print_banner();
    }

    // Execute command
    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the Paceline startup banner.
fn print_banner() {
    println!(
        r#"
  ██████╗  █████╗  ██████╗███████╗██╗     ██╗███╗   ██╗███████╗
  ██╔══██╗██╔══██╗██╔════╝██╔════╝██║     ██║████╗  ██║██╔════╝
  ██████╔╝███████║██║     █████╗  ██║     ██║██╔██╗ ██║█████╗
  ██╔═══╝ ██╔══██║██║     ██╔══╝  ██║     ██║██║╚██╗██║██╔══╝
  ██║     ██║  ██║╚██████╗███████╗███████╗██║██║ ╚████║███████╗
  ╚═╝     ╚═╝  ╚═╝ ╚═════╝╚══════╝╚══════╝╚═╝╚═╝  ╚═══╝╚══════╝

  SLA Deadline Server v{}

  Deterministic • Auditable • Policy-Driven
"#,
        env!("CARGO_PKG_VERSION")
    );
}
