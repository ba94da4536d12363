//! # Paceline CLI Module
//!
//! This module implements the CLI interface for Paceline.
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `init` - Initialize a new database, optionally seeded with default policies
//! - `policy set|show|list` - Manage SLA policies
//! - `open` - Open a stage instance
//! - `inspect` - Fully evaluate a stage instance at an instant
//! - `extend` - Grant one extension to a stage instance
//! - `close` - Close a stage instance
//! - `status` - Show engine metrics

mod commands;

use crate::config::AppConfig;
use clap::{Parser, Subcommand};
use paceline_core::PacelineError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Paceline - SLA Deadline Server
///
/// A minimal, deterministic deadline engine for workflow stages.
/// Every instance carries the policy snapshot captured when it was opened.
#[derive(Parser, Debug)]
#[command(name = "paceline")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the instance database
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Storage backend: "redb" (ACID database) or "memory" (volatile)
    #[arg(short = 'B', long, global = true)]
    pub backend: Option<String>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Server {
        /// Host to bind to
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Initialize a new empty database
    Init {
        /// Seed the built-in default policies after creation
        #[arg(short, long)]
        seed: bool,

        /// Force initialization even if database exists
        #[arg(short, long)]
        force: bool,
    },

    /// Manage SLA policies
    Policy {
        #[command(subcommand)]
        action: PolicyCommands,
    },

    /// Open a stage instance
    Open {
        /// Stage name (must have an active policy)
        #[arg(short, long)]
        stage: String,

        /// Owner role: "staff" or "applicant"
        #[arg(short, long)]
        owner: String,

        /// Start instant (RFC3339); defaults to now
        #[arg(long)]
        at: Option<String>,
    },

    /// Fully evaluate a stage instance at an instant
    Inspect {
        /// Instance identifier
        #[arg(short, long)]
        id: u64,

        /// Evaluation instant (RFC3339); defaults to now
        #[arg(long)]
        at: Option<String>,
    },

    /// Grant one extension to a stage instance
    Extend {
        /// Instance identifier
        #[arg(short, long)]
        id: u64,
    },

    /// Close a stage instance
    Close {
        /// Instance identifier
        #[arg(short, long)]
        id: u64,

        /// Terminal status: "completed" or "cancelled"
        #[arg(short, long)]
        status: String,

        /// Close instant (RFC3339); defaults to now
        #[arg(long)]
        at: Option<String>,
    },

    /// Show engine metrics
    Status,
}

/// Policy management subcommands.
#[derive(Subcommand, Debug)]
pub enum PolicyCommands {
    /// Create or replace the policy for a stage
    Set {
        /// Stage name
        #[arg(short, long)]
        stage: String,

        /// Allotted working window in days (must be >= 1)
        #[arg(long)]
        duration_days: u32,

        /// Grace period in days after the due instant
        #[arg(long, default_value = "0")]
        grace_days: u32,

        /// Allow deadline extensions for this stage
        #[arg(long)]
        allow_extensions: bool,

        /// Maximum number of extensions (required when extensions are allowed)
        #[arg(long, default_value = "0")]
        max_extensions: u32,

        /// Days added per extension (required when extensions are allowed)
        #[arg(long, default_value = "0")]
        extension_days: u32,

        /// Store the policy as inactive (blocks new opens)
        #[arg(long)]
        inactive: bool,
    },

    /// Show the policy for a stage
    Show {
        /// Stage name
        #[arg(short, long)]
        stage: String,
    },

    /// List all policies
    List,
}

// =============================================================================
// RESOLVED SETTINGS
// =============================================================================

/// Effective settings after merging CLI flags over the config file.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Path to the instance database.
    pub database: PathBuf,
    /// Storage backend name.
    pub backend: String,
    /// JSON output mode.
    pub json_mode: bool,
    /// Rate limit from the config file (env still overrides).
    pub rate_limit: Option<u32>,
}

impl Settings {
    /// Merge CLI flags over config file values over defaults.
    #[must_use]
    pub fn resolve(cli: &Cli, config: &AppConfig) -> Self {
        Self {
            database: cli
                .database
                .clone()
                .or_else(|| config.database.clone())
                .unwrap_or_else(|| PathBuf::from("paceline.db")),
            backend: cli
                .backend
                .clone()
                .or_else(|| config.backend.clone())
                .unwrap_or_else(|| "redb".to_string()),
            json_mode: cli.json_mode,
            rate_limit: config.rate_limit,
        }
    }
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), PacelineError> {
    let config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    let settings = Settings::resolve(&cli, &config);

    match cli.command {
        Some(Commands::Server { host, port }) => {
            let host = host
                .or(config.host)
                .unwrap_or_else(|| "127.0.0.1".to_string());
            let port = port.or(config.port).unwrap_or(8080);
            cmd_server(&settings, &host, port).await
        }
        Some(Commands::Init { seed, force }) => cmd_init(&settings, seed, force),
        Some(Commands::Policy { action }) => match action {
            PolicyCommands::Set {
                stage,
                duration_days,
                grace_days,
                allow_extensions,
                max_extensions,
                extension_days,
                inactive,
            } => cmd_policy_set(
                &settings,
                &stage,
                duration_days,
                grace_days,
                allow_extensions,
                max_extensions,
                extension_days,
                inactive,
            ),
            PolicyCommands::Show { stage } => cmd_policy_show(&settings, &stage),
            PolicyCommands::List => cmd_policy_list(&settings),
        },
        Some(Commands::Open { stage, owner, at }) => {
            cmd_open(&settings, &stage, &owner, at.as_deref())
        }
        Some(Commands::Inspect { id, at }) => cmd_inspect(&settings, id, at.as_deref()),
        Some(Commands::Extend { id }) => cmd_extend(&settings, id),
        Some(Commands::Close { id, status, at }) => {
            cmd_close(&settings, id, &status, at.as_deref())
        }
        Some(Commands::Status) | None => cmd_status(&settings),
    }
}
