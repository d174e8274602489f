//! msgsync CLI
//!
//! Command-line tools for inspecting and exercising msgsync sync state.
//!
//! # Commands
//!
//! - `inspect` - Display persisted sync metadata
//! - `reconcile` - Run pending metadata migrations against an event dump
//! - `replay` - Route an event dump through an in-memory account

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// msgsync command-line sync tools.
#[derive(Parser)]
#[command(name = "msgsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the metadata file
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display persisted sync metadata
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Run pending metadata migrations
    Reconcile {
        /// JSON array of stored events, processed flags included
        #[arg(short, long)]
        events: Option<PathBuf>,

        /// Show what would run without writing
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Route an event dump through an in-memory account
    Replay {
        /// JSON array of event envelopes
        events: PathBuf,

        /// Self user as value@domain
        #[arg(short, long, default_value = "self@wire.com")]
        self_user: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Metadata path required for inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::Reconcile { events, dry_run } => {
            let path = cli.path.ok_or("Metadata path required for reconcile")?;
            commands::reconcile::run(&path, events.as_deref(), dry_run)?;
        }
        Commands::Replay {
            events,
            self_user,
            format,
        } => {
            commands::replay::run(&events, &self_user, &format)?;
        }
        Commands::Version => {
            println!("msgsync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
