//! SnapSync CLI
//!
//! Command-line tools for working with SnapSync store files offline.
//!
//! # Commands
//!
//! - `keygen` - Print a fresh writer key and group key
//! - `inspect` - Display entries, tombstones and the sync cursor
//! - `get` / `set` / `del` - Read or edit a single key
//! - `compact` - Rewrite the store file to reclaim space

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// SnapSync command-line store tools.
#[derive(Parser)]
#[command(name = "snapsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store file
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
    /// Print a fresh writer key and group key
    Keygen {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Display entries, tombstones and the sync cursor
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print the value stored under a key
    Get {
        /// Key to read
        key: String,
    },

    /// Store a JSON value under a key
    Set {
        /// Key to write
        key: String,

        /// Value as JSON text
        value: String,
    },

    /// Delete a key by writing a tombstone
    Del {
        /// Key to delete
        key: String,
    },

    /// Rewrite the store file to reclaim space
    Compact,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Keygen { format } => {
            commands::keygen::run(&format)?;
        }
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Store path required for inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::Get { key } => {
            let path = cli.path.ok_or("Store path required for get")?;
            commands::edit::get(&path, &key)?;
        }
        Commands::Set { key, value } => {
            let path = cli.path.ok_or("Store path required for set")?;
            commands::edit::set(&path, &key, &value)?;
        }
        Commands::Del { key } => {
            let path = cli.path.ok_or("Store path required for del")?;
            commands::edit::del(&path, &key)?;
        }
        Commands::Compact => {
            let path = cli.path.ok_or("Store path required for compact")?;
            commands::compact::run(&path)?;
        }
    }

    Ok(())
}
