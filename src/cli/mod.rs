pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "livehub")]
#[command(about = "YouTube live stream tracker fed by PubSubHubbub", long_about = None)]
pub struct Cli {
    /// Config file (default: ~/.config/livehub/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// SQLite database path, overrides [database] path
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the webhook server and the renewal/cleanup sweeps
    Serve,
    /// Track channels and subscribe them on the hub
    Add {
        /// YouTube channel ids (UC...)
        #[arg(required = true)]
        channel_ids: Vec<String>,
    },
    /// Renew expiring hub subscriptions once
    Renew,
    /// Remove stale feeds once
    Clean,
    /// Reconcile channels against the YouTube API and print live streams
    Sync {
        #[arg(required = true)]
        channel_ids: Vec<String>,
    },
    /// Ask the hub to stop pushing a channel
    Unsubscribe { channel_id: String },
    /// Parse a saved hub delivery and print the entry
    Parse {
        /// Path to the Atom payload
        path: PathBuf,
    },
}
