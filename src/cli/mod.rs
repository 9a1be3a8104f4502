pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "timetable-notifier")]
#[command(about = "Watches class timetable pages and sends browser push notifications on change", long_about = None)]
pub struct Cli {
    /// Config file (default: ~/.config/timetable-notifier/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Append logs to this file instead of stdout
    #[arg(short, long, global = true)]
    pub log: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API and the periodic scheduler
    Serve,
    /// Run one change-detection cycle now
    Check {
        /// Push notifications for changed topics
        #[arg(long)]
        notify: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create empty stores, seeding topics from the feed index
    Init,
    /// Generate a VAPID key pair
    Keys,
    /// List subscriber counts per topic
    Subscribers,
}
