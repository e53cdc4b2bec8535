//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// LeadSync - CRM lead to spreadsheet exporter
#[derive(Parser)]
#[command(
    name = "leadsync",
    version,
    about = "Exports CRM leads into monthly spreadsheet sheets"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run one export cycle
    Sync,

    /// Run export cycles forever, one per interval
    Watch {
        /// Seconds between cycle starts (overrides schedule.interval-secs)
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// Print the rows the next cycle would export
    Preview,

    /// Inspect or invalidate the response cache
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
}

/// Cache management subcommands
#[derive(Debug, Subcommand)]
pub enum CacheCommand {
    /// List cached keys and their expiry
    List,

    /// Drop one cached key
    Forget {
        /// Cache key, e.g. `users` or `lead:501`
        key: String,
    },

    /// Drop every expired entry
    Purge,
}
