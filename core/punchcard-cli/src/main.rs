//! punchcard: command-line time tracker.
//!
//! Each invocation restores the session from the shared store, performs one
//! action and exits. `watch` keeps a live display open instead.
//!
//! ## Subcommands
//!
//! - `submit`: Fill in the intake form and begin a session
//! - `start` / `stop`: Record login / logout time
//! - `activity`: Add active milliseconds reported by an activity sampler
//! - `export`: Write `activity.xlsx` and clear the session
//! - `status`: Show the current session
//! - `watch`: Live display, refreshed every second
//! - `config`: Show effective configuration and paths

mod commands;
mod logging;

use clap::{Parser, Subcommand};
use punchcard_core::StorageConfig;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "punchcard")]
#[command(about = "Track a work session and export it as a spreadsheet")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Submit identity details and open the tracking view
    Submit {
        #[arg(long)]
        first_name: Option<String>,

        #[arg(long)]
        last_name: Option<String>,

        #[arg(long)]
        project_name: Option<String>,

        #[arg(long)]
        employee_id: Option<String>,
    },

    /// Start tracking (overwrites any previous start time)
    Start,

    /// Stop tracking
    Stop,

    /// Add active time reported by an activity sampler
    Activity {
        /// Active milliseconds to add
        #[arg(value_name = "MS")]
        elapsed_ms: u64,
    },

    /// Export the session to a spreadsheet and clear it
    Export {
        /// Directory to write the spreadsheet into
        #[arg(long, value_name = "DIR")]
        out_dir: Option<PathBuf>,
    },

    /// Show the current session
    Status,

    /// Keep a live display of the session, refreshed every second
    Watch {
        /// Stop after this many refreshes
        #[arg(long)]
        ticks: Option<u64>,
    },

    /// Print effective configuration and storage paths
    Config,
}

fn main() {
    let cli = Cli::parse();

    let storage = match StorageConfig::from_env() {
        Ok(storage) => storage,
        Err(e) => {
            eprintln!("punchcard: {}", e);
            std::process::exit(1);
        }
    };
    let _logging_guard = logging::init(&storage.logs_dir());

    if let Err(e) = commands::run(cli.command, &storage) {
        tracing::error!(error = %e, "punchcard command failed");
        eprintln!("punchcard: {}", e);
        std::process::exit(1);
    }
}
