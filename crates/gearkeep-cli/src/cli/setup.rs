use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "gearkeep",
    bin_name = "gearkeep",
    version,
    disable_help_subcommand = true
)]
#[command(about = "Offline-first storage for equipment lists", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding the stores (overrides GEARKEEP_DATA_DIR and the config file)
    #[arg(long, global = true, value_name = "PATH", help_heading = "Options")]
    pub data_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true, help_heading = "Options")]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Load the stored state and summarize it
    Status,

    /// Write a backup file
    Export {
        /// Export only this project
        #[arg(long, value_name = "ID")]
        project: Option<String>,

        /// Directory to write into (defaults to the current directory)
        #[arg(long, value_name = "DIR")]
        out: Option<PathBuf>,
    },

    /// Merge a backup file into the stored state
    Import {
        /// Backup file to read
        file: PathBuf,
    },

    /// List backups held on this device, newest first
    Backups {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Replace the stored state with the best device backup
    Restore,

    /// Erase all stored data
    Reset {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },
}
