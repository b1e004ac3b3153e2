//! # CLI Behavior
//!
//! This is **one possible client** for gearkeep, standing in for the UI. It is
//! the only place that knows about stdout, stderr and exit codes.
//!
//! ## Commands
//!
//! - `gearkeep status`: load and summarize the stored state
//! - `gearkeep export [--project <id>] [--out <dir>]`: write a backup file
//! - `gearkeep import <file>`: merge a backup file in and save
//! - `gearkeep backups`: list device backups, newest first
//! - `gearkeep restore`: restore the best device backup
//! - `gearkeep reset --yes`: wipe everything
//!
//! Warnings from the engine go to stderr, one line each. Only a warning that
//! means the command did nothing (bad import file, no backup to restore) turns
//! into a non-zero exit.
//!
//! ## Module Structure
//!
//! - `setup`: Argument parsing via clap
//! - `commands`: Runtime, logging and per-command handlers
//! - `render`: Output formatting

mod commands;
mod render;
pub mod setup;

pub use commands::run;
