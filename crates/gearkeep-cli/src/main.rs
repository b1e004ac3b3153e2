//! # Gearkeep CLI
//!
//! A thin terminal client for the gearkeep storage engine. The binary only
//! invokes `cli::run()` and handles process termination; everything else lives
//! in `src/cli/`.
//!
//! ## Workspace Structure
//!
//! - `crates/gearkeep/`: the UI-agnostic storage engine
//! - `crates/gearkeep-cli/`: this binary, depends on the `gearkeep` library
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  CLI Layer (crates/gearkeep-cli/src/cli/)                   │
//! │  - clap argument parsing (setup.rs)                         │
//! │  - service wiring + dispatch (commands.rs)                  │
//! │  - terminal formatting (render.rs)                          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  StorageService (crates/gearkeep/src/service/)              │
//! │  - returns state + warnings, never touches the terminal     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every command opens the service on the configured data directory, runs one
//! operation, waits for queued writes and disposes the service before exit.

mod cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
