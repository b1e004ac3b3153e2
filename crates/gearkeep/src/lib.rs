//! # Gearkeep Architecture
//!
//! Gearkeep is the **offline-first storage engine** behind an equipment-list
//! app. The user has no server and no network; this crate is the only thing
//! standing between an edit and its loss. It is UI-agnostic: the same engine
//! backs a desktop shell, a browser port or the bundled `gearkeep` CLI.
//!
//! ## Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Storage Service (service/)                                 │
//! │  - load / autosave / save / import / restore / reset        │
//! │  - never fails: returns state + warnings                    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!          ┌───────────────────┼───────────────────┐
//!          ▼                   ▼                   ▼
//! ┌─────────────────┐ ┌─────────────────┐ ┌─────────────────┐
//! │ autosave.rs     │ │ queue.rs        │ │ migrate.rs      │
//! │ debounce with   │ │ FIFO save queue │ │ versioned       │
//! │ hard ceiling    │ │ one writer      │ │ upgrade + merge │
//! └─────────────────┘ └─────────────────┘ └─────────────────┘
//!                              │                   │
//!                              ▼                   ▼
//! ┌─────────────────────────────────┐ ┌─────────────────────┐
//! │ store/ (Backend trait)          │ │ normalize.rs        │
//! │ kv · file_pair · legacy · mem   │ │ total coercion of   │
//! └─────────────────────────────────┘ │ untrusted JSON      │
//!                                     └─────────────────────┘
//! ```
//!
//! ## Key Principle: Nothing Trusted, Nothing Lost
//!
//! - Anything read from disk or an import file is untrusted JSON. The
//!   [`normalize`] functions accept any shape and never fail.
//! - Every write goes to three independent stores. A failure in one never
//!   prevents the others.
//! - Writes are strictly serialized, so a slow write can never land after a
//!   newer one.
//! - Merges are additive: importing never drops or overwrites existing data.
//!
//! ## Module Overview
//!
//! - [`service`]: The orchestrator and its result types
//! - [`store`]: Backend trait, on-disk adapters and the in-memory test double
//! - [`migrate`]: Payload upgrade and additive merge
//! - [`normalize`]: Coercion of untrusted JSON into model types
//! - [`model`]: Projects, categories, items, templates, history
//! - [`autosave`]: Debounce state machine
//! - [`queue`]: Serialized save queue
//! - [`config`]: Layered configuration
//! - [`clock`]: Timestamp source
//! - [`warning`]: User-facing warning tokens
//! - [`error`]: Internal error type

pub mod autosave;
pub mod clock;
pub mod config;
pub mod error;
pub mod migrate;
pub mod model;
pub mod normalize;
pub mod queue;
pub mod service;
pub mod store;
pub mod warning;

pub use config::StorageConfig;
pub use error::{GearError, Result};
pub use model::AppState;
pub use queue::{SaveOutcome, SaveReason};
pub use service::{
    BackupSummary, ExportedBackup, LoadResult, LoadSource, SaveHooks, SaveInfo, ServiceOptions,
    StateResult, StorageService,
};
pub use warning::StorageWarning;
