//! # Storage Layer
//!
//! gearkeep writes every snapshot to three independent stores. None of them is
//! trusted alone; together they give redundancy on a device with no server
//! backup.
//!
//! | Store | Type | Role |
//! |-------|------|------|
//! | primary | [`kv::KvBackend`] | single-record key-value database, preferred source |
//! | secondary | [`file_pair::FilePairBackend`] | `latest.json` + `previous.json`, two generations |
//! | legacy | [`legacy::LegacyBackend`] | string-keyed map in one file, last resort |
//!
//! ## Backend Contract
//!
//! A [`Backend`] only knows how to read, write and clear one serialized
//! payload. It knows nothing about schemas, migration or other backends.
//! Payloads cross this boundary as raw [`serde_json::Value`]s because what is
//! on disk may be any historical shape; the migrator canonicalizes after
//! reading.
//!
//! Each backend is fault-isolated: a failure in one is returned as an `Err`
//! and never prevents the orchestrator from trying the others. The legacy
//! store goes further and swallows its own errors.
//!
//! The disk backends do their file and database calls on tokio's blocking
//! pool (see [`blocking`]), never on the async worker threads.
//!
//! ## Recovery Snapshots
//!
//! Backends that keep recoverable copies expose them through
//! [`Backend::snapshots`], tagged with a [`BackupSource`], in the order they
//! should be tried. The primary store keeps no backups and returns nothing.
//!
//! ## Storage Layout
//!
//! ```text
//! <data_dir>/
//! ├── kv/                  # primary (fjall database, keyspace "state")
//! ├── backups/
//! │   ├── latest.json
//! │   └── previous.json
//! └── legacy-store.json
//! ```

use crate::error::{GearError, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

pub mod file_pair;
pub mod kv;
pub mod legacy;
pub mod memory;

pub const KV_DIR: &str = "kv";
pub const BACKUP_DIR: &str = "backups";
pub const LEGACY_FILE: &str = "legacy-store.json";

/// Run synchronous disk work on the blocking pool.
pub(crate) async fn blocking<T, F>(op: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|err| GearError::Unavailable(format!("storage task failed: {err}")))?
}

/// Where a recoverable copy came from, in recovery priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum BackupSource {
    #[serde(rename = "backup-latest")]
    Latest,
    #[serde(rename = "backup-previous")]
    Previous,
    #[serde(rename = "legacy")]
    Legacy,
    #[serde(rename = "legacy-backup")]
    LegacyBackup,
}

impl BackupSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Latest => "backup-latest",
            Self::Previous => "backup-previous",
            Self::Legacy => "legacy",
            Self::LegacyBackup => "legacy-backup",
        }
    }
}

impl fmt::Display for BackupSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One recoverable payload held by a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub source: BackupSource,
    pub payload: Value,
}

/// Raw durable I/O for one serialized payload.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// The current payload, `Ok(None)` when nothing is stored.
    async fn read(&self) -> Result<Option<Value>>;

    async fn write(&self, payload: &Value) -> Result<()>;

    async fn clear(&self) -> Result<()>;

    /// Recoverable copies, best first. Backends without backups return none.
    async fn snapshots(&self) -> Result<Vec<Snapshot>> {
        Ok(Vec::new())
    }
}

/// The three stores the service fans out to, in write priority order.
#[derive(Clone)]
pub struct Backends {
    pub primary: Arc<dyn Backend>,
    pub secondary: Arc<dyn Backend>,
    pub legacy: Arc<dyn Backend>,
}

impl Backends {
    /// The on-disk trio under `data_dir`. Nothing is touched until first use.
    pub fn in_dir(data_dir: &Path) -> Self {
        Self {
            primary: Arc::new(kv::KvBackend::new(data_dir.join(KV_DIR))),
            secondary: Arc::new(file_pair::FilePairBackend::new(data_dir.join(BACKUP_DIR))),
            legacy: Arc::new(legacy::LegacyBackend::new(data_dir.join(LEGACY_FILE))),
        }
    }

    /// Backup sources in recovery order: secondary first, then legacy.
    pub fn recovery_order(&self) -> [&dyn Backend; 2] {
        [self.secondary.as_ref(), self.legacy.as_ref()]
    }
}
