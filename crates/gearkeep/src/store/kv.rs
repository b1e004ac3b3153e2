//! Primary store: one row in an embedded key-value database.
//!
//! The database is opened lazily on first use and the keyspace is created if
//! missing, so constructing a [`KvBackend`] never touches the disk. An open
//! failure (locked directory, unsupported filesystem) is returned from the
//! operation that triggered it and retried on the next call.

use super::{blocking, Backend};
use crate::error::{GearError, Result};
use async_trait::async_trait;
use fjall::{Database, Keyspace, KeyspaceCreateOptions, PersistMode};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub const KEYSPACE: &str = "state";
pub const STATE_KEY: &str = "app-state";

struct Handle {
    database: Database,
    keyspace: Keyspace,
}

#[derive(Clone)]
pub struct KvBackend {
    path: PathBuf,
    handle: Arc<Mutex<Option<Handle>>>,
}

impl KvBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            handle: Arc::new(Mutex::new(None)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(path: &Path) -> Result<Handle> {
        fs::create_dir_all(path).map_err(GearError::Io)?;
        let database = Database::builder(path).open()?;
        let keyspace = database.keyspace(KEYSPACE, || KeyspaceCreateOptions::default())?;
        tracing::debug!(path = %path.display(), "primary store opened");
        Ok(Handle { database, keyspace })
    }

    fn with_handle<T>(&self, op: impl FnOnce(&Handle) -> Result<T>) -> Result<T> {
        let mut guard = self
            .handle
            .lock()
            .map_err(|_| GearError::Unavailable("primary store lock poisoned".to_string()))?;
        if guard.is_none() {
            *guard = Some(Self::open(&self.path)?);
        }
        match guard.as_ref() {
            Some(handle) => op(handle),
            None => Err(GearError::Unavailable("primary store not open".to_string())),
        }
    }
}

#[async_trait]
impl Backend for KvBackend {
    fn name(&self) -> &'static str {
        "primary"
    }

    async fn read(&self) -> Result<Option<Value>> {
        let this = self.clone();
        let bytes = blocking(move || {
            this.with_handle(|h| Ok(h.keyspace.get(STATE_KEY)?.map(|v| v.to_vec())))
        })
        .await?;
        match bytes {
            None => Ok(None),
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|_| GearError::Corrupt("primary")),
        }
    }

    async fn write(&self, payload: &Value) -> Result<()> {
        let bytes = serde_json::to_vec(payload)?;
        let this = self.clone();
        blocking(move || {
            this.with_handle(|h| {
                h.keyspace.insert(STATE_KEY, bytes)?;
                h.database.persist(PersistMode::SyncAll)?;
                Ok(())
            })
        })
        .await
    }

    async fn clear(&self) -> Result<()> {
        let this = self.clone();
        blocking(move || {
            this.with_handle(|h| {
                h.keyspace.remove(STATE_KEY)?;
                h.database.persist(PersistMode::SyncAll)?;
                Ok(())
            })
        })
        .await
    }
}
