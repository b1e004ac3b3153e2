//! Legacy store: a string-keyed map in a single file.
//!
//! This is the last-resort copy, kept in the simplest possible format: one
//! JSON object mapping keys to serialized payload strings. Two keys are used,
//! the current copy and the copy it replaced.
//!
//! Every operation swallows its own failures (missing directory, corrupt
//! file, size quota) and logs them instead. Callers never see an `Err` from
//! this backend.

use super::{blocking, Backend, BackupSource, Snapshot};
use crate::error::{GearError, Result};
use crate::normalize::safe_parse;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const PRIMARY_KEY: &str = "gear-list-state";
pub const BACKUP_KEY: &str = "gear-list-state-backup";

#[derive(Clone)]
pub struct LegacyBackend {
    path: PathBuf,
    quota: Option<usize>,
}

impl LegacyBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            quota: None,
        }
    }

    /// Refuse writes that would grow the file past `bytes`.
    pub fn with_quota(mut self, bytes: usize) -> Self {
        self.quota = Some(bytes);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_map(&self) -> Result<Map<String, Value>> {
        match fs::read_to_string(&self.path) {
            Ok(text) => match safe_parse(&text) {
                Some(Value::Object(map)) => Ok(map),
                _ => Err(GearError::Corrupt("legacy")),
            },
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Map::new()),
            Err(err) => Err(GearError::Io(err)),
        }
    }

    fn store_map(&self, map: &Map<String, Value>) -> Result<()> {
        let text = serde_json::to_string(map)?;
        if let Some(quota) = self.quota {
            if text.len() > quota {
                return Err(GearError::Store(format!(
                    "legacy store quota exceeded ({} > {} bytes)",
                    text.len(),
                    quota
                )));
            }
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, text)?;
        Ok(())
    }

    /// Raw string stored under `key`.
    pub fn get_item(&self, key: &str) -> Option<String> {
        match self.load_map() {
            Ok(map) => map.get(key).and_then(Value::as_str).map(str::to_string),
            Err(err) => {
                tracing::warn!(error = %err, key, "legacy store read failed");
                None
            }
        }
    }

    fn set_payload(&self, payload: &Value) -> Result<()> {
        // A corrupt file is replaced rather than blocking every future write.
        let mut map = self.load_map().unwrap_or_default();
        let previous = map
            .get(PRIMARY_KEY)
            .and_then(Value::as_str)
            .filter(|text| safe_parse(text).is_some())
            .map(str::to_string);
        if let Some(previous) = previous {
            map.insert(BACKUP_KEY.to_string(), Value::String(previous));
        }
        map.insert(
            PRIMARY_KEY.to_string(),
            Value::String(serde_json::to_string(payload)?),
        );
        self.store_map(&map)
    }

    fn remove_all(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(GearError::Io(err)),
        }
    }

    fn parsed(&self, key: &str) -> Option<Value> {
        self.get_item(key).and_then(|text| safe_parse(&text))
    }

    fn stored_snapshots(&self) -> Vec<Snapshot> {
        [
            (BackupSource::Legacy, PRIMARY_KEY),
            (BackupSource::LegacyBackup, BACKUP_KEY),
        ]
        .into_iter()
        .filter_map(|(source, key)| self.parsed(key).map(|payload| Snapshot { source, payload }))
        .collect()
    }

    /// Run `op` on the blocking pool, logging any failure and yielding the
    /// empty value in its place.
    async fn swallowed<T, F>(&self, what: &'static str, op: F) -> T
    where
        T: Default + Send + 'static,
        F: FnOnce(LegacyBackend) -> Result<T> + Send + 'static,
    {
        let this = self.clone();
        match blocking(move || op(this)).await {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(error = %err, what, "legacy store failure swallowed");
                T::default()
            }
        }
    }
}

#[async_trait]
impl Backend for LegacyBackend {
    fn name(&self) -> &'static str {
        "legacy"
    }

    async fn read(&self) -> Result<Option<Value>> {
        Ok(self
            .swallowed("read", |store| {
                Ok(store.parsed(PRIMARY_KEY).or_else(|| store.parsed(BACKUP_KEY)))
            })
            .await)
    }

    async fn write(&self, payload: &Value) -> Result<()> {
        let payload = payload.clone();
        self.swallowed("write", move |store| store.set_payload(&payload))
            .await;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.swallowed("clear", |store| store.remove_all()).await;
        Ok(())
    }

    async fn snapshots(&self) -> Result<Vec<Snapshot>> {
        Ok(self
            .swallowed("snapshots", |store| Ok(store.stored_snapshots()))
            .await)
    }
}
