//! Secondary store: two generations of plain JSON files.
//!
//! Every write first shifts `latest.json` to `previous.json`, then writes the
//! new `latest.json` through a temp file and rename, so a crash mid-write
//! leaves at least one intact generation on disk.
//!
//! A corrupt `latest.json` is never rotated over a good `previous.json`, and
//! reads fall through to `previous.json` when `latest.json` is missing or
//! unreadable.

use super::{blocking, Backend, BackupSource, Snapshot};
use crate::error::{GearError, Result};
use crate::normalize::safe_parse;
use async_trait::async_trait;
use serde_json::Value;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const LATEST_FILE: &str = "latest.json";
pub const PREVIOUS_FILE: &str = "previous.json";

#[derive(Clone)]
pub struct FilePairBackend {
    dir: PathBuf,
}

/// What a generation file currently holds.
enum Generation {
    Missing,
    Corrupt,
    Valid(Value),
}

impl FilePairBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn latest_path(&self) -> PathBuf {
        self.dir.join(LATEST_FILE)
    }

    pub fn previous_path(&self) -> PathBuf {
        self.dir.join(PREVIOUS_FILE)
    }

    fn load(path: &Path) -> Result<Generation> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(match safe_parse(&text) {
                Some(value) => Generation::Valid(value),
                None => {
                    tracing::warn!(path = %path.display(), "backup generation is corrupt");
                    Generation::Corrupt
                }
            }),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Generation::Missing),
            Err(err) => Err(GearError::Io(err)),
        }
    }

    fn rotate(&self) -> Result<()> {
        let latest = self.latest_path();
        match Self::load(&latest)? {
            Generation::Valid(_) => fs::rename(&latest, self.previous_path()).map_err(GearError::Io),
            Generation::Corrupt | Generation::Missing => Ok(()),
        }
    }

    fn remove(path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(GearError::Io(err)),
        }
    }

    fn read_generations(&self) -> Result<Option<Value>> {
        let latest = match Self::load(&self.latest_path())? {
            Generation::Valid(value) => return Ok(Some(value)),
            other => other,
        };
        match (latest, Self::load(&self.previous_path())?) {
            (_, Generation::Valid(value)) => Ok(Some(value)),
            (Generation::Missing, Generation::Missing) => Ok(None),
            _ => Err(GearError::Corrupt("secondary")),
        }
    }

    fn write_latest(&self, payload: &Value) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(GearError::Io)?;
        self.rotate()?;

        let content = serde_json::to_string_pretty(payload).map_err(GearError::Serialization)?;
        let tmp_path = self.dir.join(format!(".latest-{}.tmp", Uuid::new_v4()));
        fs::write(&tmp_path, content).map_err(GearError::Io)?;
        fs::rename(&tmp_path, self.latest_path()).map_err(GearError::Io)?;
        Ok(())
    }

    fn remove_generations(&self) -> Result<()> {
        Self::remove(&self.latest_path())?;
        Self::remove(&self.previous_path())
    }

    fn valid_generations(&self) -> Result<Vec<Snapshot>> {
        let mut found = Vec::new();
        for (source, path) in [
            (BackupSource::Latest, self.latest_path()),
            (BackupSource::Previous, self.previous_path()),
        ] {
            if let Generation::Valid(payload) = Self::load(&path)? {
                found.push(Snapshot { source, payload });
            }
        }
        Ok(found)
    }
}

#[async_trait]
impl Backend for FilePairBackend {
    fn name(&self) -> &'static str {
        "secondary"
    }

    async fn read(&self) -> Result<Option<Value>> {
        let this = self.clone();
        blocking(move || this.read_generations()).await
    }

    async fn write(&self, payload: &Value) -> Result<()> {
        let this = self.clone();
        let payload = payload.clone();
        blocking(move || this.write_latest(&payload)).await
    }

    async fn clear(&self) -> Result<()> {
        let this = self.clone();
        blocking(move || this.remove_generations()).await
    }

    async fn snapshots(&self) -> Result<Vec<Snapshot>> {
        let this = self.clone();
        blocking(move || this.valid_generations()).await
    }
}
