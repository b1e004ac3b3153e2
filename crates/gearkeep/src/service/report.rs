use crate::model::{parse_timestamp, AppState};
use crate::store::{BackupSource, Snapshot};
use crate::warning::StorageWarning;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

/// Where a loaded state came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    /// Nothing usable was stored; the state is fresh.
    Empty,
    Primary,
    Backup(BackupSource),
}

impl LoadSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Primary => "primary",
            Self::Backup(source) => source.as_str(),
        }
    }
}

impl fmt::Display for LoadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadResult {
    pub state: AppState,
    pub source: LoadSource,
    pub warnings: Vec<StorageWarning>,
}

/// A state the caller should adopt, plus anything worth telling the user.
#[derive(Debug, Clone, PartialEq)]
pub struct StateResult {
    pub state: AppState,
    pub warnings: Vec<StorageWarning>,
}

/// A serialized backup ready to be written wherever the caller chooses.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedBackup {
    pub json: String,
    pub file_name: String,
    pub payload: AppState,
}

/// One auto-backup the device holds, for a restore picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSummary {
    pub source: BackupSource,
    pub last_saved: Option<String>,
    pub saved_by: Option<String>,
    pub project_count: usize,
    pub template_count: usize,
}

fn text_field(payload: &Value, key: &str) -> Option<String> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn array_len(payload: &Value, key: &str) -> usize {
    payload
        .get(key)
        .and_then(Value::as_array)
        .map_or(0, Vec::len)
}

impl BackupSummary {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let payload = &snapshot.payload;
        Self {
            source: snapshot.source,
            last_saved: text_field(payload, "lastSaved"),
            saved_by: text_field(payload, "savedBy"),
            project_count: array_len(payload, "projects"),
            template_count: array_len(payload, "templates"),
        }
    }

    pub fn last_saved_at(&self) -> Option<DateTime<Utc>> {
        self.last_saved.as_deref().and_then(parse_timestamp)
    }

    /// Newest first; entries without a readable timestamp sort last.
    pub fn newest_first(a: &Self, b: &Self) -> Ordering {
        match (a.last_saved_at(), b.last_saved_at()) {
            (Some(a), Some(b)) => b.cmp(&a),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }
}
