use super::{Backend, BackupSource, Snapshot};
use crate::error::{GearError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// In-memory storage backend for testing and embedding.
///
/// Holds a single payload behind a `Mutex` so it can sit in an
/// `Arc<dyn Backend>` like the real stores. Read and write failures and a
/// per-write delay can be switched on to exercise the orchestrator's
/// partial-failure and ordering paths.
pub struct MemBackend {
    name: &'static str,
    payload: Mutex<Option<Value>>,
    snapshot_source: Option<BackupSource>,
    simulate_read_error: AtomicBool,
    simulate_write_error: AtomicBool,
    write_delay: Mutex<Option<Duration>>,
    writes: AtomicUsize,
}

impl Default for MemBackend {
    fn default() -> Self {
        Self {
            name: "memory",
            payload: Mutex::new(None),
            snapshot_source: None,
            simulate_read_error: AtomicBool::new(false),
            simulate_write_error: AtomicBool::new(false),
            write_delay: Mutex::new(None),
            writes: AtomicUsize::new(0),
        }
    }
}

impl MemBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: &'static str) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    /// Report the stored payload as a recoverable snapshot tagged `source`.
    pub fn with_snapshot_source(mut self, source: BackupSource) -> Self {
        self.snapshot_source = Some(source);
        self
    }

    /// Start with `payload` already stored.
    pub fn with_payload(self, payload: Value) -> Self {
        if let Ok(mut slot) = self.payload.lock() {
            *slot = Some(payload);
        }
        self
    }

    /// Enable read error simulation, as from a store that cannot open.
    pub fn set_simulate_read_error(&self, simulate: bool) {
        self.simulate_read_error.store(simulate, Ordering::SeqCst);
    }

    /// Enable write error simulation for testing error handling.
    pub fn set_simulate_write_error(&self, simulate: bool) {
        self.simulate_write_error.store(simulate, Ordering::SeqCst);
    }

    /// Sleep this long inside every write before storing.
    pub fn set_write_delay(&self, delay: Option<Duration>) {
        if let Ok(mut slot) = self.write_delay.lock() {
            *slot = delay;
        }
    }

    /// The stored payload, bypassing failure simulation.
    pub fn stored(&self) -> Option<Value> {
        self.payload.lock().ok().and_then(|slot| slot.clone())
    }

    /// Number of writes that reached the store.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn slot(&self) -> Result<std::sync::MutexGuard<'_, Option<Value>>> {
        self.payload
            .lock()
            .map_err(|_| GearError::Store("memory backend lock poisoned".to_string()))
    }
}

#[async_trait]
impl Backend for MemBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn read(&self) -> Result<Option<Value>> {
        if self.simulate_read_error.load(Ordering::SeqCst) {
            return Err(GearError::Unavailable("Simulated read error".to_string()));
        }
        Ok(self.slot()?.clone())
    }

    async fn write(&self, payload: &Value) -> Result<()> {
        let delay = self.write_delay.lock().ok().and_then(|slot| *slot);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.simulate_write_error.load(Ordering::SeqCst) {
            return Err(GearError::Store("Simulated write error".to_string()));
        }
        *self.slot()? = Some(payload.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        if self.simulate_write_error.load(Ordering::SeqCst) {
            return Err(GearError::Store("Simulated write error".to_string()));
        }
        *self.slot()? = None;
        Ok(())
    }

    async fn snapshots(&self) -> Result<Vec<Snapshot>> {
        let Some(source) = self.snapshot_source else {
            return Ok(Vec::new());
        };
        Ok(self
            .read()
            .await?
            .map(|payload| Snapshot { source, payload })
            .into_iter()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_write_read_clear() {
        let backend = MemBackend::new();
        assert_eq!(backend.read().await.unwrap(), None);

        backend.write(&json!({ "n": 1 })).await.unwrap();
        assert_eq!(backend.read().await.unwrap(), Some(json!({ "n": 1 })));
        assert_eq!(backend.write_count(), 1);

        backend.clear().await.unwrap();
        assert_eq!(backend.stored(), None);
    }

    #[tokio::test]
    async fn test_simulated_errors() {
        let backend = MemBackend::new().with_payload(json!({ "n": 1 }));
        backend.set_simulate_read_error(true);
        assert!(matches!(backend.read().await, Err(GearError::Unavailable(_))));

        backend.set_simulate_write_error(true);
        assert!(backend.write(&json!({ "n": 2 })).await.is_err());
        assert_eq!(backend.stored(), Some(json!({ "n": 1 })));
        assert_eq!(backend.write_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_delay() {
        let backend = MemBackend::new();
        backend.set_write_delay(Some(Duration::from_millis(250)));

        let start = tokio::time::Instant::now();
        backend.write(&json!({})).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_snapshots_only_when_tagged() {
        let plain = MemBackend::new().with_payload(json!({ "n": 1 }));
        assert!(plain.snapshots().await.unwrap().is_empty());

        let tagged = MemBackend::named("secondary")
            .with_snapshot_source(BackupSource::Latest)
            .with_payload(json!({ "n": 1 }));
        let snapshots = tagged.snapshots().await.unwrap();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].source, BackupSource::Latest);
        assert_eq!(tagged.name(), "secondary");
    }
}
