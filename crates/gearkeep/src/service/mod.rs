//! # Storage Service
//!
//! [`StorageService`] is the orchestrator the UI talks to. It owns the save
//! queue, the autosave debouncer, the periodic snapshot task and the three
//! backends, and it never returns an error: every degraded path resolves to a
//! usable [`AppState`] plus [`StorageWarning`]s.
//!
//! ## Load
//!
//! The primary store is read first, then the best recoverable snapshot from
//! the secondary and legacy stores (latest, previous, legacy, legacy-backup).
//! The backup wins when the primary is empty, or when the backup carries a
//! newer `lastSaved` than the primary. The chosen payload is migrated, then
//! validated; if it fails, the remaining copies are tried in the same order. A
//! state loaded from anywhere but the primary is immediately re-persisted with
//! reason `rehydrate`.
//!
//! ## Writes
//!
//! Every write (autosave, explicit save, rehydrate, restore, periodic snapshot,
//! factory reset) goes through the one [`SaveQueue`], so writes never overlap
//! and always land in submission order.
//!
//! ## Tasks
//!
//! Construction spawns the queue worker and, when configured, the periodic
//! snapshot task on the current tokio runtime. Background tasks hold only a
//! weak reference to the service; dropping the last handle or calling
//! [`StorageService::dispose`] stops them.

mod hooks;
mod persist;
mod report;

pub use hooks::{SaveHooks, SaveInfo, SavedHook, WarningHook};
pub use report::{BackupSummary, ExportedBackup, LoadResult, LoadSource, StateResult};

use crate::autosave::Debouncer;
use crate::clock::{Clock, SystemClock};
use crate::config::StorageConfig;
use crate::error::Result;
use crate::migrate::{canonicalize, merge_states, migrate_payload};
use crate::model::{parse_timestamp, AppState};
use crate::normalize::{safe_parse, validate_payload};
use crate::queue::{SaveOutcome, SaveQueue, SaveReason};
use crate::store::{Backends, Snapshot};
use crate::warning::StorageWarning;
use chrono::SecondsFormat;
use persist::Persister;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Timing knobs for the service. See [`StorageConfig`] for defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceOptions {
    pub debounce: Duration,
    pub ceiling: Duration,
    /// `None` disables the periodic secondary snapshot.
    pub snapshot_interval: Option<Duration>,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        StorageConfig::default().options()
    }
}

#[derive(Clone)]
pub struct StorageService {
    shared: Arc<Shared>,
}

struct Shared {
    backends: Backends,
    clock: Arc<dyn Clock>,
    queue: SaveQueue,
    state: Mutex<ServiceState>,
}

struct ServiceState {
    debouncer: Debouncer,
    pending: Option<AppState>,
    last_known: Option<AppState>,
    timer: Option<JoinHandle<()>>,
    interval: Option<JoinHandle<()>>,
    disposed: bool,
}

impl ServiceState {
    fn cancel_autosave(&mut self) -> Option<AppState> {
        self.debouncer.clear();
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.pending.take()
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ServiceState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn remember(&self, state: &AppState) {
        let mut st = self.lock();
        if !st.disposed {
            st.last_known = Some(state.clone());
        }
    }
}

impl StorageService {
    /// Open the on-disk stores under the configured data directory.
    pub fn open(config: &StorageConfig, hooks: SaveHooks) -> Result<Self> {
        let data_dir = config.resolve_data_dir()?;
        tracing::debug!(data_dir = %data_dir.display(), "opening storage");
        Ok(Self::with_backends(
            Backends::in_dir(&data_dir),
            config.options(),
            hooks,
        ))
    }

    pub fn with_backends(backends: Backends, options: ServiceOptions, hooks: SaveHooks) -> Self {
        Self::with_clock(backends, options, hooks, Arc::new(SystemClock))
    }

    /// Like [`with_backends`](Self::with_backends) with an explicit timestamp
    /// source for `lastSaved` stamps and export file names.
    pub fn with_clock(
        backends: Backends,
        options: ServiceOptions,
        hooks: SaveHooks,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let persister = Arc::new(Persister::new(backends.clone(), clock.clone(), hooks));
        let shared = Arc::new(Shared {
            backends,
            clock,
            queue: SaveQueue::start(persister),
            state: Mutex::new(ServiceState {
                debouncer: Debouncer::new(options.debounce, options.ceiling),
                pending: None,
                last_known: None,
                timer: None,
                interval: None,
                disposed: false,
            }),
        });

        if let Some(period) = options.snapshot_interval {
            let task = tokio::spawn(run_snapshots(Arc::downgrade(&shared), period));
            shared.lock().interval = Some(task);
        }

        Self { shared }
    }

    /// Read all stores, reconcile, migrate and validate.
    ///
    /// Candidates are tried in preference order. Each is migrated first and the
    /// migrated form validated; one that still fails is skipped for the next.
    pub async fn load_state(&self) -> LoadResult {
        let backends = &self.shared.backends;
        let mut warnings = Vec::new();

        let primary = match backends.primary.read().await {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(backend = backends.primary.name(), error = %err, "primary read failed");
                warnings.push(StorageWarning::PrimaryUnavailable);
                None
            }
        };
        let mut backups = self.snapshots().await;
        backups.sort_by_key(|s| s.source);

        let backup_first = match (&primary, backups.first()) {
            (Some(primary), Some(best)) => backup_is_newer(primary, &best.payload),
            _ => false,
        };
        let mut backups = backups
            .into_iter()
            .map(|snapshot| (snapshot.payload, LoadSource::Backup(snapshot.source)));
        let primary = primary.map(|payload| (payload, LoadSource::Primary));
        let mut candidates = Vec::new();
        if backup_first {
            tracing::info!("backup is newer than primary");
            candidates.extend(backups.next());
        }
        candidates.extend(primary);
        candidates.extend(backups);

        let mut loaded = None;
        for (raw, source) in candidates {
            let state = migrate_payload(&raw);
            let report = match serde_json::to_value(&state) {
                Ok(value) => validate_payload(&value),
                Err(err) => {
                    tracing::warn!(%source, error = %err, "migrated state did not serialize");
                    continue;
                }
            };
            if report.valid {
                loaded = Some((state, source));
                break;
            }
            tracing::warn!(%source, errors = report.errors.len(), "stored payload failed validation");
            for error in report.errors {
                push_unique(&mut warnings, StorageWarning::LoadValidationFailed(error));
            }
        }
        let (state, source) = loaded.unwrap_or_else(|| (AppState::empty(), LoadSource::Empty));

        if let LoadSource::Backup(_) = source {
            let outcome = self
                .shared
                .queue
                .persist(state.clone(), SaveReason::Rehydrate)
                .await;
            warnings.extend(outcome.warnings);
        }

        tracing::info!(%source, projects = state.projects.len(), "state loaded");
        self.shared.remember(&state);
        LoadResult {
            state,
            source,
            warnings,
        }
    }

    /// Queue `state` for a debounced write.
    ///
    /// Rapid calls coalesce into one write after the debounce window, but a
    /// continuous stream still flushes once the ceiling elapses since the first
    /// unsaved edit.
    pub fn schedule_autosave(&self, state: &AppState) {
        let mut st = self.shared.lock();
        if st.disposed {
            return;
        }
        st.pending = Some(state.clone());
        st.last_known = Some(state.clone());
        st.debouncer.record(Instant::now());
        if st.timer.is_none() {
            st.timer = Some(tokio::spawn(run_autosave(Arc::downgrade(&self.shared))));
        }
    }

    /// Write any pending autosave now and wait for all queued writes.
    pub async fn flush(&self) -> Option<SaveOutcome> {
        let pending = self.shared.lock().cancel_autosave();
        let outcome = match pending {
            Some(state) => Some(self.shared.queue.persist(state, SaveReason::Autosave).await),
            None => None,
        };
        self.shared.queue.drain().await;
        outcome
    }

    /// Persist immediately, bypassing and clearing any pending autosave.
    pub async fn save_now(&self, state: &AppState) -> SaveOutcome {
        {
            let mut st = self.shared.lock();
            st.cancel_autosave();
            if !st.disposed {
                st.last_known = Some(state.clone());
            }
        }
        self.shared
            .queue
            .persist(state.clone(), SaveReason::Explicit)
            .await
    }

    /// Additively merge an exported file into `current`. Never persists.
    pub fn import_backup(&self, raw: &str, current: &AppState) -> StateResult {
        let unchanged = |warning| StateResult {
            state: current.clone(),
            warnings: vec![warning],
        };
        let Some(parsed) = safe_parse(raw) else {
            return unchanged(StorageWarning::ImportInvalid);
        };
        let report = validate_payload(&parsed);
        if !report.valid {
            tracing::info!(errors = ?report.errors, "import rejected");
            return unchanged(StorageWarning::ImportValidationFailed);
        }

        let merged = merge_states(&canonicalize(current), &migrate_payload(&parsed));
        tracing::info!(
            projects = merged.projects.len(),
            templates = merged.templates.len(),
            "import merged"
        );
        StateResult {
            state: merged,
            warnings: Vec::new(),
        }
    }

    /// Replace the current state with the best device backup and persist it.
    pub async fn restore_from_backup(&self) -> LoadResult {
        let Some(backup) = self.best_backup().await else {
            return LoadResult {
                state: AppState::empty(),
                source: LoadSource::Empty,
                warnings: vec![StorageWarning::NoDeviceBackup],
            };
        };

        self.shared.lock().cancel_autosave();
        let outcome = self
            .shared
            .queue
            .persist(migrate_payload(&backup.payload), SaveReason::Restore)
            .await;
        let state = unstamped(outcome.payload);
        tracing::info!(source = %backup.source, "restored from backup");
        self.shared.remember(&state);
        LoadResult {
            state,
            source: LoadSource::Backup(backup.source),
            warnings: outcome.warnings,
        }
    }

    /// Wipe every store and persist a fresh empty state. Irreversible.
    pub async fn factory_reset(&self) -> StateResult {
        {
            // Nothing left for the snapshot task to write back.
            let mut st = self.shared.lock();
            st.cancel_autosave();
            st.last_known = None;
        }

        // Both jobs run on the queue, after any write already submitted.
        let mut warnings = self.shared.queue.wipe().await;
        let outcome = self
            .shared
            .queue
            .persist(AppState::empty(), SaveReason::FactoryReset)
            .await;
        for warning in outcome.warnings {
            push_unique(&mut warnings, warning);
        }
        let state = unstamped(outcome.payload);
        tracing::info!("factory reset complete");
        self.shared.remember(&state);
        StateResult { state, warnings }
    }

    /// Every recoverable snapshot on the device, newest first.
    pub async fn list_auto_backups(&self) -> Vec<BackupSummary> {
        let mut summaries: Vec<BackupSummary> = self
            .snapshots()
            .await
            .iter()
            .map(BackupSummary::from_snapshot)
            .collect();
        summaries.sort_by(BackupSummary::newest_first);
        summaries
    }

    /// Canonical, pretty-printed copy of the whole state.
    pub fn export_backup(&self, state: &AppState) -> ExportedBackup {
        self.export(canonicalize(state))
    }

    /// Export only one project. Templates and history are left out; an
    /// unknown id exports an empty project list.
    pub fn export_project_backup(&self, state: &AppState, project_id: &str) -> ExportedBackup {
        let mut payload = canonicalize(state);
        payload.projects.retain(|p| p.id == project_id);
        payload.templates.clear();
        payload.history = Default::default();
        payload.active_project_id = payload.projects.first().map(|p| p.id.clone());
        self.export(payload)
    }

    fn export(&self, mut payload: AppState) -> ExportedBackup {
        let now = self.shared.clock.now();
        payload.last_saved = Some(now.to_rfc3339_opts(SecondsFormat::Millis, true));
        payload.saved_by = Some(SaveReason::Export.as_str().to_string());
        let json = serde_json::to_string_pretty(&payload).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "export did not serialize");
            String::from("{}")
        });
        ExportedBackup {
            json,
            file_name: format!("gear-list-backup-{}.json", now.format("%Y-%m-%d")),
            payload,
        }
    }

    /// Stop timers, drop in-memory state and close the save queue.
    ///
    /// Writes already queued still land. Later persisting calls report
    /// `storage-unavailable`.
    pub fn dispose(&self) {
        let mut st = self.shared.lock();
        if st.disposed {
            return;
        }
        st.disposed = true;
        st.cancel_autosave();
        st.last_known = None;
        if let Some(interval) = st.interval.take() {
            interval.abort();
        }
        self.shared.queue.close();
        tracing::debug!("storage service disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.lock().disposed
    }

    /// The most recent state seen through load, autosave or save.
    pub fn last_known(&self) -> Option<AppState> {
        self.shared.lock().last_known.clone()
    }

    async fn snapshots(&self) -> Vec<Snapshot> {
        let mut all = Vec::new();
        for backend in self.shared.backends.recovery_order() {
            match backend.snapshots().await {
                Ok(found) => all.extend(found),
                Err(err) => {
                    tracing::warn!(backend = backend.name(), error = %err, "snapshot read failed")
                }
            }
        }
        all
    }

    /// First snapshot in recovery order: latest, previous, legacy, legacy-backup.
    async fn best_backup(&self) -> Option<Snapshot> {
        let mut all = self.snapshots().await;
        all.sort_by_key(|s| s.source);
        all.into_iter().next()
    }
}

fn last_saved(payload: &Value) -> Option<chrono::DateTime<chrono::Utc>> {
    payload
        .get("lastSaved")
        .and_then(Value::as_str)
        .and_then(parse_timestamp)
}

/// A backup overrides the primary only with a readable, strictly newer stamp.
fn backup_is_newer(primary: &Value, backup: &Value) -> bool {
    match (last_saved(primary), last_saved(backup)) {
        (_, None) => false,
        (None, Some(_)) => true,
        (Some(primary), Some(backup)) => backup > primary,
    }
}

fn unstamped(mut state: AppState) -> AppState {
    state.saved_by = None;
    state
}

fn push_unique(warnings: &mut Vec<StorageWarning>, warning: StorageWarning) {
    if !warnings.contains(&warning) {
        warnings.push(warning);
    }
}

/// Single live autosave timer. Sleeps until the debouncer is due, re-checking
/// after every wake since later edits move the deadline.
async fn run_autosave(shared: Weak<Shared>) {
    loop {
        let due = {
            let Some(shared) = shared.upgrade() else { return };
            let mut st = shared.lock();
            match st.debouncer.due_at() {
                Some(due) => due,
                None => {
                    st.timer = None;
                    return;
                }
            }
        };
        tokio::time::sleep_until(due).await;

        let Some(shared) = shared.upgrade() else { return };
        let pending = {
            let mut st = shared.lock();
            if !st.debouncer.is_due(Instant::now()) {
                continue;
            }
            st.debouncer.clear();
            st.timer = None;
            st.pending.take()
        };
        if let Some(state) = pending {
            tracing::debug!("autosave firing");
            // Outcome is reported through the hooks.
            drop(shared.queue.submit(state, SaveReason::Autosave));
        }
        return;
    }
}

/// Periodic secondary-only snapshot of the last known state.
async fn run_snapshots(shared: Weak<Shared>, period: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let Some(shared) = shared.upgrade() else { return };
        let snapshot = shared.lock().last_known.clone();
        if let Some(state) = snapshot {
            tracing::debug!("periodic snapshot");
            drop(shared.queue.submit(state, SaveReason::Interval));
        }
    }
}
