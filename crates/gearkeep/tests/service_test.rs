use chrono::{TimeZone, Utc};
use gearkeep::clock::ManualClock;
use gearkeep::model::{Category, Item, Project};
use gearkeep::store::memory::MemBackend;
use gearkeep::store::{BackupSource, Backends};
use gearkeep::{
    AppState, LoadSource, SaveHooks, SaveReason, ServiceOptions, StorageService, StorageWarning,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

const WINDOW: Duration = Duration::from_millis(500);
const CEILING: Duration = Duration::from_millis(5000);

struct Trio {
    primary: Arc<MemBackend>,
    secondary: Arc<MemBackend>,
    legacy: Arc<MemBackend>,
}

impl Trio {
    fn new() -> Self {
        Self {
            primary: Arc::new(MemBackend::named("primary")),
            secondary: Arc::new(
                MemBackend::named("secondary").with_snapshot_source(BackupSource::Latest),
            ),
            legacy: Arc::new(MemBackend::named("legacy").with_snapshot_source(BackupSource::Legacy)),
        }
    }

    fn backends(&self) -> Backends {
        Backends {
            primary: self.primary.clone(),
            secondary: self.secondary.clone(),
            legacy: self.legacy.clone(),
        }
    }

    fn all(&self) -> [&MemBackend; 3] {
        [
            self.primary.as_ref(),
            self.secondary.as_ref(),
            self.legacy.as_ref(),
        ]
    }
}

fn options() -> ServiceOptions {
    ServiceOptions {
        debounce: WINDOW,
        ceiling: CEILING,
        snapshot_interval: None,
    }
}

fn service(trio: &Trio) -> StorageService {
    StorageService::with_backends(trio.backends(), options(), SaveHooks::new())
}

fn demo_state(name: &str) -> AppState {
    let mut state = AppState::empty();
    state.projects.push(
        Project::new(name).with_categories(vec![
            Category::new("Camera").with_items(vec![Item::new("Camera body", 1)])
        ]),
    );
    state.active_project_id = Some(state.projects[0].id.clone());
    state
}

fn project_name(payload: &Option<Value>) -> Option<String> {
    payload
        .as_ref()
        .and_then(|p| p["projects"][0]["name"].as_str())
        .map(str::to_string)
}

/// Records every on_saved call as (reason, first project name).
fn recording_hooks() -> (SaveHooks, Arc<Mutex<Vec<(SaveReason, String)>>>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    let hooks = SaveHooks::new().on_saved(move |payload, info| {
        let name = payload
            .projects
            .first()
            .map(|p| p.name.clone())
            .unwrap_or_default();
        sink.lock().unwrap().push((info.reason, name));
    });
    (hooks, log)
}

// --- load ---

#[tokio::test]
async fn test_load_pristine_is_empty() {
    let trio = Trio::new();
    let svc = service(&trio);

    let loaded = svc.load_state().await;
    assert_eq!(loaded.source, LoadSource::Empty);
    assert!(loaded.state.projects.is_empty());
    assert!(loaded.warnings.is_empty());
    assert_eq!(trio.primary.write_count(), 0);
}

#[tokio::test]
async fn test_load_primary_failure_rehydrates_from_secondary() {
    let mut stored = serde_json::to_value(demo_state("Backup shoot")).unwrap();
    stored["lastSaved"] = json!("2024-05-01T10:00:00.000Z");
    let trio = Trio {
        secondary: Arc::new(
            MemBackend::named("secondary")
                .with_snapshot_source(BackupSource::Latest)
                .with_payload(stored),
        ),
        ..Trio::new()
    };
    trio.primary.set_simulate_read_error(true);
    let svc = service(&trio);

    let loaded = svc.load_state().await;
    assert_eq!(loaded.source, LoadSource::Backup(BackupSource::Latest));
    assert_eq!(loaded.state.projects[0].name, "Backup shoot");
    assert_eq!(loaded.warnings, vec![StorageWarning::PrimaryUnavailable]);

    // Self-heal finished before load returned.
    let healed = trio.primary.stored().unwrap();
    assert_eq!(healed["savedBy"], "rehydrate");
    assert_eq!(project_name(&Some(healed)).as_deref(), Some("Backup shoot"));
}

#[tokio::test]
async fn test_newer_backup_beats_stale_primary() {
    let mut old = serde_json::to_value(demo_state("Old")).unwrap();
    old["lastSaved"] = json!("2024-05-01T10:00:00Z");
    let mut new = serde_json::to_value(demo_state("New")).unwrap();
    new["lastSaved"] = json!("2024-05-01T10:05:00Z");

    let trio = Trio {
        primary: Arc::new(MemBackend::named("primary").with_payload(old)),
        legacy: Arc::new(
            MemBackend::named("legacy")
                .with_snapshot_source(BackupSource::Legacy)
                .with_payload(new),
        ),
        ..Trio::new()
    };
    let loaded = service(&trio).load_state().await;
    assert_eq!(loaded.source, LoadSource::Backup(BackupSource::Legacy));
    assert_eq!(loaded.state.projects[0].name, "New");
    assert_eq!(trio.primary.write_count(), 1);
}

#[tokio::test]
async fn test_newer_primary_is_kept_without_rewrite() {
    let mut primary = serde_json::to_value(demo_state("Primary")).unwrap();
    primary["lastSaved"] = json!("2024-05-02T10:00:00Z");
    let mut backup = serde_json::to_value(demo_state("Backup")).unwrap();
    backup["lastSaved"] = json!("2024-05-01T10:00:00Z");

    let trio = Trio {
        primary: Arc::new(MemBackend::named("primary").with_payload(primary)),
        secondary: Arc::new(
            MemBackend::named("secondary")
                .with_snapshot_source(BackupSource::Latest)
                .with_payload(backup),
        ),
        ..Trio::new()
    };
    let loaded = service(&trio).load_state().await;
    assert_eq!(loaded.source, LoadSource::Primary);
    assert_eq!(loaded.state.projects[0].name, "Primary");
    assert_eq!(trio.primary.write_count(), 0);
}

#[tokio::test]
async fn test_repairable_primary_is_migrated_not_discarded() {
    let primary = json!({
        "version": "2",
        "history": [],
        "lastSaved": "2024-05-02T10:00:00Z",
        "projects": [{
            "name": "Demo shoot",
            "categories": [{ "name": "Camera", "items": [{ "name": "Camera body", "quantity": 1 }] }]
        }]
    });
    let mut backup = serde_json::to_value(demo_state("Backup shoot")).unwrap();
    backup["lastSaved"] = json!("2024-05-01T10:00:00Z");

    let trio = Trio {
        primary: Arc::new(MemBackend::named("primary").with_payload(primary)),
        secondary: Arc::new(
            MemBackend::named("secondary")
                .with_snapshot_source(BackupSource::Latest)
                .with_payload(backup),
        ),
        ..Trio::new()
    };
    let loaded = service(&trio).load_state().await;

    assert_eq!(loaded.source, LoadSource::Primary);
    assert!(loaded.warnings.is_empty());
    assert_eq!(loaded.state.projects[0].name, "Demo shoot");
    assert_eq!(loaded.state.projects[0].categories[0].items[0].name, "Camera body");
    assert_eq!(trio.primary.write_count(), 0);
    assert_eq!(trio.secondary.write_count(), 0);
    assert_eq!(project_name(&trio.secondary.stored()).as_deref(), Some("Backup shoot"));
}

#[tokio::test]
async fn test_malformed_fields_are_coerced_on_load() {
    let trio = Trio {
        primary: Arc::new(
            MemBackend::named("primary").with_payload(json!({ "projects": "nope", "version": "x" })),
        ),
        ..Trio::new()
    };
    let loaded = service(&trio).load_state().await;

    assert_eq!(loaded.source, LoadSource::Primary);
    assert!(loaded.state.projects.is_empty());
    assert!(loaded.warnings.is_empty());
    assert_eq!(trio.primary.write_count(), 0);
}

// --- writes ---

#[tokio::test(start_paused = true)]
async fn test_saves_land_in_submission_order() {
    let trio = Trio::new();
    trio.primary.set_write_delay(Some(Duration::from_millis(300)));
    let (hooks, log) = recording_hooks();
    let svc = StorageService::with_backends(trio.backends(), options(), hooks);

    let (a, b, c) = (demo_state("A"), demo_state("B"), demo_state("C"));
    let (ra, rb, rc) = tokio::join!(svc.save_now(&a), svc.save_now(&b), svc.save_now(&c));

    assert!(ra.warnings.is_empty() && rb.warnings.is_empty() && rc.warnings.is_empty());
    for backend in trio.all() {
        assert_eq!(project_name(&backend.stored()).as_deref(), Some("C"));
    }
    let names: Vec<String> = log.lock().unwrap().iter().map(|(_, n)| n.clone()).collect();
    assert_eq!(names, vec!["A", "B", "C"]);
}

#[tokio::test]
async fn test_save_stamps_payload() {
    let trio = Trio::new();
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap()));
    let svc = StorageService::with_clock(trio.backends(), options(), SaveHooks::new(), clock);

    let outcome = svc.save_now(&demo_state("Demo shoot")).await;
    assert_eq!(outcome.payload.saved_by.as_deref(), Some("explicit"));
    assert_eq!(outcome.payload.last_saved.as_deref(), Some("2024-05-01T09:30:00.000Z"));

    let stored = trio.secondary.stored().unwrap();
    assert_eq!(stored["savedBy"], "explicit");
    assert_eq!(stored["lastSaved"], "2024-05-01T09:30:00.000Z");
}

#[tokio::test]
async fn test_partial_write_failure_raises_one_generic_warning() {
    let trio = Trio::new();
    trio.primary.set_simulate_write_error(true);
    trio.secondary.set_simulate_write_error(true);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let hooks = SaveHooks::new().on_warning(move |w| sink.lock().unwrap().push(w.token()));
    let svc = StorageService::with_backends(trio.backends(), options(), hooks);

    let outcome = svc.save_now(&demo_state("Demo shoot")).await;
    assert_eq!(outcome.warnings, vec![StorageWarning::StorageUnavailable]);
    assert_eq!(*seen.lock().unwrap(), vec!["storage-unavailable"]);
    // The legacy store still got its copy.
    assert_eq!(
        project_name(&trio.legacy.stored()).as_deref(),
        Some("Demo shoot")
    );
}

#[tokio::test]
async fn test_legacy_failure_is_silent() {
    let trio = Trio::new();
    trio.legacy.set_simulate_write_error(true);
    let outcome = service(&trio).save_now(&demo_state("Demo shoot")).await;
    assert!(outcome.warnings.is_empty());
}

// --- autosave ---

#[tokio::test(start_paused = true)]
async fn test_autosave_coalesces_rapid_edits() {
    let trio = Trio::new();
    let svc = service(&trio);

    for name in ["one", "two", "three"] {
        svc.schedule_autosave(&demo_state(name));
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(trio.primary.write_count(), 0);

    tokio::time::sleep(WINDOW).await;
    assert_eq!(trio.primary.write_count(), 1);
    let stored = trio.primary.stored();
    assert_eq!(project_name(&stored).as_deref(), Some("three"));
    assert_eq!(stored.unwrap()["savedBy"], "autosave");
}

#[tokio::test(start_paused = true)]
async fn test_autosave_ceiling_bounds_latency() {
    let trio = Trio::new();
    let fired = Arc::new(Mutex::new(Vec::new()));
    let sink = fired.clone();
    let hooks = SaveHooks::new().on_saved(move |_, _| sink.lock().unwrap().push(Instant::now()));
    let svc = StorageService::with_backends(trio.backends(), options(), hooks);

    let start = Instant::now();
    // Edits every 100ms never leave a quiet 500ms window.
    for i in 0..70 {
        svc.schedule_autosave(&demo_state(&format!("edit {i}")));
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    let fired = fired.lock().unwrap();
    assert!(!fired.is_empty(), "autosave was starved");
    assert!(fired[0] <= start + CEILING + Duration::from_millis(100));
}

#[tokio::test(start_paused = true)]
async fn test_flush_writes_pending_autosave_immediately() {
    let trio = Trio::new();
    let svc = service(&trio);

    svc.schedule_autosave(&demo_state("pending"));
    let outcome = svc.flush().await.unwrap();
    assert_eq!(outcome.reason, SaveReason::Autosave);
    assert_eq!(trio.primary.write_count(), 1);

    // Nothing left for the timer.
    tokio::time::sleep(CEILING).await;
    assert_eq!(trio.primary.write_count(), 1);
    assert!(svc.flush().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_save_now_supersedes_pending_autosave() {
    let trio = Trio::new();
    let svc = service(&trio);

    svc.schedule_autosave(&demo_state("draft"));
    svc.save_now(&demo_state("final")).await;
    tokio::time::sleep(CEILING).await;

    assert_eq!(trio.primary.write_count(), 1);
    assert_eq!(project_name(&trio.primary.stored()).as_deref(), Some("final"));
}

#[tokio::test(start_paused = true)]
async fn test_periodic_snapshot_writes_secondary_only() {
    let trio = Trio::new();
    let svc = StorageService::with_backends(
        trio.backends(),
        ServiceOptions {
            snapshot_interval: Some(Duration::from_secs(60)),
            ..options()
        },
        SaveHooks::new(),
    );

    // Nothing known yet: the first tick writes nothing.
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(trio.secondary.write_count(), 0);

    svc.save_now(&demo_state("Demo shoot")).await;
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(trio.secondary.stored().unwrap()["savedBy"], "opfs-interval");
    assert_eq!(trio.primary.stored().unwrap()["savedBy"], "explicit");
    assert_eq!(trio.legacy.write_count(), 1);
}

// --- import ---

#[tokio::test]
async fn test_import_legacy_payload() {
    let trio = Trio::new();
    let svc = service(&trio);
    let raw = r#"{"items":[{"name":"Legacy mic","quantity":"2"}],"notes":["legacy note"]}"#;

    let imported = svc.import_backup(raw, &AppState::empty());
    assert!(imported.warnings.is_empty());
    assert_eq!(imported.state.projects.len(), 1);
    let item = &imported.state.projects[0].categories[0].items[0];
    assert_eq!(item.name, "Legacy mic");
    assert_eq!(item.quantity, 2);
    // Import never writes by itself.
    assert_eq!(trio.primary.write_count(), 0);
}

#[tokio::test]
async fn test_import_rejects_bad_input_and_keeps_current() {
    let svc = service(&Trio::new());
    let current = demo_state("Mine");

    let garbage = svc.import_backup("{ not json", &current);
    assert_eq!(garbage.state, current);
    assert_eq!(garbage.warnings, vec![StorageWarning::ImportInvalid]);

    let wrong_shape = svc.import_backup(r#"{"projects": {}}"#, &current);
    assert_eq!(wrong_shape.state, current);
    assert_eq!(wrong_shape.warnings, vec![StorageWarning::ImportValidationFailed]);
}

#[tokio::test]
async fn test_import_keeps_both_copies_on_id_collision() {
    let svc = service(&Trio::new());
    let current = demo_state("Mine");
    let mut theirs = current.clone();
    theirs.projects[0].name = "Theirs".to_string();
    let raw = serde_json::to_string(&theirs).unwrap();

    let merged = svc.import_backup(&raw, &current).state;
    assert_eq!(merged.projects.len(), 2);
    assert_eq!(merged.projects[0], current.projects[0]);
    assert_eq!(merged.projects[1].name, "Theirs");
    assert_ne!(merged.projects[0].id, merged.projects[1].id);
}

// --- restore / reset ---

#[tokio::test]
async fn test_restore_without_backup() {
    let restored = service(&Trio::new()).restore_from_backup().await;
    assert_eq!(restored.source, LoadSource::Empty);
    assert!(restored.state.projects.is_empty());
    assert_eq!(restored.warnings, vec![StorageWarning::NoDeviceBackup]);
}

#[tokio::test]
async fn test_restore_persists_best_backup() {
    let backup = serde_json::to_value(demo_state("Saved on device")).unwrap();
    let trio = Trio {
        secondary: Arc::new(
            MemBackend::named("secondary")
                .with_snapshot_source(BackupSource::Latest)
                .with_payload(backup),
        ),
        ..Trio::new()
    };
    let svc = service(&trio);

    let restored = svc.restore_from_backup().await;
    assert_eq!(restored.source, LoadSource::Backup(BackupSource::Latest));
    assert_eq!(restored.state.projects[0].name, "Saved on device");
    assert_eq!(restored.state.saved_by, None);
    assert!(restored.state.last_saved.is_some());
    assert_eq!(trio.primary.stored().unwrap()["savedBy"], "restore");
    assert_eq!(svc.last_known(), Some(restored.state));
}

#[tokio::test(start_paused = true)]
async fn test_factory_reset_clears_everything() {
    let trio = Trio::new();
    let svc = service(&trio);
    svc.save_now(&demo_state("Doomed")).await;
    svc.schedule_autosave(&demo_state("Doomed edit"));

    let reset = svc.factory_reset().await;
    assert!(reset.warnings.is_empty());
    assert!(reset.state.projects.is_empty());

    tokio::time::sleep(CEILING).await;
    for backend in trio.all() {
        let stored = backend.stored().unwrap();
        assert_eq!(stored["savedBy"], "factory-reset");
        assert_eq!(stored["projects"], json!([]));
    }
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_during_reset_does_not_resurrect_old_state() {
    let trio = Trio::new();
    let (hooks, log) = recording_hooks();
    let svc = StorageService::with_backends(
        trio.backends(),
        ServiceOptions {
            snapshot_interval: Some(Duration::from_secs(1)),
            ..options()
        },
        hooks,
    );
    svc.save_now(&demo_state("Doomed")).await;

    // The reset write spans several snapshot ticks.
    trio.primary.set_write_delay(Some(Duration::from_secs(3)));
    let reset = svc.factory_reset().await;
    assert!(reset.warnings.is_empty());
    tokio::time::sleep(Duration::from_secs(5)).await;

    let log = log.lock().unwrap();
    let reset_at = log
        .iter()
        .position(|(reason, _)| *reason == SaveReason::FactoryReset)
        .unwrap();
    assert!(log[reset_at..].iter().all(|(_, name)| name.is_empty()));
    assert_eq!(trio.secondary.stored().unwrap()["projects"], json!([]));
}

#[tokio::test]
async fn test_factory_reset_reports_clear_failure_once() {
    let trio = Trio::new();
    trio.primary.set_simulate_write_error(true);
    let reset = service(&trio).factory_reset().await;
    assert_eq!(reset.warnings, vec![StorageWarning::StorageUnavailable]);
}

// --- listing / export ---

#[tokio::test]
async fn test_list_auto_backups_sorted_newest_first() {
    let mut older = serde_json::to_value(demo_state("Older")).unwrap();
    older["lastSaved"] = json!("2024-05-01T10:00:00Z");
    let mut newer = serde_json::to_value(demo_state("Newer")).unwrap();
    newer["lastSaved"] = json!("2024-06-01T10:00:00Z");
    newer["savedBy"] = json!("autosave");

    let trio = Trio {
        secondary: Arc::new(
            MemBackend::named("secondary")
                .with_snapshot_source(BackupSource::Latest)
                .with_payload(older),
        ),
        legacy: Arc::new(
            MemBackend::named("legacy")
                .with_snapshot_source(BackupSource::Legacy)
                .with_payload(newer),
        ),
        ..Trio::new()
    };
    let list = service(&trio).list_auto_backups().await;

    assert_eq!(list.len(), 2);
    assert_eq!(list[0].source, BackupSource::Legacy);
    assert_eq!(list[0].saved_by.as_deref(), Some("autosave"));
    assert_eq!(list[0].project_count, 1);
    assert_eq!(list[1].source, BackupSource::Latest);
}

#[tokio::test]
async fn test_export_backup() {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap()));
    let svc = StorageService::with_clock(Trio::new().backends(), options(), SaveHooks::new(), clock);
    let state = demo_state("Demo shoot");

    let export = svc.export_backup(&state);
    assert_eq!(export.file_name, "gear-list-backup-2024-05-01.json");
    assert_eq!(export.payload.saved_by.as_deref(), Some("export"));
    assert!(export.json.contains("\n  \"version\": 2"));
    let parsed: Value = serde_json::from_str(&export.json).unwrap();
    assert_eq!(parsed["projects"][0]["categories"][0]["items"][0]["name"], "Camera body");
}

#[tokio::test]
async fn test_export_project_backup() {
    let svc = service(&Trio::new());
    let mut state = demo_state("Keep");
    state.projects.push(Project::new("Skip"));
    state.history.categories.push("Camera".to_string());
    let keep_id = state.projects[0].id.clone();

    let export = svc.export_project_backup(&state, &keep_id);
    assert_eq!(export.payload.projects.len(), 1);
    assert_eq!(export.payload.projects[0].name, "Keep");
    assert!(export.payload.templates.is_empty());
    assert!(export.payload.history.items.is_empty());
    assert!(export.payload.history.categories.is_empty());

    let missing = svc.export_project_backup(&state, "no-such-id");
    assert!(missing.payload.projects.is_empty());
    assert_eq!(missing.payload.active_project_id, None);
}

// --- dispose ---

#[tokio::test(start_paused = true)]
async fn test_dispose_lets_queued_save_finish() {
    let trio = Trio::new();
    trio.primary.set_write_delay(Some(Duration::from_millis(300)));
    let svc = service(&trio);

    let saving = tokio::spawn({
        let svc = svc.clone();
        async move { svc.save_now(&demo_state("Saved")).await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    svc.dispose();

    let outcome = saving.await.unwrap();
    assert!(outcome.warnings.is_empty());
    for backend in trio.all() {
        assert_eq!(project_name(&backend.stored()).as_deref(), Some("Saved"));
    }
}

#[tokio::test(start_paused = true)]
async fn test_dispose_stops_everything() {
    let trio = Trio::new();
    let svc = service(&trio);
    svc.schedule_autosave(&demo_state("never written"));

    svc.dispose();
    assert!(svc.is_disposed());
    assert_eq!(svc.last_known(), None);

    tokio::time::sleep(CEILING).await;
    assert_eq!(trio.primary.write_count(), 0);

    svc.schedule_autosave(&demo_state("ignored"));
    assert_eq!(svc.last_known(), None);
    let outcome = svc.save_now(&demo_state("late")).await;
    assert_eq!(outcome.warnings, vec![StorageWarning::StorageUnavailable]);
    assert_eq!(trio.primary.write_count(), 0);

    svc.dispose();
}
