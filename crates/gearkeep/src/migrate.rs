//! # Migrator: Any Payload to the Current Schema
//!
//! Stored and imported payloads come in every shape the app has ever written:
//!
//! - **v0/v1 flat lists**: `{ items: [...], notes: [...] }` from before projects
//!   existed.
//! - **v1/v2 project trees**: `{ projects, templates, history, ... }`.
//! - **Garbage**: `null`, arrays, half-written objects.
//!
//! [`migrate_payload`] maps all of them onto a canonical [`AppState`] stamped
//! with [`SCHEMA_VERSION`]. Running it twice is a no-op.
//!
//! ## History Self-Healing
//!
//! Autocomplete history is not authoritative. After normalizing the stored
//! history, every item of every project is merged back into it, so losing the
//! history blob only costs the entries that no project references anymore.
//!
//! ## Merging
//!
//! [`merge_payloads`] is the import path. It is strictly additive: nothing
//! already in `current` is overwritten or dropped. Incoming projects and
//! templates whose ids collide with existing ones are re-keyed before
//! insertion, so an import always succeeds, at the cost of duplicate-looking
//! entries the user can delete by hand.

use crate::model::{
    markers, new_id, AppState, Category, History, HistoryEntry, Project, DEFAULT_THEME,
    SCHEMA_VERSION,
};
use crate::normalize::{
    merge_history_entries, normalize_history, normalize_items, normalize_projects,
    normalize_templates,
};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

fn read_version(payload: &Value) -> u64 {
    match payload.get("version") {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|v| v.is_finite() && *v >= 0.0).map(|v| v as u64))
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// Build the project that carries a pre-project flat item list.
fn legacy_project(payload: &Value) -> Option<Project> {
    let items = payload.get("items").filter(|v| v.is_array())?;

    let notes = payload
        .get("notes")
        .map(|n| match n {
            Value::Array(lines) => lines
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .collect::<Vec<_>>()
                .join("\n"),
            Value::String(s) => s.trim().to_string(),
            _ => String::new(),
        })
        .unwrap_or_default();

    let category =
        Category::new(markers::IMPORTED_CATEGORY_NAME).with_items(normalize_items(items));
    let mut project =
        Project::new(markers::IMPORTED_PROJECT_NAME).with_categories(vec![category]);
    project.notes = notes;
    Some(project)
}

/// History entries implied by the items of every project.
fn history_from_projects(projects: &[Project]) -> Vec<HistoryEntry> {
    projects
        .iter()
        .flat_map(|project| {
            let last_used = project.representative_date().map(str::to_string);
            project
                .categories
                .iter()
                .flat_map(|c| &c.items)
                .map(move |item| HistoryEntry {
                    name: item.name.clone(),
                    unit: item.unit.clone(),
                    details: item.details.clone(),
                    last_used: last_used.clone(),
                })
        })
        .collect()
}

fn resolve_active(candidate: Option<&str>, projects: &[Project]) -> Option<String> {
    candidate
        .filter(|id| projects.iter().any(|p| p.id == *id))
        .map(str::to_string)
        .or_else(|| projects.first().map(|p| p.id.clone()))
}

/// Upgrade any payload to the current [`AppState`] shape.
pub fn migrate_payload(payload: &Value) -> AppState {
    if !payload.is_object() {
        return AppState::empty();
    }

    let version = read_version(payload);
    let mut projects = payload
        .get("projects")
        .map(normalize_projects)
        .unwrap_or_default();

    if version <= 1 {
        if let Some(mut legacy) = legacy_project(payload) {
            if projects.iter().any(|p| p.id == legacy.id) {
                legacy.id = new_id();
            }
            tracing::debug!(
                version,
                items = legacy.categories[0].items.len(),
                "migrating legacy flat item list"
            );
            projects.insert(0, legacy);
        }
    }

    let templates = payload
        .get("templates")
        .map(normalize_templates)
        .unwrap_or_default();

    let stored_history = payload
        .get("history")
        .map(normalize_history)
        .unwrap_or_default();
    let history = History {
        items: merge_history_entries(&stored_history.items, &history_from_projects(&projects)),
        categories: stored_history.categories,
    };

    let theme = payload
        .get("theme")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_THEME)
        .to_string();

    let active_project_id = resolve_active(
        payload.get("activeProjectId").and_then(Value::as_str),
        &projects,
    );

    let last_saved = payload
        .get("lastSaved")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    AppState {
        version: SCHEMA_VERSION,
        theme,
        projects,
        templates,
        history,
        active_project_id,
        last_saved,
        show_auto_backups: payload
            .get("showAutoBackups")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        saved_by: None,
    }
}

/// Canonicalize an already-typed state by running it through the migrator.
pub fn canonicalize(state: &AppState) -> AppState {
    match serde_json::to_value(state) {
        Ok(value) => migrate_payload(&value),
        Err(err) => {
            tracing::warn!(error = %err, "state did not serialize; using empty state");
            AppState::empty()
        }
    }
}

/// Migrate both sides, then merge additively. See [`merge_states`].
pub fn merge_payloads(current: &Value, incoming: &Value) -> AppState {
    merge_states(&migrate_payload(current), &migrate_payload(incoming))
}

/// Additive merge of two canonical states. `current` wins every scalar
/// preference; collections are concatenated with colliding incoming ids
/// re-keyed.
pub fn merge_states(current: &AppState, incoming: &AppState) -> AppState {
    let mut projects = current.projects.clone();
    let mut project_ids: HashSet<String> = projects.iter().map(|p| p.id.clone()).collect();
    let mut renamed: HashMap<String, String> = HashMap::new();
    for project in &incoming.projects {
        let mut project = project.clone();
        if project_ids.contains(&project.id) {
            let fresh = new_id();
            renamed.insert(project.id.clone(), fresh.clone());
            project.id = fresh;
        }
        project_ids.insert(project.id.clone());
        projects.push(project);
    }

    let mut templates = current.templates.clone();
    let mut template_ids: HashSet<String> = templates.iter().map(|t| t.id.clone()).collect();
    for template in &incoming.templates {
        let mut template = template.clone();
        if template_ids.contains(&template.id) {
            template.id = new_id();
        }
        template_ids.insert(template.id.clone());
        templates.push(template);
    }

    let mut categories = current.history.categories.clone();
    for name in &incoming.history.categories {
        if !categories.contains(name) {
            categories.push(name.clone());
        }
    }

    let incoming_active = incoming
        .active_project_id
        .as_ref()
        .map(|id| renamed.get(id).unwrap_or(id));
    let exists = |id: &String| projects.iter().any(|p| &p.id == id);
    let active_project_id = current
        .active_project_id
        .as_ref()
        .filter(|id| exists(id))
        .or(incoming_active.filter(|id| exists(id)))
        .cloned()
        .or_else(|| projects.first().map(|p| p.id.clone()));

    AppState {
        version: SCHEMA_VERSION,
        theme: current.theme.clone(),
        projects,
        templates,
        history: History {
            items: merge_history_entries(&current.history.items, &incoming.history.items),
            categories,
        },
        active_project_id,
        last_saved: current.last_saved.clone(),
        show_auto_backups: current.show_auto_backups,
        saved_by: None,
    }
}
