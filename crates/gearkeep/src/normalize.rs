//! # Normalizer: Untrusted Input to Canonical Entities
//!
//! Everything that enters the engine (stored payloads, imported files, legacy
//! blobs) is arbitrary JSON. This module turns any [`serde_json::Value`] into
//! the canonical shapes from [`crate::model`].
//!
//! ## Contract
//!
//! - **Pure**: no I/O, no clock reads.
//! - **Total**: no function here panics or returns an error. Malformed input
//!   becomes a minimally valid entity carrying a marker name.
//!
//! ## Coercion Rules
//!
//! | Field | Rule |
//! |-------|------|
//! | `id` | non-empty string, unique among siblings; otherwise a fresh id |
//! | `name` | string-coerced and trimmed; blank becomes a marker token |
//! | `quantity` / `qty` | positive finite number, floored; otherwise `1` |
//! | `status` | one of `needed/packed/missing/rented`; otherwise `needed` |
//! | text fields | strings trimmed, numbers/bools stringified, others `""` |
//!
//! Array elements that are neither objects nor strings are dropped.
//!
//! ## Validation vs Normalization
//!
//! [`validate_payload`] is a cheap structural check of the top-level shape. It
//! does not look inside projects or items; deep correctness is the job of the
//! `normalize_*` functions.

use crate::model::{
    markers, new_id, Category, History, HistoryEntry, Item, ItemStatus, Project, ShootSchedule,
    Template,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Parse JSON without ever failing. Blank or malformed text yields `None`.
pub fn safe_parse(text: &str) -> Option<Value> {
    if text.trim().is_empty() {
        return None;
    }
    serde_json::from_str(text).ok()
}

fn text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

fn name_or(value: Option<&Value>, fallback: &str) -> String {
    let name = text(value);
    if name.is_empty() {
        fallback.to_string()
    } else {
        name
    }
}

fn optional_text(value: Option<&Value>) -> Option<String> {
    Some(text(value)).filter(|s| !s.is_empty())
}

/// Coerce a quantity to a positive integer. Zero, negatives, NaN, and
/// anything unparseable become `1`.
pub fn coerce_quantity(value: Option<&Value>) -> u32 {
    let raw = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match raw {
        Some(q) if q.is_finite() && q >= 1.0 => q.floor().min(u32::MAX as f64) as u32,
        _ => 1,
    }
}

fn coerce_status(value: Option<&Value>) -> ItemStatus {
    value
        .and_then(Value::as_str)
        .and_then(ItemStatus::parse)
        .unwrap_or_default()
}

/// Keep the candidate id if it is a non-empty string not yet used by a
/// sibling; otherwise mint a new one.
fn unique_id(value: Option<&Value>, seen: &mut HashSet<String>) -> String {
    let candidate = value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty());
    let id = match candidate {
        Some(id) if !seen.contains(id) => id.to_string(),
        _ => new_id(),
    };
    seen.insert(id.clone());
    id
}

/// View an array element as an object. Bare strings are read as `{name}`.
fn element_fields(value: &Value) -> Option<Map<String, Value>> {
    match value {
        Value::Object(map) => Some(map.clone()),
        Value::String(name) => {
            let mut map = Map::new();
            map.insert("name".to_string(), Value::String(name.clone()));
            Some(map)
        }
        _ => None,
    }
}

fn elements(value: &Value) -> impl Iterator<Item = Map<String, Value>> + '_ {
    value
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(element_fields)
}

pub fn normalize_items(value: &Value) -> Vec<Item> {
    let mut seen = HashSet::new();
    elements(value)
        .map(|fields| Item {
            id: unique_id(fields.get("id"), &mut seen),
            name: name_or(fields.get("name"), markers::DEFAULT_ITEM_NAME),
            quantity: coerce_quantity(fields.get("quantity").or_else(|| fields.get("qty"))),
            unit: text(fields.get("unit")),
            details: text(fields.get("details")),
            status: coerce_status(fields.get("status")),
        })
        .collect()
}

pub fn normalize_categories(value: &Value) -> Vec<Category> {
    let mut seen = HashSet::new();
    elements(value)
        .map(|fields| Category {
            id: unique_id(fields.get("id"), &mut seen),
            name: name_or(fields.get("name"), markers::DEFAULT_CATEGORY_NAME),
            notes: text(fields.get("notes")),
            items: fields.get("items").map(normalize_items).unwrap_or_default(),
        })
        .collect()
}

fn date_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn normalize_schedule(value: Option<&Value>) -> Option<ShootSchedule> {
    let fields = value?.as_object()?;
    let schedule = ShootSchedule {
        prep: date_list(fields.get("prep")),
        shoot: date_list(fields.get("shoot")),
        return_days: date_list(fields.get("return")),
    };
    (!schedule.is_empty()).then_some(schedule)
}

fn project_from_fields(fields: &Map<String, Value>, seen: &mut HashSet<String>) -> Project {
    Project {
        id: unique_id(fields.get("id"), seen),
        name: name_or(fields.get("name"), markers::DEFAULT_PROJECT_NAME),
        client: text(fields.get("client")),
        shoot_date: text(fields.get("shootDate")),
        shoot_schedule: normalize_schedule(fields.get("shootSchedule")),
        location: text(fields.get("location")),
        contact: text(fields.get("contact")),
        notes: text(fields.get("notes")),
        categories: fields
            .get("categories")
            .map(normalize_categories)
            .unwrap_or_default(),
    }
}

pub fn normalize_project(value: &Value) -> Project {
    let fields = element_fields(value).unwrap_or_default();
    project_from_fields(&fields, &mut HashSet::new())
}

pub fn normalize_projects(value: &Value) -> Vec<Project> {
    let mut seen = HashSet::new();
    elements(value)
        .map(|fields| project_from_fields(&fields, &mut seen))
        .collect()
}

fn template_from_fields(fields: &Map<String, Value>, seen: &mut HashSet<String>) -> Template {
    Template {
        id: unique_id(fields.get("id"), seen),
        name: name_or(fields.get("name"), markers::DEFAULT_TEMPLATE_NAME),
        description: text(fields.get("description")),
        notes: text(fields.get("notes")),
        categories: fields
            .get("categories")
            .map(normalize_categories)
            .unwrap_or_default(),
        last_used: optional_text(fields.get("lastUsed")),
    }
}

pub fn normalize_template(value: &Value) -> Template {
    let fields = element_fields(value).unwrap_or_default();
    template_from_fields(&fields, &mut HashSet::new())
}

pub fn normalize_templates(value: &Value) -> Vec<Template> {
    let mut seen = HashSet::new();
    elements(value)
        .map(|fields| template_from_fields(&fields, &mut seen))
        .collect()
}

pub fn normalize_history(value: &Value) -> History {
    let entries: Vec<HistoryEntry> = value
        .get("items")
        .map(|items| {
            elements(items)
                .filter_map(|fields| {
                    let name = text(fields.get("name"));
                    (!name.is_empty()).then(|| HistoryEntry {
                        name,
                        unit: text(fields.get("unit")),
                        details: text(fields.get("details")),
                        last_used: optional_text(fields.get("lastUsed")),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let mut categories: Vec<String> = Vec::new();
    for name in value
        .get("categories")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        if !categories.iter().any(|c| c == name) {
            categories.push(name.to_string());
        }
    }

    History {
        items: merge_history_entries(&[], &entries),
        categories,
    }
}

fn parse_loose_date(raw: &str) -> Option<DateTime<Utc>> {
    crate::model::parse_timestamp(raw).or_else(|| {
        NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc())
    })
}

/// Pick the `lastUsed` that wins a merge: the newer one when both parse as
/// dates, otherwise the incoming one if it has any value.
fn newer_last_used(existing: &Option<String>, incoming: &Option<String>) -> Option<String> {
    match (existing, incoming) {
        (Some(old), Some(new)) => match (parse_loose_date(old), parse_loose_date(new)) {
            (Some(a), Some(b)) if a > b => Some(old.clone()),
            _ => Some(new.clone()),
        },
        (old, None) => old.clone(),
        (None, new) => new.clone(),
    }
}

fn pick(incoming: &str, existing: &str) -> String {
    if incoming.is_empty() {
        existing.to_string()
    } else {
        incoming.to_string()
    }
}

/// Upsert `incoming` into `current`, keyed by lowercased name. Order of first
/// appearance is preserved. Empty incoming fields fall back to the existing
/// entry's values.
pub fn merge_history_entries(
    current: &[HistoryEntry],
    incoming: &[HistoryEntry],
) -> Vec<HistoryEntry> {
    let mut merged: Vec<HistoryEntry> = Vec::with_capacity(current.len() + incoming.len());
    let mut positions: HashMap<String, usize> = HashMap::new();

    for entry in current.iter().chain(incoming) {
        let key = entry.key();
        if key.trim().is_empty() {
            continue;
        }
        match positions.get(&key) {
            Some(&idx) => {
                let existing = &merged[idx];
                let updated = HistoryEntry {
                    name: pick(&entry.name, &existing.name),
                    unit: pick(&entry.unit, &existing.unit),
                    details: pick(&entry.details, &existing.details),
                    last_used: newer_last_used(&existing.last_used, &entry.last_used),
                };
                merged[idx] = updated;
            }
            None => {
                positions.insert(key, merged.len());
                merged.push(entry.clone());
            }
        }
    }
    merged
}

/// Structural problems found by [`validate_payload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PayloadError {
    NotAnObject,
    ProjectsNotArray,
    TemplatesNotArray,
    HistoryNotObject,
    DeviceLibraryNotObject,
    VersionNotNumeric,
}

impl PayloadError {
    pub fn token(&self) -> &'static str {
        match self {
            Self::NotAnObject => "not-an-object",
            Self::ProjectsNotArray => "projects-not-array",
            Self::TemplatesNotArray => "templates-not-array",
            Self::HistoryNotObject => "history-not-object",
            Self::DeviceLibraryNotObject => "device-library-not-object",
            Self::VersionNotNumeric => "version-not-numeric",
        }
    }
}

impl fmt::Display for PayloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<PayloadError>,
}

/// Check only the top-level shape of a payload.
pub fn validate_payload(value: &Value) -> ValidationReport {
    let Some(fields) = value.as_object() else {
        return ValidationReport {
            valid: false,
            errors: vec![PayloadError::NotAnObject],
        };
    };

    let mut errors = Vec::new();
    let present = |key: &str| fields.get(key).filter(|v| !v.is_null());

    if present("projects").is_some_and(|v| !v.is_array()) {
        errors.push(PayloadError::ProjectsNotArray);
    }
    if present("templates").is_some_and(|v| !v.is_array()) {
        errors.push(PayloadError::TemplatesNotArray);
    }
    if present("history").is_some_and(|v| !v.is_object()) {
        errors.push(PayloadError::HistoryNotObject);
    }
    if present("deviceLibrary").is_some_and(|v| !v.is_object()) {
        errors.push(PayloadError::DeviceLibraryNotObject);
    }
    if present("version").is_some_and(|v| !v.is_number()) {
        errors.push(PayloadError::VersionNotNumeric);
    }

    ValidationReport {
        valid: errors.is_empty(),
        errors,
    }
}
