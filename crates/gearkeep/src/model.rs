//! # Domain Model: Equipment Lists
//!
//! This module defines the canonical entity shapes persisted by gearkeep:
//! [`Item`], [`Category`], [`Project`], [`Template`], [`HistoryEntry`] and the
//! root aggregate [`AppState`].
//!
//! ## Ownership
//!
//! ```text
//! AppState
//! ├── projects: Project[]       ── categories: Category[] ── items: Item[]
//! ├── templates: Template[]     ── categories: Category[] ── items: Item[]
//! └── history: { items: HistoryEntry[], categories: string[] }
//! ```
//!
//! Every collection owns its children exclusively. Nothing is shared between
//! projects and templates: copying a template into a project mints fresh ids
//! for every copied category and item (see [`Template::instantiate`]).
//!
//! ## Canonical Form
//!
//! Values of these types are only ever produced by the normalizer
//! ([`crate::normalize`]) or by the constructors below, so they always satisfy:
//! - every `id` is a non-empty string, unique inside its parent collection
//! - `quantity >= 1`
//! - `status` is one of the four [`ItemStatus`] variants
//!
//! The serialized field names are camelCase; this is also the export/import
//! file format.
//!
//! ## Marker Names
//!
//! Entities that arrive without a usable name receive a marker token from
//! [`markers`] rather than a display string. The UI layer translates markers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current schema version stamped on every normalized [`AppState`].
pub const SCHEMA_VERSION: u32 = 2;

/// Theme applied when a payload carries none.
pub const DEFAULT_THEME: &str = "light";

pub mod markers {
    pub const DEFAULT_ITEM_NAME: &str = "untitled-item";
    pub const DEFAULT_CATEGORY_NAME: &str = "untitled-category";
    pub const DEFAULT_PROJECT_NAME: &str = "untitled-project";
    pub const DEFAULT_TEMPLATE_NAME: &str = "untitled-template";
    pub const IMPORTED_PROJECT_NAME: &str = "imported-project";
    pub const IMPORTED_CATEGORY_NAME: &str = "imported-category";
}

/// Mint a fresh opaque identifier.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    #[default]
    Needed,
    Packed,
    Missing,
    Rented,
}

impl ItemStatus {
    /// Parse a status against the allow-list. Case and surrounding whitespace
    /// are ignored.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "needed" => Some(Self::Needed),
            "packed" => Some(Self::Packed),
            "missing" => Some(Self::Missing),
            "rented" => Some(Self::Rented),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Needed => "needed",
            Self::Packed => "packed",
            Self::Missing => "missing",
            Self::Rented => "rented",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub name: String,
    pub quantity: u32,
    pub unit: String,
    pub details: String,
    pub status: ItemStatus,
}

impl Item {
    pub fn new(name: impl Into<String>, quantity: u32) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            quantity: quantity.max(1),
            unit: String::new(),
            details: String::new(),
            status: ItemStatus::Needed,
        }
    }

    /// Copy with a freshly minted id.
    pub fn duplicate(&self) -> Self {
        Self {
            id: new_id(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub name: String,
    pub notes: String,
    pub items: Vec<Item>,
}

impl Category {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            notes: String::new(),
            items: Vec::new(),
        }
    }

    pub fn with_items(mut self, items: Vec<Item>) -> Self {
        self.items = items;
        self
    }

    /// Deep copy with fresh ids for the category and every item in it.
    pub fn duplicate(&self) -> Self {
        Self {
            id: new_id(),
            name: self.name.clone(),
            notes: self.notes.clone(),
            items: self.items.iter().map(Item::duplicate).collect(),
        }
    }
}

/// Structured shoot calendar. Each list holds date strings as entered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ShootSchedule {
    pub prep: Vec<String>,
    pub shoot: Vec<String>,
    #[serde(rename = "return")]
    pub return_days: Vec<String>,
}

impl ShootSchedule {
    pub fn is_empty(&self) -> bool {
        self.prep.is_empty() && self.shoot.is_empty() && self.return_days.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    pub client: String,
    pub shoot_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shoot_schedule: Option<ShootSchedule>,
    pub location: String,
    pub contact: String,
    pub notes: String,
    pub categories: Vec<Category>,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            client: String::new(),
            shoot_date: String::new(),
            shoot_schedule: None,
            location: String::new(),
            contact: String::new(),
            notes: String::new(),
            categories: Vec::new(),
        }
    }

    pub fn with_categories(mut self, categories: Vec<Category>) -> Self {
        self.categories = categories;
        self
    }

    /// The date that best represents when this project's gear was used:
    /// the free-text shoot date, else the first scheduled shoot day.
    pub fn representative_date(&self) -> Option<&str> {
        if !self.shoot_date.is_empty() {
            return Some(&self.shoot_date);
        }
        self.shoot_schedule
            .as_ref()
            .and_then(|s| s.shoot.first())
            .map(String::as_str)
            .filter(|d| !d.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub id: String,
    pub name: String,
    pub description: String,
    pub notes: String,
    pub categories: Vec<Category>,
    pub last_used: Option<String>,
}

impl Template {
    /// Snapshot a project's categories as a reusable template.
    pub fn from_project(
        project: &Project,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            description: description.into(),
            notes: project.notes.clone(),
            categories: project.categories.iter().map(Category::duplicate).collect(),
            last_used: None,
        }
    }

    /// Categories ready to be placed into a project. Every category and item
    /// gets a fresh id so the copy never collides with the template.
    pub fn instantiate(&self) -> Vec<Category> {
        self.categories.iter().map(Category::duplicate).collect()
    }

    pub fn mark_used(&self, at: DateTime<Utc>) -> Self {
        Self {
            last_used: Some(at.to_rfc3339()),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub name: String,
    pub unit: String,
    pub details: String,
    pub last_used: Option<String>,
}

impl HistoryEntry {
    /// Case-insensitive identity used for de-duplication.
    pub fn key(&self) -> String {
        self.name.to_lowercase()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct History {
    pub items: Vec<HistoryEntry>,
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    pub version: u32,
    pub theme: String,
    pub projects: Vec<Project>,
    pub templates: Vec<Template>,
    pub history: History,
    pub active_project_id: Option<String>,
    pub last_saved: Option<String>,
    pub show_auto_backups: bool,
    /// Stamped on stored and exported copies only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_by: Option<String>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::empty()
    }
}

impl AppState {
    /// A fresh, current-version state with every collection empty.
    pub fn empty() -> Self {
        Self {
            version: SCHEMA_VERSION,
            theme: DEFAULT_THEME.to_string(),
            projects: Vec::new(),
            templates: Vec::new(),
            history: History::default(),
            active_project_id: None,
            last_saved: None,
            show_auto_backups: false,
            saved_by: None,
        }
    }

    pub fn project(&self, id: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.id == id)
    }

    /// `lastSaved` parsed as an RFC 3339 timestamp, if it is one.
    pub fn last_saved_at(&self) -> Option<DateTime<Utc>> {
        self.last_saved.as_deref().and_then(parse_timestamp)
    }
}

/// Parse an RFC 3339 timestamp into UTC. Anything else is `None`.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
