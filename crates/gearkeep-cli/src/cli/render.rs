use console::style;
use gearkeep::model::parse_timestamp;
use gearkeep::{BackupSummary, LoadResult, StorageWarning};
use std::fmt::Write;
use std::path::Path;

/// Human form of a stored `lastSaved` value.
fn when(last_saved: Option<&str>) -> String {
    match last_saved {
        None => "never".to_string(),
        Some(raw) => match parse_timestamp(raw) {
            Some(at) => at.format("%Y-%m-%d %H:%M UTC").to_string(),
            None => raw.to_string(),
        },
    }
}

pub fn warning(warning: &StorageWarning) -> String {
    format!("{} {}", style("warning:").yellow().bold(), warning)
}

pub fn status(loaded: &LoadResult) -> String {
    let state = &loaded.state;
    let active = state
        .active_project_id
        .as_deref()
        .and_then(|id| state.project(id))
        .map_or("none", |p| p.name.as_str());

    let mut out = String::new();
    let _ = writeln!(out, "{:<12}{}", "Source:", style(loaded.source).cyan());
    let _ = writeln!(out, "{:<12}{}", "Projects:", state.projects.len());
    let _ = writeln!(out, "{:<12}{}", "Templates:", state.templates.len());
    let _ = writeln!(out, "{:<12}{}", "Active:", active);
    let _ = writeln!(out, "{:<12}{}", "Last saved:", when(state.last_saved.as_deref()));
    out
}

pub fn backups(list: &[BackupSummary]) -> String {
    if list.is_empty() {
        return "No backups on this device.\n".to_string();
    }
    let mut out = String::new();
    for summary in list {
        let _ = writeln!(
            out,
            "{:<16} {:<22} {:<14} {} projects, {} templates",
            style(summary.source).bold(),
            when(summary.last_saved.as_deref()),
            summary.saved_by.as_deref().unwrap_or("-"),
            summary.project_count,
            summary.template_count,
        );
    }
    out
}

pub fn exported(path: &Path, projects: usize) -> String {
    format!(
        "Exported {} project{} to {}\n",
        projects,
        if projects == 1 { "" } else { "s" },
        path.display()
    )
}

pub fn imported(before: usize, after: usize) -> String {
    format!("Imported {} project(s); {} total\n", after.saturating_sub(before), after)
}
