//! # Autosave Debounce with a Hard Ceiling
//!
//! Rapid edits are coalesced into one write, but a continuous stream of edits
//! must not postpone the write forever. [`Debouncer`] tracks two clocks:
//!
//! ```text
//! edits:     x  x  x  x  x  x  x  x  x  x  x ...
//! window:    |--w--|                            resets on every edit
//! ceiling:   |-------------c-------------|      starts at the first edit
//! fires at:  min(last_edit + w, first_edit + c)
//! ```
//!
//! The state machine is pure: callers pass `now` in, so the ceiling behavior is
//! testable without sleeping. The storage service drives it from a single timer
//! task using tokio's clock.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    ceiling: Duration,
    first_edit: Option<Instant>,
    last_edit: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration, ceiling: Duration) -> Self {
        Self {
            window,
            ceiling: ceiling.max(window),
            first_edit: None,
            last_edit: None,
        }
    }

    /// Record an edit and return the instant the pending flush is due.
    pub fn record(&mut self, now: Instant) -> Instant {
        self.first_edit.get_or_insert(now);
        self.last_edit = Some(now);
        self.due_at().unwrap_or(now)
    }

    /// When the pending flush should fire, or `None` if nothing is pending.
    pub fn due_at(&self) -> Option<Instant> {
        let first = self.first_edit?;
        let last = self.last_edit?;
        Some((last + self.window).min(first + self.ceiling))
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.due_at().is_some_and(|due| now >= due)
    }

    pub fn is_pending(&self) -> bool {
        self.first_edit.is_some()
    }

    /// Forget pending edits. Called after a flush and on cancellation.
    pub fn clear(&mut self) {
        self.first_edit = None;
        self.last_edit = None;
    }
}
