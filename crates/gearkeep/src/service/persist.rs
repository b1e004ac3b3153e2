//! The fan-out write that the save queue serializes.

use super::hooks::{SaveHooks, SaveInfo};
use crate::clock::Clock;
use crate::model::AppState;
use crate::queue::{Persist, SaveOutcome, SaveReason};
use crate::store::{Backend, Backends};
use crate::warning::StorageWarning;
use async_trait::async_trait;
use chrono::SecondsFormat;
use std::sync::Arc;

pub(crate) struct Persister {
    backends: Backends,
    clock: Arc<dyn Clock>,
    hooks: SaveHooks,
}

impl Persister {
    pub(crate) fn new(backends: Backends, clock: Arc<dyn Clock>, hooks: SaveHooks) -> Self {
        Self {
            backends,
            clock,
            hooks,
        }
    }

    /// Stores that must accept the write for it to count as durable.
    fn targets(&self, reason: SaveReason) -> Vec<&dyn Backend> {
        match reason {
            SaveReason::Interval => vec![self.backends.secondary.as_ref()],
            _ => vec![
                self.backends.primary.as_ref(),
                self.backends.secondary.as_ref(),
            ],
        }
    }

    fn stamp(&self, mut state: AppState, reason: SaveReason) -> AppState {
        state.last_saved = Some(self.clock.now().to_rfc3339_opts(SecondsFormat::Millis, true));
        state.saved_by = Some(reason.as_str().to_string());
        state
    }

    fn finish(&self, outcome: SaveOutcome) -> SaveOutcome {
        self.hooks.saved(
            &outcome.payload,
            &SaveInfo {
                reason: outcome.reason,
                warnings: outcome.warnings.clone(),
            },
        );
        for warning in &outcome.warnings {
            self.hooks.warn(warning);
        }
        outcome
    }
}

#[async_trait]
impl Persist for Persister {
    async fn persist(&self, state: AppState, reason: SaveReason) -> SaveOutcome {
        let payload = self.stamp(state, reason);
        let value = match serde_json::to_value(&payload) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(%reason, error = %err, "payload did not serialize");
                return self.finish(SaveOutcome::unavailable(payload, reason));
            }
        };

        let mut failed = Vec::new();
        for backend in self.targets(reason) {
            if let Err(err) = backend.write(&value).await {
                tracing::warn!(backend = backend.name(), %reason, error = %err, "write failed");
                failed.push(backend.name());
            }
        }

        if reason != SaveReason::Interval {
            if let Err(err) = self.backends.legacy.write(&value).await {
                tracing::debug!(backend = self.backends.legacy.name(), error = %err, "legacy write ignored");
            }
        }

        let warnings = if failed.is_empty() {
            tracing::debug!(%reason, "persist complete");
            Vec::new()
        } else {
            tracing::info!(%reason, failed = failed.len(), "persist degraded");
            vec![StorageWarning::StorageUnavailable]
        };

        self.finish(SaveOutcome {
            payload,
            reason,
            warnings,
        })
    }

    async fn wipe(&self) -> Vec<StorageWarning> {
        let backends = &self.backends;
        let mut failed = 0;
        for backend in [&backends.primary, &backends.secondary, &backends.legacy] {
            if let Err(err) = backend.clear().await {
                tracing::warn!(backend = backend.name(), error = %err, "clear failed");
                failed += 1;
            }
        }
        if failed == 0 {
            Vec::new()
        } else {
            vec![StorageWarning::StorageUnavailable]
        }
    }
}
