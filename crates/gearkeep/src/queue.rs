//! # Save Queue
//!
//! Every durable write goes through one FIFO queue drained by a single worker
//! task. Autosave, explicit save, rehydrate, restore, periodic snapshots and
//! factory reset all enqueue here, so two writes never overlap and a slow
//! write can never land after a later one.
//!
//! Enqueueing is synchronous ([`SaveQueue::submit`]); the caller may await the
//! returned receiver or drop it. Outcomes are also reported through the
//! persister's own hooks, so fire-and-forget callers lose nothing.
//!
//! Closing the queue refuses new jobs only. Jobs already queued, including the
//! one in flight, still run to completion.

use crate::model::AppState;
use crate::warning::StorageWarning;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Why a payload was written. Stamped into stored copies as `savedBy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SaveReason {
    #[serde(rename = "autosave")]
    Autosave,
    #[serde(rename = "explicit")]
    Explicit,
    #[serde(rename = "rehydrate")]
    Rehydrate,
    #[serde(rename = "restore")]
    Restore,
    /// Periodic snapshot into the secondary store only.
    #[serde(rename = "opfs-interval")]
    Interval,
    #[serde(rename = "factory-reset")]
    FactoryReset,
    /// Stamps exported files; never persisted.
    #[serde(rename = "export")]
    Export,
}

impl SaveReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Autosave => "autosave",
            Self::Explicit => "explicit",
            Self::Rehydrate => "rehydrate",
            Self::Restore => "restore",
            Self::Interval => "opfs-interval",
            Self::FactoryReset => "factory-reset",
            Self::Export => "export",
        }
    }
}

impl fmt::Display for SaveReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Result of one persist: the stamped payload that was written and any
/// warnings raised while writing it.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveOutcome {
    pub payload: AppState,
    pub reason: SaveReason,
    pub warnings: Vec<StorageWarning>,
}

impl SaveOutcome {
    /// Outcome for a write that never reached any store.
    pub fn unavailable(payload: AppState, reason: SaveReason) -> Self {
        Self {
            payload,
            reason,
            warnings: vec![StorageWarning::StorageUnavailable],
        }
    }
}

/// The critical section the queue serializes.
#[async_trait]
pub trait Persist: Send + Sync + 'static {
    async fn persist(&self, state: AppState, reason: SaveReason) -> SaveOutcome;

    /// Remove every stored copy. Returns warnings for stores that refused.
    async fn wipe(&self) -> Vec<StorageWarning>;
}

enum Job {
    Persist {
        state: AppState,
        reason: SaveReason,
        reply: oneshot::Sender<SaveOutcome>,
    },
    Wipe(oneshot::Sender<Vec<StorageWarning>>),
    /// Answered once every job queued before it has finished.
    Drain(oneshot::Sender<()>),
}

pub struct SaveQueue {
    /// `None` once closed.
    tx: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    worker: JoinHandle<()>,
}

impl SaveQueue {
    /// Spawn the worker on the current tokio runtime.
    pub fn start<P: Persist>(persister: Arc<P>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let worker = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                match job {
                    Job::Persist {
                        state,
                        reason,
                        reply,
                    } => {
                        tracing::debug!(%reason, "persist started");
                        let outcome = persister.persist(state, reason).await;
                        // The caller may have stopped listening.
                        let _ = reply.send(outcome);
                    }
                    Job::Wipe(reply) => {
                        tracing::debug!("wipe started");
                        let _ = reply.send(persister.wipe().await);
                    }
                    Job::Drain(reply) => {
                        let _ = reply.send(());
                    }
                }
            }
        });
        Self {
            tx: Mutex::new(Some(tx)),
            worker,
        }
    }

    fn send(&self, job: Job) -> bool {
        let tx = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        tx.as_ref().is_some_and(|tx| tx.send(job).is_ok())
    }

    /// Append a write to the queue. Never blocks.
    pub fn submit(&self, state: AppState, reason: SaveReason) -> oneshot::Receiver<SaveOutcome> {
        let (reply, rx) = oneshot::channel();
        let job = Job::Persist {
            state,
            reason,
            reply,
        };
        if !self.send(job) {
            tracing::warn!(%reason, "save queue is closed; write dropped");
        }
        rx
    }

    /// Enqueue and wait for this write to complete.
    pub async fn persist(&self, state: AppState, reason: SaveReason) -> SaveOutcome {
        let fallback = state.clone();
        match self.submit(state, reason).await {
            Ok(outcome) => outcome,
            Err(_) => SaveOutcome::unavailable(fallback, reason),
        }
    }

    /// Clear every store, in turn with the writes around it.
    pub async fn wipe(&self) -> Vec<StorageWarning> {
        let (reply, rx) = oneshot::channel();
        if !self.send(Job::Wipe(reply)) {
            return vec![StorageWarning::StorageUnavailable];
        }
        rx.await
            .unwrap_or_else(|_| vec![StorageWarning::StorageUnavailable])
    }

    /// Wait until every write queued so far has finished.
    pub async fn drain(&self) {
        let (reply, rx) = oneshot::channel();
        if self.send(Job::Drain(reply)) {
            let _ = rx.await;
        }
    }

    /// Refuse new jobs. The worker finishes what is already queued, then exits.
    pub fn close(&self) {
        self.tx.lock().unwrap_or_else(|e| e.into_inner()).take();
    }

    pub fn is_closed(&self) -> bool {
        self.tx.lock().unwrap_or_else(|e| e.into_inner()).is_none() || self.worker.is_finished()
    }
}
