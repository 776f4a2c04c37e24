// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Public types for the model indexer.

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::document::Document;
use crate::storage::traits::IndexError;

/// Signals raised by a [`super::ModelIndexer`].
///
/// Lifecycle-hook work ([`super::ModelIndexer::on_saved`] and friends)
/// reports only through these.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexEvent {
    /// Document sent (or queued, in bulk mode)
    Indexed { index: String, id: String, queued: bool },
    /// Document matched the filter and was routed to unindex
    Filtered { index: String, id: String },
    /// Delete sent (or queued, in bulk mode)
    Removed { index: String, id: String, queued: bool },
    /// Immediate delete gave up after its retry budget
    RemoveFailed { index: String, id: String, error: IndexError },
    /// Index call from a lifecycle hook failed
    IndexFailed { index: String, id: String, error: IndexError },
    /// Bulk failure: whole request (no index/id) or one item
    BulkError {
        index: Option<String>,
        id: Option<String>,
        error: IndexError,
    },
}

impl std::fmt::Display for IndexEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Indexed { index, id, queued } => write!(f, "Indexed({index}/{id}, queued={queued})"),
            Self::Filtered { index, id } => write!(f, "Filtered({index}/{id})"),
            Self::Removed { index, id, queued } => write!(f, "Removed({index}/{id}, queued={queued})"),
            Self::RemoveFailed { index, id, error } => write!(f, "RemoveFailed({index}/{id}: {error})"),
            Self::IndexFailed { index, id, error } => write!(f, "IndexFailed({index}/{id}: {error})"),
            Self::BulkError { index, id, error } => write!(
                f,
                "BulkError({}/{}: {error})",
                index.as_deref().unwrap_or("-"),
                id.as_deref().unwrap_or("-")
            ),
        }
    }
}

/// Per-call index options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexOptions {
    /// Target index, overriding the model's
    pub index: Option<String>,
}

impl IndexOptions {
    pub fn index(index: impl Into<String>) -> Self {
        Self { index: Some(index.into()) }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IndexOutcome {
    /// Immediate index call completed with this engine response
    Indexed { response: Value },
    /// Instruction placed in the bulk buffer
    Queued,
    /// Filter matched; the document was unindexed instead
    Filtered { removal: UnindexOutcome },
}

#[derive(Debug, Clone, PartialEq)]
pub enum UnindexOutcome {
    Removed,
    Queued,
    /// Retry budget spent; reported, not raised
    Exhausted { attempts: usize, error: IndexError },
}

/// Per-call synchronize options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SynchronizeOptions {
    /// Overrides the model's `save_on_synchronize`
    pub save_on_synchronize: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub processed: usize,
    pub failed: usize,
    /// The cursor failed and the run stopped early
    pub aborted: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    Data(Document),
    /// Per-document failure (`id` set) or fatal cursor failure (`id` unset)
    Error { id: Option<String>, error: IndexError },
    /// Terminal; sent once every in-flight document has finished
    Close(SyncSummary),
}

/// A running synchronize: its event stream plus the task producing it.
#[derive(Debug)]
pub struct SynchronizeHandle {
    pub events: mpsc::UnboundedReceiver<SyncEvent>,
    pub task: JoinHandle<SyncSummary>,
}

impl SynchronizeHandle {
    /// Drain every event until close and return them with the summary.
    pub async fn collect(mut self) -> (Vec<SyncEvent>, SyncSummary) {
        let mut events = Vec::new();
        while let Some(event) = self.events.recv().await {
            events.push(event);
        }
        let summary = match self.task.await {
            Ok(summary) => summary,
            Err(_) => events
                .iter()
                .find_map(|e| match e {
                    SyncEvent::Close(summary) => Some(summary.clone()),
                    _ => None,
                })
                .unwrap_or_default(),
        };
        (events, summary)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TruncateSummary {
    /// Deletes queued for the engine. Items the engine later rejects are
    /// still counted here and surface as `IndexEvent::BulkError`.
    pub deleted: usize,
    pub rounds: usize,
}
