// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-document index and unindex.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::batching::BulkInstruction;
use crate::document::Document;
use crate::metrics::{self, LatencyTimer};
use crate::resilience::retry::retry;
use crate::serialize::serialize;
use crate::storage::traits::{IndexError, IndexRequest};

use super::types::{IndexEvent, IndexOptions, IndexOutcome, UnindexOutcome};
use super::ModelIndexer;

impl ModelIndexer {
    /// Index one document.
    ///
    /// A document the filter excludes is unindexed instead. In bulk mode the
    /// instruction is queued; otherwise the engine call is made now and its
    /// error, if any, is returned.
    pub async fn index(&self, doc: &Document, options: IndexOptions) -> Result<IndexOutcome, IndexError> {
        let index = self.target_index(options.index.as_deref());
        let id = doc.id_string();

        if self.hooks.excludes(doc) {
            debug!(index = %index, id = %id, "Document filtered, unindexing");
            let removal = self.unindex_from(doc, index.clone()).await;
            metrics::record_operation(&index, "index", "filtered");
            self.emit(IndexEvent::Filtered { index, id });
            return Ok(IndexOutcome::Filtered { removal });
        }

        let _timer = LatencyTimer::new("index");
        let (populate, force_refresh) = {
            let config = self.config.read();
            (config.populate.clone(), config.force_index_refresh)
        };

        let populated;
        let doc = if populate.is_empty() {
            doc
        } else {
            populated = self.store.populate(doc.clone(), &populate).await?;
            &populated
        };

        let mapping = self.mapping();
        let mut body = match &self.hooks.serializer {
            Some(custom) => custom.serialize(doc, &mapping),
            None => serialize(doc, &mapping),
        };
        if let Some(transform) = &self.hooks.transform {
            body = transform.transform(body, doc);
        }
        let routing = self.hooks.routing_for(&doc.to_plain_json());

        if self.is_bulk() {
            self.bulk
                .push(vec![BulkInstruction::index(index.clone(), id.clone(), body, routing)])
                .await;
            metrics::record_operation(&index, "index", "queued");
            self.emit(IndexEvent::Indexed { index, id, queued: true });
            return Ok(IndexOutcome::Queued);
        }

        let request = IndexRequest {
            index: index.clone(),
            id: id.clone(),
            body,
            routing,
        };
        let response = match self.client.index(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(index = %index, id = %id, error = %e, "Index call failed");
                metrics::record_operation(&index, "index", "error");
                return Err(e);
            }
        };
        if force_refresh {
            self.client.refresh(&index).await?;
        }

        metrics::record_operation(&index, "index", "success");
        self.emit(IndexEvent::Indexed { index, id, queued: false });
        Ok(IndexOutcome::Indexed { response })
    }

    /// Remove one document from the index.
    ///
    /// Never fails: an immediate delete that keeps failing past its retry
    /// budget is reported as [`UnindexOutcome::Exhausted`] and a
    /// [`IndexEvent::RemoveFailed`] event.
    pub async fn un_index(&self, doc: &Document) -> UnindexOutcome {
        self.unindex_from(doc, self.index_name()).await
    }

    async fn unindex_from(&self, doc: &Document, index: String) -> UnindexOutcome {
        let id = doc.id_string();
        let routing = self.hooks.routing_for(&doc.to_plain_json());

        if self.is_bulk() {
            self.bulk
                .push(vec![BulkInstruction::delete(index.clone(), id.clone(), routing)])
                .await;
            metrics::record_operation(&index, "unindex", "queued");
            self.emit(IndexEvent::Removed { index, id, queued: true });
            return UnindexOutcome::Queued;
        }

        let policy = self.config.read().unindex_retry();
        let result = retry("unindex", &policy, || self.client.delete(&index, &id, routing.as_deref())).await;

        match result {
            Ok(()) => {
                metrics::record_operation(&index, "unindex", "success");
                self.emit(IndexEvent::Removed { index, id, queued: false });
                UnindexOutcome::Removed
            }
            Err(error) => {
                warn!(
                    index = %index,
                    id = %id,
                    attempts = policy.max_attempts,
                    error = %error,
                    "Unindex gave up"
                );
                metrics::record_operation(&index, "unindex", "error");
                self.emit(IndexEvent::RemoveFailed {
                    index,
                    id,
                    error: error.clone(),
                });
                UnindexOutcome::Exhausted {
                    attempts: policy.max_attempts,
                    error,
                }
            }
        }
    }

    /// Post-save hook: index in the background. Returns `None` when
    /// automatic indexing is off. Failures surface as
    /// [`IndexEvent::IndexFailed`].
    pub fn on_saved(self: &Arc<Self>, doc: Document) -> Option<JoinHandle<()>> {
        if !self.config.read().index_automatically {
            return None;
        }
        let this = Arc::clone(self);
        Some(tokio::spawn(async move {
            if let Err(error) = this.index(&doc, IndexOptions::default()).await {
                let index = this.index_name();
                let id = doc.id_string();
                error!(index = %index, id = %id, error = %error, "Background index failed");
                this.emit(IndexEvent::IndexFailed { index, id, error });
            }
        }))
    }

    /// Post-remove hook: unindex in the background.
    pub fn on_removed(self: &Arc<Self>, doc: Document) -> Option<JoinHandle<()>> {
        if !self.config.read().index_automatically {
            return None;
        }
        let this = Arc::clone(self);
        Some(tokio::spawn(async move {
            this.un_index(&doc).await;
        }))
    }
}
