// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Full-collection synchronize and truncate.
//!
//! Both run under the synchronize bulk settings and restore the model's own
//! settings when done. Synchronize restores only after the cursor has ended
//! AND every in-flight document has finished; the in-flight count is polled
//! so work completing after the cursor closes is still waited for.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, instrument, warn};

use crate::batching::BulkInstruction;
use crate::document::Document;
use crate::metrics;
use crate::storage::traits::{IndexError, SearchRequest};

use super::types::{
    IndexOptions, SyncEvent, SyncSummary, SynchronizeHandle, SynchronizeOptions, TruncateSummary,
};
use super::ModelIndexer;

impl ModelIndexer {
    /// Re-index every document matching `filter` (all when `None`).
    ///
    /// Returns immediately; progress arrives on the handle's event stream,
    /// ending with exactly one [`SyncEvent::Close`].
    pub fn synchronize(self: &Arc<Self>, filter: Option<Value>, options: SynchronizeOptions) -> SynchronizeHandle {
        let (tx, events) = mpsc::unbounded_channel();
        let this = Arc::clone(self);
        let task = tokio::spawn(async move { this.run_synchronize(filter, options, tx).await });
        SynchronizeHandle { events, task }
    }

    #[instrument(skip_all, fields(index = %self.index_name()))]
    async fn run_synchronize(
        self: Arc<Self>,
        filter: Option<Value>,
        options: SynchronizeOptions,
        tx: mpsc::UnboundedSender<SyncEvent>,
    ) -> SyncSummary {
        let (sync, save) = {
            let config = self.config.read();
            (
                config.synchronize.clone(),
                options.save_on_synchronize.unwrap_or(config.save_on_synchronize),
            )
        };
        info!(save, concurrency = sync.concurrency, "Synchronize started");

        let batch = sync.bulk.batch;
        let previous = self.override_bulk(sync.bulk);
        let permits = Arc::new(Semaphore::new(sync.concurrency.max(1)));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let processed = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(AtomicUsize::new(0));
        let mut aborted = false;

        let mut cursor = self.store.stream(filter, batch);
        while let Some(next) = cursor.next().await {
            let doc = match next {
                Ok(doc) => doc,
                Err(error) => {
                    warn!(error = %error, "Synchronize cursor failed");
                    let _ = tx.send(SyncEvent::Error { id: None, error });
                    aborted = true;
                    break;
                }
            };

            // Intake waits here while the pool is full
            let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                break;
            };
            metrics::set_synchronize_in_flight(in_flight.fetch_add(1, Ordering::SeqCst) + 1);

            let this = Arc::clone(&self);
            let tx = tx.clone();
            let in_flight = Arc::clone(&in_flight);
            let processed = Arc::clone(&processed);
            let failed = Arc::clone(&failed);
            tokio::spawn(async move {
                let id = doc.id_string();
                match this.synchronize_one(doc, save).await {
                    Ok(doc) => {
                        processed.fetch_add(1, Ordering::SeqCst);
                        metrics::record_synchronize_document(true);
                        let _ = tx.send(SyncEvent::Data(doc));
                    }
                    Err(error) => {
                        failed.fetch_add(1, Ordering::SeqCst);
                        metrics::record_synchronize_document(false);
                        debug!(id = %id, error = %error, "Synchronize document failed");
                        let _ = tx.send(SyncEvent::Error { id: Some(id), error });
                    }
                }
                metrics::set_synchronize_in_flight(in_flight.fetch_sub(1, Ordering::SeqCst) - 1);
                drop(permit);
            });
        }
        drop(cursor);

        let mut poll = tokio::time::interval(Duration::from_millis(sync.poll_interval_ms.max(1)));
        while in_flight.load(Ordering::SeqCst) > 0 {
            poll.tick().await;
        }

        let flushed = self.bulk.flush().await;
        self.restore_bulk(previous);

        let summary = SyncSummary {
            processed: processed.load(Ordering::SeqCst),
            failed: failed.load(Ordering::SeqCst),
            aborted,
        };
        info!(
            processed = summary.processed,
            failed = summary.failed,
            aborted,
            flushed,
            "Synchronize finished"
        );
        let _ = tx.send(SyncEvent::Close(summary.clone()));
        summary
    }

    /// Save-then-index, or index directly. The store does not fire the
    /// post-save hook, so the index call is made here either way.
    async fn synchronize_one(&self, doc: Document, save: bool) -> Result<Document, IndexError> {
        let doc = if save { self.store.save(&doc).await? } else { doc };
        self.index(&doc, IndexOptions::default()).await?;
        Ok(doc)
    }

    /// Delete every document from the index.
    ///
    /// Deletes go through the bulk queue under the synchronize bulk settings.
    /// Paginated runs count first, then delete the first page, flush and
    /// refresh until the index is empty or `ceil(count / page_size) + 1`
    /// rounds have run. Unpaginated runs sweep a single page.
    #[instrument(skip(self), fields(index = %self.index_name()))]
    pub async fn es_truncate(&self) -> Result<TruncateSummary, IndexError> {
        let (bulk, truncate) = {
            let config = self.config.read();
            (config.synchronize.bulk.clone(), config.truncate.clone())
        };
        let index = self.index_name();

        let previous = self.override_bulk(bulk);
        let result = self.truncate_sweep(&index, truncate.paginate, truncate.page_size.max(1)).await;
        self.bulk.flush().await;
        self.restore_bulk(previous);

        let summary = result?;
        metrics::record_truncate_deletes(&index, summary.deleted);
        info!(deleted = summary.deleted, rounds = summary.rounds, "Truncate finished");
        Ok(summary)
    }

    async fn truncate_sweep(&self, index: &str, paginate: bool, page_size: usize) -> Result<TruncateSummary, IndexError> {
        let mut summary = TruncateSummary::default();

        let max_rounds = if paginate {
            let total = match self.client.count(index, json!({"match_all": {}})).await {
                Ok(total) => total as usize,
                Err(IndexError::IndexNotFound(_)) => return Ok(summary),
                Err(e) => return Err(e),
            };
            if total == 0 {
                return Ok(summary);
            }
            total.div_ceil(page_size) + 1
        } else {
            1
        };

        for _ in 0..max_rounds {
            let request = SearchRequest {
                index: index.to_string(),
                body: json!({"query": {"match_all": {}}, "size": page_size}),
                routing: None,
            };
            let response = match self.client.search(request).await {
                Ok(response) => response,
                Err(IndexError::IndexNotFound(_)) => break,
                Err(e) => return Err(e),
            };
            let hits = response.hits.hits;
            if hits.is_empty() {
                break;
            }

            let deletes: Vec<BulkInstruction> = hits
                .into_iter()
                .map(|hit| {
                    let routing = match &hit.source {
                        Some(source) if self.hooks.routing.is_some() => self.hooks.routing_for(source),
                        _ => hit.routing.clone(),
                    };
                    BulkInstruction::delete(hit.index, hit.id, routing)
                })
                .collect();
            summary.deleted += deletes.len();
            summary.rounds += 1;
            debug!(round = summary.rounds, count = deletes.len(), "Truncate page queued");
            self.bulk.push(deletes).await;

            if !paginate {
                break;
            }
            self.bulk.flush().await;
            self.client.refresh(index).await?;
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batching::{BulkAction, BulkConfig};
    use crate::config::{IndexerConfig, TruncateConfig};
    use crate::coordinator::IndexEvent;
    use crate::hooks::ModelHooks;
    use crate::schema::{FieldDef, Schema};
    use crate::storage::memory::{InMemoryDocumentStore, InMemorySearchEngine};

    fn fixture(
        config: IndexerConfig,
        hooks: ModelHooks,
    ) -> (Arc<ModelIndexer>, Arc<InMemorySearchEngine>, Arc<InMemoryDocumentStore>) {
        let schema = Schema::builder()
            .field("title", FieldDef::string())
            .field("tenant", FieldDef::string())
            .build();
        let engine = Arc::new(InMemorySearchEngine::new());
        let store = Arc::new(InMemoryDocumentStore::new("posts"));
        let indexer = ModelIndexer::new(schema, config, hooks, engine.clone(), store.clone());
        (indexer, engine, store)
    }

    fn fill(store: &InMemoryDocumentStore, n: usize) {
        for i in 0..n {
            store.insert(
                Document::new(format!("d{i:02}"))
                    .with("title", format!("post {i}"))
                    .with("tenant", if i % 2 == 0 { "even" } else { "odd" }),
            );
        }
    }

    #[tokio::test]
    async fn test_synchronize_indexes_everything() {
        let (indexer, engine, store) = fixture(IndexerConfig::default(), ModelHooks::new());
        fill(&store, 5);

        let (events, summary) = indexer.synchronize(None, SynchronizeOptions::default()).collect().await;
        assert_eq!(summary, SyncSummary { processed: 5, failed: 0, aborted: false });
        assert_eq!(events.iter().filter(|e| matches!(e, SyncEvent::Data(_))).count(), 5);
        assert!(matches!(events.last(), Some(SyncEvent::Close(_))));
        assert_eq!(engine.doc_count("posts"), 5);
        // Default re-saves each document
        assert_eq!(store.save_calls(), 5);
    }

    #[tokio::test]
    async fn test_synchronize_restores_bulk_after_close() {
        let bulk = BulkConfig { size: 3, delay_ms: 25, batch: 2 };
        let config = IndexerConfig { bulk: Some(bulk.clone()), ..Default::default() };
        let (indexer, _engine, store) = fixture(config, ModelHooks::new());
        fill(&store, 4);

        let mut handle = indexer.synchronize(None, SynchronizeOptions::default());
        let mut data = 0;
        while let Some(event) = handle.events.recv().await {
            match event {
                SyncEvent::Data(_) => data += 1,
                SyncEvent::Close(_) => {
                    // Everything was flushed under the override before restore
                    assert_eq!(data, 4);
                    assert_eq!(indexer.config().bulk, Some(bulk.clone()));
                    assert_eq!(indexer.bulk_queue().pending(), 0);
                }
                SyncEvent::Error { .. } => panic!("unexpected error"),
            }
        }
        assert_eq!(indexer.bulk_queue().config(), bulk);
    }

    #[tokio::test]
    async fn test_synchronize_without_save() {
        let (indexer, engine, store) = fixture(IndexerConfig::default(), ModelHooks::new());
        fill(&store, 3);
        let options = SynchronizeOptions { save_on_synchronize: Some(false) };

        let (_events, summary) = indexer.synchronize(None, options).collect().await;
        assert_eq!(summary.processed, 3);
        assert_eq!(store.save_calls(), 0);
        assert_eq!(engine.doc_count("posts"), 3);
    }

    #[tokio::test]
    async fn test_synchronize_filter() {
        let (indexer, engine, store) = fixture(IndexerConfig::default(), ModelHooks::new());
        fill(&store, 6);

        let (_events, summary) = indexer
            .synchronize(Some(json!({"tenant": "odd"})), SynchronizeOptions::default())
            .collect()
            .await;
        assert_eq!(summary.processed, 3);
        assert_eq!(engine.doc_count("posts"), 3);
        assert!(engine.get("posts", "d01").is_some());
        assert!(engine.get("posts", "d00").is_none());
    }

    #[tokio::test]
    async fn test_failed_save_does_not_stop_stream() {
        let (indexer, engine, store) = fixture(IndexerConfig::default(), ModelHooks::new());
        fill(&store, 4);
        store.fail_save("d01");

        let (events, summary) = indexer.synchronize(None, SynchronizeOptions::default()).collect().await;
        assert_eq!(summary, SyncSummary { processed: 3, failed: 1, aborted: false });

        let failed: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                SyncEvent::Error { id, .. } => id.clone(),
                _ => None,
            })
            .collect();
        assert_eq!(failed, vec!["d01"]);
        assert_eq!(engine.doc_count("posts"), 3);
    }

    #[tokio::test]
    async fn test_cursor_failure_aborts() {
        let (indexer, _engine, store) = fixture(IndexerConfig::default(), ModelHooks::new());
        fill(&store, 5);
        store.fail_cursor_after(2);

        let (events, summary) = indexer.synchronize(None, SynchronizeOptions::default()).collect().await;
        assert!(summary.aborted);
        assert_eq!(summary.processed, 2);
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, SyncEvent::Error { id: None, .. }))
                .count(),
            1
        );
        assert_eq!(events.iter().filter(|e| matches!(e, SyncEvent::Close(_))).count(), 1);
        assert!(!indexer.is_bulk());
    }

    #[tokio::test]
    async fn test_synchronize_concurrent_pool() {
        let config = IndexerConfig {
            synchronize: crate::config::SynchronizeConfig { concurrency: 4, ..Default::default() },
            ..Default::default()
        };
        let (indexer, engine, store) = fixture(config, ModelHooks::new());
        fill(&store, 20);

        let (_events, summary) = indexer.synchronize(None, SynchronizeOptions::default()).collect().await;
        assert_eq!(summary.processed, 20);
        assert_eq!(engine.doc_count("posts"), 20);
        // Everything went out through the batch-friendly queue
        assert_eq!(engine.index_calls(), 0);
        assert!(engine.bulk_call_count() >= 1);
    }

    #[tokio::test]
    async fn test_filtered_documents_removed_during_synchronize() {
        let hooks = ModelHooks::new().filter(|doc: &Document| doc.get("tenant").and_then(|v| v.as_str()) == Some("odd"));
        let (indexer, engine, store) = fixture(IndexerConfig::default(), hooks);
        fill(&store, 4);
        engine.seed("posts", "d01", json!({"title": "stale"}), None);
        let mut rx = indexer.subscribe();

        indexer.synchronize(None, SynchronizeOptions::default()).collect().await;
        assert!(engine.get("posts", "d01").is_none());
        assert_eq!(engine.doc_count("posts"), 2);

        let mut filtered = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, IndexEvent::Filtered { .. }) {
                filtered += 1;
            }
        }
        assert_eq!(filtered, 2);
    }

    #[tokio::test]
    async fn test_truncate_paginates() {
        let config = IndexerConfig {
            truncate: TruncateConfig { paginate: true, page_size: 10 },
            ..Default::default()
        };
        let (indexer, engine, _store) = fixture(config, ModelHooks::new());
        for i in 0..25 {
            engine.seed("posts", &format!("d{i:02}"), json!({"title": "x"}), None);
        }

        let summary = indexer.es_truncate().await.unwrap();
        assert_eq!(summary, TruncateSummary { deleted: 25, rounds: 3 });
        assert_eq!(engine.doc_count("posts"), 0);
        assert!(!indexer.is_bulk());
    }

    #[tokio::test]
    async fn test_truncate_single_page() {
        let config = IndexerConfig {
            truncate: TruncateConfig { paginate: false, page_size: 10 },
            ..Default::default()
        };
        let (indexer, engine, _store) = fixture(config, ModelHooks::new());
        for i in 0..25 {
            engine.seed("posts", &format!("d{i:02}"), json!({"title": "x"}), None);
        }

        let summary = indexer.es_truncate().await.unwrap();
        assert_eq!(summary, TruncateSummary { deleted: 10, rounds: 1 });
        assert_eq!(engine.doc_count("posts"), 15);
    }

    #[tokio::test]
    async fn test_truncate_recomputes_routing() {
        let hooks = ModelHooks::new().routing(|source: &Value| source["tenant"].as_str().map(str::to_string));
        let (indexer, engine, _store) = fixture(IndexerConfig::default(), hooks);
        engine.seed("posts", "a", json!({"tenant": "acme"}), Some("stale".into()));
        engine.seed("posts", "b", json!({"tenant": "globex"}), None);

        indexer.es_truncate().await.unwrap();
        let deletes: Vec<(String, Option<String>)> = engine
            .bulk_calls()
            .into_iter()
            .flatten()
            .filter(|i| i.action == BulkAction::Delete)
            .map(|i| (i.id, i.routing))
            .collect();
        assert_eq!(
            deletes,
            vec![
                ("a".to_string(), Some("acme".to_string())),
                ("b".to_string(), Some("globex".to_string())),
            ]
        );
    }

    #[tokio::test]
    async fn test_truncate_missing_index() {
        let (indexer, engine, _store) = fixture(IndexerConfig::default(), ModelHooks::new());
        let summary = indexer.es_truncate().await.unwrap();
        assert_eq!(summary, TruncateSummary::default());
        assert_eq!(engine.bulk_call_count(), 0);
    }

    #[tokio::test]
    async fn test_truncate_single_page_missing_index() {
        let config = IndexerConfig {
            truncate: TruncateConfig { paginate: false, page_size: 10 },
            ..Default::default()
        };
        let (indexer, engine, _store) = fixture(config, ModelHooks::new());
        let summary = indexer.es_truncate().await.unwrap();
        assert_eq!(summary, TruncateSummary::default());
        assert_eq!(engine.bulk_call_count(), 0);
        assert!(!indexer.is_bulk());
    }

    #[tokio::test]
    async fn test_truncate_counts_failed_deletes() {
        let config = IndexerConfig {
            truncate: TruncateConfig { paginate: false, page_size: 10 },
            ..Default::default()
        };
        let (indexer, engine, _store) = fixture(config, ModelHooks::new());
        engine.seed("posts", "a", json!({"title": "x"}), None);
        engine.seed("posts", "b", json!({"title": "x"}), None);
        engine.fail_id("b", "locked");
        let mut rx = indexer.subscribe();

        let summary = indexer.es_truncate().await.unwrap();
        // Queued deletes are counted whether or not the engine accepts them
        assert_eq!(summary, TruncateSummary { deleted: 2, rounds: 1 });
        assert!(engine.get("posts", "a").is_none());
        assert!(engine.get("posts", "b").is_some());

        let mut failed = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let IndexEvent::BulkError { id: Some(id), .. } = event {
                failed.push(id);
            }
        }
        assert_eq!(failed, vec!["b"]);
    }
}
