// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Model indexer.
//!
//! The [`ModelIndexer`] ties one document model to its search index:
//! - per-document index/unindex, immediate or through the bulk queue
//! - search with optional hydration from the document store
//! - mapping creation, refresh and count
//! - full-collection synchronize and truncate
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use search_sync::schema::{FieldDef, Schema};
//! use search_sync::{
//!     Document, IndexOptions, IndexerConfig, InMemoryDocumentStore, InMemorySearchEngine,
//!     ModelHooks, ModelIndexer, SearchOptions,
//! };
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let schema = Schema::builder().field("title", FieldDef::string()).build();
//! let engine = Arc::new(InMemorySearchEngine::new());
//! let store = Arc::new(InMemoryDocumentStore::new("Posts"));
//! let indexer = ModelIndexer::new(schema, IndexerConfig::default(), ModelHooks::new(), engine, store);
//!
//! let doc = Document::new("1").with("title", "Hello world");
//! indexer.index(&doc, IndexOptions::default()).await.unwrap();
//!
//! let results = indexer
//!     .search(json!({"match": {"title": "world"}}), SearchOptions::new())
//!     .await
//!     .unwrap();
//! assert_eq!(results.total, 1);
//! # }
//! ```

mod flush;
mod index_api;
mod search_api;
mod sync_api;
mod types;

pub use flush::BulkQueue;
pub use types::{
    IndexEvent, IndexOptions, IndexOutcome, SyncEvent, SyncSummary, SynchronizeHandle, SynchronizeOptions,
    TruncateSummary, UnindexOutcome,
};

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::info;

use crate::batching::BulkConfig;
use crate::config::IndexerConfig;
use crate::hooks::ModelHooks;
use crate::mapping::{FieldMapping, MappingGenerator};
use crate::metrics;
use crate::schema::Schema;
use crate::storage::traits::{DocumentStore, SearchClient};

const EVENT_CAPACITY: usize = 1024;

/// Indexing coordinator for one document model.
///
/// `Send + Sync`; share it behind an `Arc`. Synchronize and the lifecycle
/// hooks need the `Arc` because they spawn work.
pub struct ModelIndexer {
    pub(super) schema: Arc<Schema>,

    /// Runtime config (bulk settings are swapped during synchronize/truncate)
    pub(super) config: RwLock<IndexerConfig>,

    pub(super) hooks: ModelHooks,

    pub(super) client: Arc<dyn SearchClient>,

    pub(super) store: Arc<dyn DocumentStore>,

    /// Mapping generator; shareable across models for one cache
    pub(super) mappings: Arc<MappingGenerator>,

    pub(super) bulk: BulkQueue,

    pub(super) events: broadcast::Sender<IndexEvent>,
}

impl ModelIndexer {
    pub fn new(
        schema: Arc<Schema>,
        config: IndexerConfig,
        hooks: ModelHooks,
        client: Arc<dyn SearchClient>,
        store: Arc<dyn DocumentStore>,
    ) -> Arc<Self> {
        Self::with_generator(schema, config, hooks, client, store, Arc::new(MappingGenerator::new()))
    }

    /// Like [`ModelIndexer::new`] with a shared mapping generator.
    pub fn with_generator(
        schema: Arc<Schema>,
        config: IndexerConfig,
        hooks: ModelHooks,
        client: Arc<dyn SearchClient>,
        store: Arc<dyn DocumentStore>,
        mappings: Arc<MappingGenerator>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let bulk = BulkQueue::new(config.bulk.clone().unwrap_or_default(), Arc::clone(&client), events.clone());

        let indexer = Self {
            schema,
            config: RwLock::new(config),
            hooks,
            client,
            store,
            mappings,
            bulk,
            events,
        };
        info!(index = %indexer.index_name(), bulk = indexer.is_bulk(), "Model indexer created");
        Arc::new(indexer)
    }

    /// Target index: configured name, else the lower-cased collection name.
    #[must_use]
    pub fn index_name(&self) -> String {
        self.config
            .read()
            .index
            .clone()
            .unwrap_or_else(|| self.store.collection_name().to_lowercase())
    }

    pub(super) fn target_index(&self, explicit: Option<&str>) -> String {
        explicit.map_or_else(|| self.index_name(), str::to_string)
    }

    #[must_use]
    pub fn is_bulk(&self) -> bool {
        self.config.read().bulk.is_some()
    }

    /// Generated mapping for this model's schema, cached when configured.
    #[must_use]
    pub fn mapping(&self) -> Arc<FieldMapping> {
        let cached = self.config.read().cache_mapping;
        metrics::record_mapping_generation(cached);
        self.mappings.generate(&self.schema, cached)
    }

    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    #[must_use]
    pub fn hooks(&self) -> &ModelHooks {
        &self.hooks
    }

    #[must_use]
    pub fn config(&self) -> IndexerConfig {
        self.config.read().clone()
    }

    /// Mutate the runtime config. Bulk settings changes reach the queue.
    pub fn update_config(&self, f: impl FnOnce(&mut IndexerConfig)) {
        let mut config = self.config.write();
        f(&mut config);
        self.bulk.replace_config(config.bulk.clone().unwrap_or_default());
    }

    pub fn subscribe(&self) -> broadcast::Receiver<IndexEvent> {
        self.events.subscribe()
    }

    #[must_use]
    pub fn bulk_queue(&self) -> &BulkQueue {
        &self.bulk
    }

    /// Send everything in the bulk buffer now.
    pub async fn flush(&self) -> usize {
        self.bulk.flush().await
    }

    /// Cancel the flush timer and send what is left.
    pub async fn shutdown(&self) -> usize {
        let flushed = self.bulk.shutdown().await;
        info!(index = %self.index_name(), flushed, "Model indexer shut down");
        flushed
    }

    pub(super) fn emit(&self, event: IndexEvent) {
        let _ = self.events.send(event);
    }

    /// Switch to `bulk` settings; returns what to restore.
    pub(super) fn override_bulk(&self, bulk: BulkConfig) -> Option<BulkConfig> {
        let mut config = self.config.write();
        self.bulk.replace_config(bulk.clone());
        config.bulk.replace(bulk)
    }

    pub(super) fn restore_bulk(&self, previous: Option<BulkConfig>) {
        let mut config = self.config.write();
        self.bulk.replace_config(previous.clone().unwrap_or_default());
        config.bulk = previous;
    }
}
