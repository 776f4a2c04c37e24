//! # Search Sync
//!
//! Keeps a document collection in sync with a full-text search index.
//!
//! ## Architecture
//!
//! One [`ModelIndexer`] per document model ties a [`Schema`](schema::Schema)
//! to a search index, a [`SearchClient`] and a [`DocumentStore`]:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Schema → Mapping                        │
//! │  • Recursive walk of nested/embedded/referenced schemas    │
//! │  • Explicit-vs-implicit field inclusion                    │
//! │  • Cached per schema identity on request                   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Document → Index body                       │
//! │  • Mapping-driven serialization (ids, dates, casts)        │
//! │  • Filter / transform / routing hooks                      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!               (immediate call, or BulkQueue flush
//!                on size threshold / delay timer)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Search engine                          │
//! │  • Search results hydrated back from the document store    │
//! │  • Synchronize: bounded-concurrency full-collection resync │
//! │  • Truncate: paginated delete sweep                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use search_sync::schema::{FieldDef, Schema};
//! use search_sync::{
//!     BulkConfig, Document, IndexOptions, IndexerConfig, InMemoryDocumentStore,
//!     InMemorySearchEngine, ModelHooks, ModelIndexer, SearchOptions, SynchronizeOptions,
//! };
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let schema = Schema::builder()
//!         .field("title", FieldDef::string())
//!         .field("views", FieldDef::number())
//!         .build();
//!
//!     let config = IndexerConfig {
//!         bulk: Some(BulkConfig { size: 100, delay_ms: 50, batch: 50 }),
//!         ..Default::default()
//!     };
//!     let store = Arc::new(InMemoryDocumentStore::new("Posts"));
//!     let engine = Arc::new(InMemorySearchEngine::new());
//!     let posts = ModelIndexer::new(schema, config, ModelHooks::new(), engine, store.clone());
//!
//!     posts.create_mapping(None).await.expect("mapping");
//!
//!     let doc = Document::new("1").with("title", "Hello search").with("views", 3);
//!     store.insert(doc.clone());
//!     posts.index(&doc, IndexOptions::default()).await.expect("index");
//!     posts.flush().await;
//!
//!     // Re-index the whole collection
//!     let (_events, summary) = posts.synchronize(None, SynchronizeOptions::default()).collect().await;
//!     println!("synchronized {} documents", summary.processed);
//!
//!     let results = posts
//!         .search(json!({"match": {"title": "hello"}}), SearchOptions::new().hydrate(true))
//!         .await
//!         .expect("search");
//!     for hit in results.hydrated.unwrap_or_default() {
//!         println!("{:?}", hit.document);
//!     }
//!
//!     posts.shutdown().await;
//! }
//! ```
//!
//! ## Features
//!
//! - **Mapping generation**: type inference, nested objects, references, multi-fields
//! - **Serialization**: mapping-consistent bodies with custom casts
//! - **Bulk indexing**: size and delay flush triggers, never double-sent
//! - **Hydration**: search order or database sort, missing documents skipped
//! - **Synchronize**: streamed resync with drain-before-close
//! - **Retry Logic**: bounded retries for immediate deletes
//!
//! ## Configuration
//!
//! See [`IndexerConfig`] for all configuration options and [`ModelHooks`] for
//! the closure-based ones.
//!
//! ## Modules
//!
//! - [`coordinator`]: The [`ModelIndexer`] and its bulk queue
//! - [`schema`]: Schema description and builder
//! - [`mapping`]: Schema-to-mapping generator
//! - [`serialize`]: Document-to-body serializer
//! - [`search`]: Search options, responses and hydration
//! - [`batching`]: Bulk buffer and instructions
//! - [`storage`]: Collaborator traits and in-memory implementations
//! - [`resilience`]: Retry logic

pub mod batching;
pub mod config;
pub mod coordinator;
pub mod document;
pub mod hooks;
pub mod mapping;
pub mod metrics;
pub mod resilience;
pub mod schema;
pub mod search;
pub mod serialize;
pub mod storage;

pub use batching::{to_ndjson, BulkAction, BulkBuffer, BulkConfig, BulkInstruction, FlushReason};
pub use config::{HydrateOptions, IndexerConfig, SortField, SortOrder, SynchronizeConfig, TruncateConfig};
pub use coordinator::{
    BulkQueue, IndexEvent, IndexOptions, IndexOutcome, ModelIndexer, SyncEvent, SyncSummary, SynchronizeHandle,
    SynchronizeOptions, TruncateSummary, UnindexOutcome,
};
pub use document::{DocValue, Document, ObjectId};
pub use hooks::{BodyTransform, CustomSerializer, DocumentFilter, ModelHooks, RoutingKey};
pub use mapping::{generate_mapping, FieldMapping, MappingGenerator};
pub use metrics::LatencyTimer;
pub use resilience::retry::RetryConfig;
pub use search::{
    EsResultMode, Hit, HydratedHit, SearchOptions, SearchResponse, SearchResults, SortSpec, TotalHits,
};
pub use serialize::{serialize, serialize_many};
pub use storage::memory::{InMemoryDocumentStore, InMemorySearchEngine};
pub use storage::traits::{DocumentStore, IndexError, SearchClient};
