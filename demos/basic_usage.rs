// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic search-sync usage example.
//!
//! Demonstrates, against the in-memory engine and store:
//! 1. Declaring a schema and creating the index mapping
//! 2. Bulk indexing with a routing hook
//! 3. Searching with and without hydration
//! 4. Synchronizing the whole collection
//! 5. Truncating the index
//! 6. Displaying metrics
//!
//! # Run
//!
//! ```bash
//! cargo run --example basic_usage
//! ```

use std::sync::Arc;

use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use search_sync::schema::{FieldDef, Schema};
use search_sync::{
    BulkConfig, Document, HydrateOptions, IndexEvent, IndexOptions, IndexerConfig, InMemoryDocumentStore,
    InMemorySearchEngine, ModelHooks, ModelIndexer, SearchOptions, SortField, SyncEvent, SynchronizeOptions,
};
use serde_json::{json, Value};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install()?;

    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║           search-sync: Basic Usage Example                    ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Schema, collaborators and mapping
    // ─────────────────────────────────────────────────────────────────────────
    let author = Schema::builder()
        .without_id()
        .field("name", FieldDef::string())
        .field("email", FieldDef::string().not_indexed())
        .build();
    let schema = Schema::builder()
        .field("title", FieldDef::string().analyzer("english"))
        .field("tenant", FieldDef::string().es_type("keyword"))
        .field("views", FieldDef::number())
        .field("published", FieldDef::date())
        .field("author", FieldDef::object(author))
        .field("tags", FieldDef::array(FieldDef::string().es_type("keyword")))
        .build();

    let config = IndexerConfig {
        bulk: Some(BulkConfig { size: 3, delay_ms: 100, batch: 2 }),
        ..Default::default()
    };
    let hooks = ModelHooks::new().routing(|source: &Value| source["tenant"].as_str().map(str::to_string));

    let engine = Arc::new(InMemorySearchEngine::new());
    let store = Arc::new(InMemoryDocumentStore::new("Articles"));
    let articles = ModelIndexer::new(schema, config, hooks, engine.clone(), store.clone());

    println!("📦 Creating mapping for index '{}'...", articles.index_name());
    let mapping = articles.create_mapping(Some(json!({"number_of_shards": 1}))).await?;
    println!("   └─ {}", serde_json::to_string_pretty(&mapping)?);

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Bulk indexing
    // ─────────────────────────────────────────────────────────────────────────
    let mut events = articles.subscribe();
    let entries = [
        ("a1", "Rust ownership explained", "acme", 120),
        ("a2", "Async Rust in practice", "globex", 340),
        ("a3", "Search engines from scratch", "acme", 75),
        ("a4", "Bulk indexing patterns", "globex", 210),
    ];

    println!("\n📝 Indexing {} articles (bulk size 3)...", entries.len());
    for (id, title, tenant, views) in entries {
        let doc = Document::new(id)
            .with("title", title)
            .with("tenant", tenant)
            .with("views", views)
            .with("published", chrono::Utc::now());
        store.insert(doc.clone());
        let outcome = articles.index(&doc, IndexOptions::default()).await?;
        println!("   └─ {id}: {outcome:?} (pending: {})", articles.bulk_queue().pending());
    }
    println!("   ⏳ Flushing the remainder...");
    articles.flush().await;
    while let Ok(event) = events.try_recv() {
        if let IndexEvent::BulkError { .. } = event {
            println!("   ⚠️  {event}");
        }
    }
    println!("   ✅ {} documents in the index", engine.doc_count("articles"));
    println!("   └─ a2 routed to shard key {:?}", engine.routing_of("articles", "a2"));

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Search
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🔍 Searching for 'rust'...");
    let results = articles
        .search(
            json!({"match": {"title": "rust"}}),
            SearchOptions::new().highlight(json!({"fields": {"title": {}}})),
        )
        .await?;
    println!("   └─ total={} ids={:?}", results.total, results.ids());

    println!("\n📖 Hydrated, sorted by views (database sort wins)...");
    let hydrated = articles
        .es_search(
            json!({"query": {"match_all": {}}}),
            SearchOptions::new().hydrate(true).hydrate_options(HydrateOptions {
                sort: Some(vec![SortField::desc("views")]),
                ..Default::default()
            }),
        )
        .await?;
    for hit in hydrated.hydrated.unwrap_or_default() {
        let views = hit.document.get("views").map(|v| v.to_json()).unwrap_or(Value::Null);
        println!("   └─ {} views={views}", hit.document.id_string());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Synchronize
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🔄 Synchronizing the collection...");
    store.insert(Document::new("a5").with("title", "Added behind the indexer's back").with("tenant", "acme"));
    let mut handle = articles.synchronize(None, SynchronizeOptions { save_on_synchronize: Some(false) });
    while let Some(event) = handle.events.recv().await {
        match event {
            SyncEvent::Data(doc) => println!("   └─ synced {}", doc.id_string()),
            SyncEvent::Error { id, error } => println!("   ⚠️  {id:?}: {error}"),
            SyncEvent::Close(summary) => println!("   ✅ closed: {summary:?}"),
        }
    }
    println!("   └─ count now {}", articles.es_count(None).await?);

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Truncate
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🧹 Truncating...");
    let summary = articles.es_truncate().await?;
    println!("   └─ {summary:?}, count now {}", articles.es_count(None).await?);

    // ─────────────────────────────────────────────────────────────────────────
    // 6. Metrics and shutdown
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📈 Raw Metrics:");
    dump_metrics(&snapshotter);

    println!("\n🛑 Shutting down...");
    articles.shutdown().await;

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║                    Example complete!                          ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    Ok(())
}

/// Dump all captured metrics, sorted by name
fn dump_metrics(snapshotter: &Snapshotter) {
    let mut lines = Vec::new();
    for (composite_key, _, _, value) in snapshotter.snapshot().into_vec() {
        let (_, key) = composite_key.into_parts();
        let labels: Vec<_> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
        let label_str = if labels.is_empty() { String::new() } else { format!("{{{}}}", labels.join(",")) };

        let rendered = match value {
            DebugValue::Counter(v) => format!("{v}"),
            DebugValue::Gauge(v) => format!("{:.2}", v.into_inner()),
            DebugValue::Histogram(samples) => {
                let sum: f64 = samples.iter().map(|v| v.into_inner()).sum();
                format!("count={} sum={sum:.4}", samples.len())
            }
        };
        lines.push(format!("{}{} = {}", key.name(), label_str, rendered));
    }
    lines.sort();

    if lines.is_empty() {
        println!("   └─ (no metrics recorded)");
    }
    for line in lines {
        println!("   └─ {line}");
    }
}
