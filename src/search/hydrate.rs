// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Re-fetch search hits as live documents.
//!
//! One lookup for all hit ids. Without a database sort the output follows
//! hit order exactly; ids the database no longer has are skipped.

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use super::request::EsResultMode;
use super::response::Hit;
use crate::config::HydrateOptions;
use crate::document::Document;
use crate::storage::traits::{DocumentStore, IndexError};

/// A live document with whatever hit data was asked for.
#[derive(Debug, Clone, PartialEq)]
pub struct HydratedHit {
    pub document: Document,
    pub highlight: Option<Value>,
    pub es_result: Option<Value>,
}

/// What to attach from each hit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Attachments {
    pub highlight: bool,
    pub es_results: EsResultMode,
}

pub async fn hydrate(
    store: &dyn DocumentStore,
    hits: &[Hit],
    options: &HydrateOptions,
    attachments: Attachments,
) -> Result<Vec<HydratedHit>, IndexError> {
    if hits.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<String> = hits.iter().map(|h| h.id.clone()).collect();
    let docs = store.find_by_ids(&ids, options).await?;
    debug!(hits = hits.len(), found = docs.len(), "Hydrated search hits");

    let ordered = if options.sort.is_some() {
        docs
    } else {
        order_by_hits(hits, docs)
    };

    let by_id: HashMap<&str, &Hit> = hits.iter().map(|h| (h.id.as_str(), h)).collect();
    Ok(ordered
        .into_iter()
        .map(|document| {
            let hit = by_id.get(document.id_string().as_str()).copied();
            let highlight = if attachments.highlight {
                hit.and_then(|h| h.highlight.clone())
            } else {
                None
            };
            let es_result = match attachments.es_results {
                EsResultMode::Off => None,
                EsResultMode::Metadata => hit.map(|h| h.metadata(false)),
                EsResultMode::MetadataWithSource => hit.map(|h| h.metadata(true)),
            };
            HydratedHit { document, highlight, es_result }
        })
        .collect())
}

/// Re-project documents into hit order, dropping hits with no document.
#[must_use]
pub fn order_by_hits(hits: &[Hit], docs: Vec<Document>) -> Vec<Document> {
    let mut by_id: HashMap<String, Document> = docs.into_iter().map(|d| (d.id_string(), d)).collect();
    hits.iter().filter_map(|h| by_id.remove(&h.id)).collect()
}
