// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-memory search engine and document store.
//!
//! Both keep everything in process and expose knobs for injecting failures,
//! which makes them suitable for tests and demos. The engine understands a
//! small query subset: `match_all`, `match`/`match_phrase` (case-insensitive
//! substring), `term`, `terms`, `ids`, `query_string`/`multi_match` and
//! `bool` combinations of those.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering as AtomicOrdering};

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use tracing::debug;

use super::traits::{
    BulkItemResult, BulkResponse, DocumentStore, IndexError, IndexRequest, SearchClient, SearchRequest,
};
use crate::batching::{BulkAction, BulkInstruction};
use crate::config::{HydrateOptions, SortOrder};
use crate::document::{DocValue, Document};
use crate::mapping::merge_json;
use crate::search::{Hit, HitsEnvelope, SearchResponse, TotalHits};

const DEFAULT_PAGE_SIZE: usize = 10;

#[derive(Debug, Clone)]
struct StoredDoc {
    source: Value,
    routing: Option<String>,
    seq: u64,
}

#[derive(Debug, Default)]
struct IndexState {
    docs: BTreeMap<String, StoredDoc>,
    settings: Option<Value>,
    mapping: Option<Value>,
}

/// Search engine held entirely in memory.
pub struct InMemorySearchEngine {
    indices: DashMap<String, IndexState>,
    numeric_totals: AtomicBool,
    failing_ids: DashMap<String, String>,
    fail_next_bulk: AtomicBool,
    bulk_log: Mutex<Vec<Vec<BulkInstruction>>>,
    search_log: Mutex<Vec<SearchRequest>>,
    index_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    seq: AtomicU64,
}

impl InMemorySearchEngine {
    #[must_use]
    pub fn new() -> Self {
        Self {
            indices: DashMap::new(),
            numeric_totals: AtomicBool::new(false),
            failing_ids: DashMap::new(),
            fail_next_bulk: AtomicBool::new(false),
            bulk_log: Mutex::new(Vec::new()),
            search_log: Mutex::new(Vec::new()),
            index_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            seq: AtomicU64::new(0),
        }
    }

    /// Report `hits.total` as a bare number instead of `{value, relation}`.
    #[must_use]
    pub fn with_numeric_totals(self) -> Self {
        self.numeric_totals.store(true, AtomicOrdering::Relaxed);
        self
    }

    /// Every bulk item for `id` fails with `reason` until cleared.
    pub fn fail_id(&self, id: impl Into<String>, reason: impl Into<String>) {
        self.failing_ids.insert(id.into(), reason.into());
    }

    pub fn clear_failures(&self) {
        self.failing_ids.clear();
        self.fail_next_bulk.store(false, AtomicOrdering::Relaxed);
    }

    /// The next bulk call fails at the transport level.
    pub fn fail_next_bulk(&self) {
        self.fail_next_bulk.store(true, AtomicOrdering::Relaxed);
    }

    /// Insert a document directly, bypassing call counters.
    pub fn seed(&self, index: &str, id: &str, source: Value, routing: Option<String>) {
        self.upsert(index, id, source, routing);
    }

    #[must_use]
    pub fn get(&self, index: &str, id: &str) -> Option<Value> {
        self.indices
            .get(index)
            .and_then(|state| state.docs.get(id).map(|d| d.source.clone()))
    }

    #[must_use]
    pub fn routing_of(&self, index: &str, id: &str) -> Option<String> {
        self.indices
            .get(index)
            .and_then(|state| state.docs.get(id).and_then(|d| d.routing.clone()))
    }

    #[must_use]
    pub fn doc_count(&self, index: &str) -> usize {
        self.indices.get(index).map_or(0, |state| state.docs.len())
    }

    #[must_use]
    pub fn has_index(&self, index: &str) -> bool {
        self.indices.contains_key(index)
    }

    #[must_use]
    pub fn mapping(&self, index: &str) -> Option<Value> {
        self.indices.get(index).and_then(|state| state.mapping.clone())
    }

    #[must_use]
    pub fn settings(&self, index: &str) -> Option<Value> {
        self.indices.get(index).and_then(|state| state.settings.clone())
    }

    /// Every bulk request received, in order.
    #[must_use]
    pub fn bulk_calls(&self) -> Vec<Vec<BulkInstruction>> {
        self.bulk_log.lock().clone()
    }

    #[must_use]
    pub fn bulk_call_count(&self) -> usize {
        self.bulk_log.lock().len()
    }

    #[must_use]
    pub fn searches(&self) -> Vec<SearchRequest> {
        self.search_log.lock().clone()
    }

    #[must_use]
    pub fn index_calls(&self) -> usize {
        self.index_calls.load(AtomicOrdering::Relaxed)
    }

    #[must_use]
    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(AtomicOrdering::Relaxed)
    }

    #[must_use]
    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(AtomicOrdering::Relaxed)
    }

    fn upsert(&self, index: &str, id: &str, source: Value, routing: Option<String>) -> bool {
        let seq = self.seq.fetch_add(1, AtomicOrdering::Relaxed);
        let mut state = self.indices.entry(index.to_string()).or_default();
        match state.docs.get_mut(id) {
            Some(existing) => {
                existing.source = source;
                existing.routing = routing;
                false
            }
            None => {
                state.docs.insert(id.to_string(), StoredDoc { source, routing, seq });
                true
            }
        }
    }

    fn matching(&self, index: &str, query: &Value) -> Result<Vec<(String, StoredDoc)>, IndexError> {
        let state = self
            .indices
            .get(index)
            .ok_or_else(|| IndexError::IndexNotFound(index.to_string()))?;
        let mut found: Vec<(String, StoredDoc)> = state
            .docs
            .iter()
            .filter(|(id, doc)| matches_query(query, id, &doc.source))
            .map(|(id, doc)| (id.clone(), doc.clone()))
            .collect();
        found.sort_by_key(|(_, doc)| doc.seq);
        Ok(found)
    }

    fn total(&self, value: u64) -> TotalHits {
        if self.numeric_totals.load(AtomicOrdering::Relaxed) {
            TotalHits::Count(value)
        } else {
            TotalHits::Detailed {
                value,
                relation: Some("eq".to_string()),
            }
        }
    }
}

impl Default for InMemorySearchEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchClient for InMemorySearchEngine {
    async fn index(&self, request: IndexRequest) -> Result<Value, IndexError> {
        self.index_calls.fetch_add(1, AtomicOrdering::Relaxed);
        let created = self.upsert(&request.index, &request.id, request.body, request.routing);
        Ok(json!({
            "_index": request.index,
            "_id": request.id,
            "result": if created { "created" } else { "updated" },
        }))
    }

    async fn bulk(&self, instructions: Vec<BulkInstruction>) -> Result<BulkResponse, IndexError> {
        self.bulk_log.lock().push(instructions.clone());
        if self.fail_next_bulk.swap(false, AtomicOrdering::Relaxed) {
            return Err(IndexError::Engine("bulk request rejected".to_string()));
        }

        let mut items = Vec::with_capacity(instructions.len());
        for instruction in instructions {
            if let Some(reason) = self.failing_ids.get(&instruction.id) {
                items.push(BulkItemResult {
                    action: instruction.action,
                    index: instruction.index,
                    id: instruction.id,
                    status: 500,
                    error: Some(json!({"type": "injected_failure", "reason": reason.value().clone()})),
                });
                continue;
            }
            let status = match instruction.action {
                BulkAction::Index => {
                    let body = instruction.body.clone().unwrap_or_else(|| json!({}));
                    if self.upsert(&instruction.index, &instruction.id, body, instruction.routing.clone()) {
                        201
                    } else {
                        200
                    }
                }
                BulkAction::Delete => {
                    let removed = self
                        .indices
                        .get_mut(&instruction.index)
                        .and_then(|mut state| state.docs.remove(&instruction.id));
                    if removed.is_some() { 200 } else { 404 }
                }
            };
            items.push(BulkItemResult {
                action: instruction.action,
                index: instruction.index,
                id: instruction.id,
                status,
                error: None,
            });
        }

        let errors = items.iter().any(BulkItemResult::is_failure);
        debug!(items = items.len(), errors, "In-memory bulk applied");
        Ok(BulkResponse { took: 1, errors, items })
    }

    async fn search(&self, request: SearchRequest) -> Result<SearchResponse, IndexError> {
        self.search_log.lock().push(request.clone());
        let body = &request.body;
        let query = body.get("query").cloned().unwrap_or_else(|| json!({"match_all": {}}));
        let mut found = self.matching(&request.index, &query)?;

        if let Some(min_score) = body.get("min_score").and_then(Value::as_f64) {
            if min_score > 1.0 {
                found.clear();
            }
        }
        if let Some(clauses) = body.get("sort").and_then(Value::as_array) {
            sort_hits(&mut found, clauses);
        }

        let total = found.len() as u64;
        let from = body.get("from").and_then(Value::as_u64).unwrap_or(0) as usize;
        let size = body
            .get("size")
            .and_then(Value::as_u64)
            .map_or(DEFAULT_PAGE_SIZE, |s| s as usize);
        let terms = query_terms(&query);
        let highlight_fields: Vec<String> = body
            .pointer("/highlight/fields")
            .and_then(Value::as_object)
            .map(|fields| fields.keys().cloned().collect())
            .unwrap_or_default();

        let hits: Vec<Hit> = found
            .into_iter()
            .skip(from)
            .take(size)
            .map(|(id, doc)| {
                let mut hit = Hit::new(request.index.clone(), id);
                hit.score = Some(1.0);
                hit.routing = doc.routing;
                hit.highlight = highlight(&doc.source, &highlight_fields, &terms);
                hit.source = Some(doc.source);
                hit
            })
            .collect();

        Ok(SearchResponse {
            took: 1,
            timed_out: false,
            hits: HitsEnvelope {
                total: self.total(total),
                max_score: (!hits.is_empty()).then_some(1.0),
                hits,
            },
            aggregations: None,
            suggest: None,
        })
    }

    async fn count(&self, index: &str, query: Value) -> Result<u64, IndexError> {
        Ok(self.matching(index, &query)?.len() as u64)
    }

    async fn delete(&self, index: &str, id: &str, _routing: Option<&str>) -> Result<(), IndexError> {
        self.delete_calls.fetch_add(1, AtomicOrdering::Relaxed);
        let mut state = self
            .indices
            .get_mut(index)
            .ok_or_else(|| IndexError::IndexNotFound(index.to_string()))?;
        state
            .docs
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| IndexError::NotFound {
                index: index.to_string(),
                id: id.to_string(),
            })
    }

    async fn index_exists(&self, index: &str) -> Result<bool, IndexError> {
        Ok(self.indices.contains_key(index))
    }

    async fn create_index(&self, index: &str, settings: Option<Value>) -> Result<(), IndexError> {
        if self.indices.contains_key(index) {
            return Err(IndexError::Engine(format!("resource_already_exists_exception: {index}")));
        }
        self.indices.insert(
            index.to_string(),
            IndexState {
                settings,
                ..IndexState::default()
            },
        );
        Ok(())
    }

    async fn put_mapping(&self, index: &str, mapping: Value) -> Result<(), IndexError> {
        let mut state = self
            .indices
            .get_mut(index)
            .ok_or_else(|| IndexError::IndexNotFound(index.to_string()))?;
        match &mut state.mapping {
            Some(existing) => merge_json(existing, &mapping),
            slot => *slot = Some(mapping),
        }
        Ok(())
    }

    async fn refresh(&self, index: &str) -> Result<(), IndexError> {
        self.refresh_calls.fetch_add(1, AtomicOrdering::Relaxed);
        if self.indices.contains_key(index) {
            Ok(())
        } else {
            Err(IndexError::IndexNotFound(index.to_string()))
        }
    }
}

fn lookup<'a>(source: &'a Value, path: &str) -> Option<&'a Value> {
    if let Some(value) = source.get(path) {
        return Some(value);
    }
    path.split('.').try_fold(source, |current, part| current.get(part))
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn contains_text(value: &Value, needle: &str) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => s.to_ascii_lowercase().contains(needle),
        Value::Array(items) => items.iter().any(|v| contains_text(v, needle)),
        Value::Object(map) => map.values().any(|v| contains_text(v, needle)),
        other => other.to_string().contains(needle),
    }
}

fn term_equals(value: &Value, expected: &Value) -> bool {
    match value {
        Value::Array(items) => items.iter().any(|v| term_equals(v, expected)),
        other => other == expected || text_of(other) == text_of(expected),
    }
}

/// `{field: x}` or `{field: {"query"|"value": x}}` pairs.
fn field_clauses<'a>(body: &'a Value, key: &'static str) -> impl Iterator<Item = (&'a str, &'a Value)> + 'a {
    body.as_object().into_iter().flat_map(move |map| {
        map.iter().map(move |(field, clause)| {
            let value = clause.get(key).unwrap_or(clause);
            (field.as_str(), value)
        })
    })
}

fn matches_query(query: &Value, id: &str, source: &Value) -> bool {
    let Some((kind, body)) = query.as_object().and_then(|map| map.iter().next()) else {
        return true;
    };
    match kind.as_str() {
        "match_all" => true,
        "match" | "match_phrase" => field_clauses(body, "query").all(|(field, text)| {
            let needle = text_of(text).to_ascii_lowercase();
            lookup(source, field).is_some_and(|v| contains_text(v, &needle))
        }),
        "term" => field_clauses(body, "value")
            .all(|(field, expected)| lookup(source, field).is_some_and(|v| term_equals(v, expected))),
        "terms" => field_clauses(body, "value").all(|(field, expected)| {
            let options = expected.as_array().map(Vec::as_slice).unwrap_or_default();
            lookup(source, field).is_some_and(|v| options.iter().any(|o| term_equals(v, o)))
        }),
        "ids" => body
            .get("values")
            .and_then(Value::as_array)
            .is_some_and(|values| values.iter().any(|v| v.as_str() == Some(id))),
        "query_string" | "multi_match" => body
            .get("query")
            .map(|q| text_of(q).to_ascii_lowercase())
            .is_some_and(|needle| contains_text(source, &needle)),
        "bool" => {
            let clauses = |key: &str| -> Vec<Value> {
                match body.get(key) {
                    Some(Value::Array(items)) => items.clone(),
                    Some(single) => vec![single.clone()],
                    None => Vec::new(),
                }
            };
            let must = clauses("must");
            let filter = clauses("filter");
            let should = clauses("should");
            let must_not = clauses("must_not");
            let required = must.iter().chain(filter.iter()).all(|q| matches_query(q, id, source));
            let excluded = must_not.iter().any(|q| matches_query(q, id, source));
            let optional = should.is_empty()
                || !must.is_empty()
                || !filter.is_empty()
                || should.iter().any(|q| matches_query(q, id, source));
            required && !excluded && optional
        }
        _ => false,
    }
}

/// Lower-cased text terms a query searches for, used for highlighting.
fn query_terms(query: &Value) -> Vec<String> {
    let Some((kind, body)) = query.as_object().and_then(|map| map.iter().next()) else {
        return Vec::new();
    };
    match kind.as_str() {
        "match" | "match_phrase" => field_clauses(body, "query")
            .map(|(_, text)| text_of(text).to_ascii_lowercase())
            .collect(),
        "query_string" | "multi_match" => body
            .get("query")
            .map(|q| vec![text_of(q).to_ascii_lowercase()])
            .unwrap_or_default(),
        "bool" => ["must", "filter", "should"]
            .iter()
            .filter_map(|key| body.get(*key))
            .flat_map(|clauses| match clauses {
                Value::Array(items) => items.iter().flat_map(query_terms).collect::<Vec<_>>(),
                single => query_terms(single),
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn emphasize(text: &str, term: &str) -> Option<String> {
    if term.is_empty() {
        return None;
    }
    let lower = text.to_ascii_lowercase();
    let mut out = String::with_capacity(text.len() + 9);
    let mut last = 0;
    for (start, _) in lower.match_indices(term) {
        let end = start + term.len();
        out.push_str(&text[last..start]);
        out.push_str("<em>");
        out.push_str(&text[start..end]);
        out.push_str("</em>");
        last = end;
    }
    if last == 0 {
        return None;
    }
    out.push_str(&text[last..]);
    Some(out)
}

fn highlight(source: &Value, fields: &[String], terms: &[String]) -> Option<Value> {
    let mut fragments = serde_json::Map::new();
    for field in fields {
        let Some(text) = lookup(source, field).and_then(Value::as_str) else {
            continue;
        };
        if let Some(marked) = terms.iter().find_map(|term| emphasize(text, term)) {
            fragments.insert(field.clone(), json!([marked]));
        }
    }
    (!fragments.is_empty()).then_some(Value::Object(fragments))
}

fn compare_json(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Greater,
        (_, None | Some(Value::Null)) => Ordering::Less,
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(x), Some(y)) => text_of(x).cmp(&text_of(y)),
    }
}

fn sort_hits(found: &mut [(String, StoredDoc)], clauses: &[Value]) {
    let keys: Vec<(String, bool)> = clauses
        .iter()
        .filter_map(|clause| match clause {
            Value::String(field) => Some((field.clone(), false)),
            Value::Object(map) => map.iter().next().map(|(field, spec)| {
                let order = spec.get("order").unwrap_or(spec);
                (field.clone(), order.as_str() == Some("desc"))
            }),
            _ => None,
        })
        .filter(|(field, _)| field != "_score")
        .collect();

    found.sort_by(|(_, a), (_, b)| {
        keys.iter()
            .map(|(field, descending)| {
                let ord = compare_json(lookup(&a.source, field), lookup(&b.source, field));
                if *descending { ord.reverse() } else { ord }
            })
            .find(|ord| *ord != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
}

/// Document store held entirely in memory. Insertion order is the natural
/// order returned by lookups.
pub struct InMemoryDocumentStore {
    collection: String,
    docs: RwLock<Vec<Document>>,
    linked: DashMap<String, Document>,
    failing_saves: DashSet<String>,
    cursor_failure_after: Mutex<Option<usize>>,
    last_find: Mutex<Option<(Vec<String>, HydrateOptions)>>,
    find_calls: AtomicUsize,
    save_calls: AtomicUsize,
}

impl InMemoryDocumentStore {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            docs: RwLock::new(Vec::new()),
            linked: DashMap::new(),
            failing_saves: DashSet::new(),
            cursor_failure_after: Mutex::new(None),
            last_find: Mutex::new(None),
            find_calls: AtomicUsize::new(0),
            save_calls: AtomicUsize::new(0),
        }
    }

    /// Insert or replace a document without counting it as a save.
    pub fn insert(&self, doc: Document) {
        let mut docs = self.docs.write();
        let id = doc.id_string();
        match docs.iter_mut().find(|d| d.id_string() == id) {
            Some(existing) => *existing = doc,
            None => docs.push(doc),
        }
    }

    pub fn remove(&self, id: &str) -> Option<Document> {
        let mut docs = self.docs.write();
        let position = docs.iter().position(|d| d.id_string() == id)?;
        Some(docs.remove(position))
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Document> {
        self.docs.read().iter().find(|d| d.id_string() == id).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.docs.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.docs.read().is_empty()
    }

    /// Register a document from another collection that references resolve to.
    pub fn link(&self, doc: Document) {
        self.linked.insert(doc.id_string(), doc);
    }

    pub fn fail_save(&self, id: impl Into<String>) {
        self.failing_saves.insert(id.into());
    }

    /// Cursors fail after yielding `n` documents.
    pub fn fail_cursor_after(&self, n: usize) {
        *self.cursor_failure_after.lock() = Some(n);
    }

    #[must_use]
    pub fn find_calls(&self) -> usize {
        self.find_calls.load(AtomicOrdering::Relaxed)
    }

    #[must_use]
    pub fn save_calls(&self) -> usize {
        self.save_calls.load(AtomicOrdering::Relaxed)
    }

    /// Ids and options of the most recent lookup.
    #[must_use]
    pub fn last_find(&self) -> Option<(Vec<String>, HydrateOptions)> {
        self.last_find.lock().clone()
    }

    fn resolve(&self, value: &DocValue) -> DocValue {
        let key = match value {
            DocValue::ObjectId(oid) => oid.to_hex(),
            DocValue::String(s) => s.clone(),
            DocValue::Array(items) => return DocValue::Array(items.iter().map(|v| self.resolve(v)).collect()),
            other => return other.clone(),
        };
        match self.linked.get(&key) {
            Some(target) => {
                let mut object = target.fields().clone();
                object.insert("_id".to_string(), target.id().clone());
                DocValue::Object(object)
            }
            None => value.clone(),
        }
    }
}

fn matches_filter(doc: &Document, filter: Option<&Value>) -> bool {
    let Some(Value::Object(conditions)) = filter else {
        return true;
    };
    conditions
        .iter()
        .all(|(field, expected)| doc.get(field).is_some_and(|v| &v.to_json() == expected))
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    fn collection_name(&self) -> &str {
        &self.collection
    }

    async fn find_by_ids(&self, ids: &[String], options: &HydrateOptions) -> Result<Vec<Document>, IndexError> {
        self.find_calls.fetch_add(1, AtomicOrdering::Relaxed);
        *self.last_find.lock() = Some((ids.to_vec(), options.clone()));

        let mut found: Vec<Document> = self
            .docs
            .read()
            .iter()
            .filter(|d| ids.contains(&d.id_string()))
            .cloned()
            .collect();

        if let Some(sort) = &options.sort {
            found.sort_by(|a, b| {
                sort.iter()
                    .map(|key| {
                        let ord = match (a.get(&key.field), b.get(&key.field)) {
                            (Some(x), Some(y)) => x.compare(y),
                            (None, Some(_)) => Ordering::Greater,
                            (Some(_), None) => Ordering::Less,
                            (None, None) => Ordering::Equal,
                        };
                        match key.order {
                            SortOrder::Asc => ord,
                            SortOrder::Desc => ord.reverse(),
                        }
                    })
                    .find(|ord| *ord != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            });
        }
        if !options.populate.is_empty() {
            let mut populated = Vec::with_capacity(found.len());
            for doc in found {
                populated.push(self.populate(doc, &options.populate).await?);
            }
            found = populated;
        }
        if let Some(select) = &options.select {
            found = found.iter().map(|d| d.project(select)).collect();
        }
        Ok(found)
    }

    fn stream(&self, filter: Option<Value>, batch_size: usize) -> BoxStream<'static, Result<Document, IndexError>> {
        let mut items: Vec<Result<Document, IndexError>> = self
            .docs
            .read()
            .iter()
            .filter(|d| matches_filter(d, filter.as_ref()))
            .cloned()
            .map(Ok)
            .collect();
        if let Some(after) = *self.cursor_failure_after.lock() {
            items.truncate(after);
            items.push(Err(IndexError::Store("cursor closed unexpectedly".to_string())));
        }
        stream::iter(items)
            .chunks(batch_size.max(1))
            .flat_map(stream::iter)
            .boxed()
    }

    async fn save(&self, doc: &Document) -> Result<Document, IndexError> {
        let id = doc.id_string();
        if self.failing_saves.contains(&id) {
            return Err(IndexError::Store(format!("save rejected for '{id}'")));
        }
        self.save_calls.fetch_add(1, AtomicOrdering::Relaxed);
        self.insert(doc.clone());
        Ok(doc.clone())
    }

    async fn populate(&self, mut doc: Document, paths: &[String]) -> Result<Document, IndexError> {
        for path in paths {
            if let Some(value) = doc.get(path) {
                let resolved = self.resolve(value);
                doc.set(path.clone(), resolved);
            }
        }
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SortField;
    use crate::document::ObjectId;
    use futures::TryStreamExt;

    fn search(index: &str, body: Value) -> SearchRequest {
        SearchRequest { index: index.to_string(), body, routing: None }
    }

    #[tokio::test]
    async fn test_index_and_match() {
        let engine = InMemorySearchEngine::new();
        engine
            .index(IndexRequest { index: "posts".into(), id: "1".into(), body: json!({"title": "Hello World"}), routing: None })
            .await
            .unwrap();
        engine.seed("posts", "2", json!({"title": "Goodbye"}), None);

        let response = engine
            .search(search("posts", json!({"query": {"match": {"title": "WORLD"}}})))
            .await
            .unwrap();
        assert_eq!(response.hits.total.value(), 1);
        assert_eq!(response.hits.hits[0].id, "1");
        assert_eq!(engine.index_calls(), 1);
    }

    #[tokio::test]
    async fn test_totals_shape() {
        let engine = InMemorySearchEngine::new();
        engine.seed("i", "a", json!({}), None);
        let detailed = engine.search(search("i", json!({}))).await.unwrap();
        assert!(matches!(detailed.hits.total, TotalHits::Detailed { value: 1, .. }));

        let engine = InMemorySearchEngine::new().with_numeric_totals();
        engine.seed("i", "a", json!({}), None);
        let numeric = engine.search(search("i", json!({}))).await.unwrap();
        assert_eq!(numeric.hits.total, TotalHits::Count(1));
    }

    #[tokio::test]
    async fn test_search_missing_index() {
        let engine = InMemorySearchEngine::new();
        let err = engine.search(search("nope", json!({}))).await.unwrap_err();
        assert_eq!(err, IndexError::IndexNotFound("nope".into()));
    }

    #[tokio::test]
    async fn test_paging_and_sort() {
        let engine = InMemorySearchEngine::new();
        for (id, n) in [("a", 3), ("b", 1), ("c", 2)] {
            engine.seed("i", id, json!({"n": n}), None);
        }
        let response = engine
            .search(search("i", json!({"sort": [{"n": {"order": "desc"}}], "from": 1, "size": 1})))
            .await
            .unwrap();
        assert_eq!(response.hits.total.value(), 3);
        assert_eq!(response.hits.hits.len(), 1);
        assert_eq!(response.hits.hits[0].id, "c");
    }

    #[tokio::test]
    async fn test_highlight() {
        let engine = InMemorySearchEngine::new();
        engine.seed("i", "a", json!({"title": "Rust in Action"}), None);
        let response = engine
            .search(search(
                "i",
                json!({"query": {"match": {"title": "rust"}}, "highlight": {"fields": {"title": {}}}}),
            ))
            .await
            .unwrap();
        assert_eq!(
            response.hits.hits[0].highlight,
            Some(json!({"title": ["<em>Rust</em> in Action"]}))
        );
    }

    #[tokio::test]
    async fn test_bool_term_and_ids() {
        let engine = InMemorySearchEngine::new();
        engine.seed("i", "a", json!({"tag": "x", "n": 1}), None);
        engine.seed("i", "b", json!({"tag": "x", "n": 2}), None);
        engine.seed("i", "c", json!({"tag": "y", "n": 3}), None);

        let count = engine
            .count("i", json!({"bool": {"must": [{"term": {"tag": "x"}}], "must_not": {"ids": {"values": ["a"]}}}}))
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_bulk_partial_failure_and_transport_failure() {
        let engine = InMemorySearchEngine::new();
        engine.fail_id("bad", "mapper_parsing_exception");

        let response = engine
            .bulk(vec![
                BulkInstruction::index("i", "ok", json!({"a": 1}), None),
                BulkInstruction::index("i", "bad", json!({"a": 2}), None),
                BulkInstruction::delete("i", "missing", None),
            ])
            .await
            .unwrap();
        assert!(response.errors);
        assert_eq!(response.failures().count(), 1);
        assert_eq!(response.items[2].status, 404);
        assert!(engine.get("i", "ok").is_some());

        engine.fail_next_bulk();
        assert!(engine.bulk(vec![]).await.is_err());
        assert!(engine.bulk(vec![]).await.is_ok());
        assert_eq!(engine.bulk_call_count(), 3);
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let engine = InMemorySearchEngine::new();
        engine.seed("i", "a", json!({}), Some("r".into()));
        assert_eq!(engine.routing_of("i", "a").as_deref(), Some("r"));

        engine.delete("i", "a", Some("r")).await.unwrap();
        assert!(engine.delete("i", "a", None).await.unwrap_err().is_not_found());
        assert_eq!(engine.delete_calls(), 2);
    }

    #[tokio::test]
    async fn test_create_index_and_mapping() {
        let engine = InMemorySearchEngine::new();
        assert!(!engine.index_exists("i").await.unwrap());
        engine.create_index("i", Some(json!({"number_of_shards": 1}))).await.unwrap();
        assert!(engine.create_index("i", None).await.is_err());

        engine.put_mapping("i", json!({"properties": {"a": {"type": "text"}}})).await.unwrap();
        engine.put_mapping("i", json!({"properties": {"b": {"type": "date"}}})).await.unwrap();
        assert_eq!(
            engine.mapping("i").unwrap(),
            json!({"properties": {"a": {"type": "text"}, "b": {"type": "date"}}})
        );
        assert!(engine.put_mapping("other", json!({})).await.is_err());
    }

    #[tokio::test]
    async fn test_store_find_by_ids_order_sort_select() {
        let store = InMemoryDocumentStore::new("posts");
        store.insert(Document::new("a").with("rank", 2).with("title", "A"));
        store.insert(Document::new("b").with("rank", 3).with("title", "B"));
        store.insert(Document::new("c").with("rank", 1).with("title", "C"));

        let ids = vec!["c".to_string(), "a".to_string()];
        let natural = store.find_by_ids(&ids, &HydrateOptions::default()).await.unwrap();
        let natural_ids: Vec<String> = natural.iter().map(Document::id_string).collect();
        assert_eq!(natural_ids, vec!["a", "c"]);

        let options = HydrateOptions {
            sort: Some(vec![SortField::desc("rank")]),
            select: Some(vec!["rank".into()]),
            ..Default::default()
        };
        let sorted = store.find_by_ids(&["a".into(), "b".into(), "c".into()], &options).await.unwrap();
        let sorted_ids: Vec<String> = sorted.iter().map(Document::id_string).collect();
        assert_eq!(sorted_ids, vec!["b", "a", "c"]);
        assert!(sorted[0].get("title").is_none());
        assert_eq!(store.find_calls(), 2);
        assert_eq!(store.last_find().unwrap().1, options);
    }

    #[tokio::test]
    async fn test_store_stream_filter_and_failure() {
        let store = InMemoryDocumentStore::new("posts");
        for i in 0..5 {
            store.insert(Document::new(i.to_string()).with("even", i % 2 == 0));
        }

        let evens: Vec<Document> = store
            .stream(Some(json!({"even": true})), 2)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(evens.len(), 3);

        store.fail_cursor_after(2);
        let results: Vec<Result<Document, IndexError>> = store.stream(None, 10).collect().await;
        assert_eq!(results.len(), 3);
        assert!(results[2].is_err());
    }

    #[tokio::test]
    async fn test_store_save_and_populate() {
        let store = InMemoryDocumentStore::new("posts");
        let author = Document::new(ObjectId::from_bytes([1; 12])).with("name", "Ada");
        store.link(author.clone());

        let post = Document::new("p").with("author", author.id().clone());
        store.save(&post).await.unwrap();
        assert_eq!(store.save_calls(), 1);

        let populated = store.populate(post, &["author".into()]).await.unwrap();
        assert_eq!(populated.get("author.name"), Some(&DocValue::from("Ada")));

        store.fail_save("p");
        assert!(store.save(&populated).await.is_err());
    }
}
