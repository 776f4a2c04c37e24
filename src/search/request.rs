// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-call search options and request body assembly.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::config::HydrateOptions;

/// Whether raw engine hit metadata is attached to hydrated documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EsResultMode {
    #[default]
    Off,
    /// Score, index and type, without `_source`
    Metadata,
    /// Metadata plus the raw `_source`
    MetadataWithSource,
}

/// Sort as a plain expression (`"date:desc,title"`) or structured clauses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SortSpec {
    Expression(String),
    Clauses(Vec<Value>),
}

impl SortSpec {
    /// Structured clauses for the request body.
    #[must_use]
    pub fn to_clauses(&self) -> Vec<Value> {
        match self {
            SortSpec::Clauses(clauses) => clauses.clone(),
            SortSpec::Expression(expr) => expr
                .split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(|part| match part.split_once(':') {
                    Some((field, order)) => json!({ field.trim(): {"order": order.trim()} }),
                    None => Value::String(part.to_string()),
                })
                .collect(),
        }
    }
}

/// Options recognized by `search` / `es_search`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    /// Overrides the model's `always_hydrate` when set
    pub hydrate: Option<bool>,
    /// Overrides the model's hydrate options when set
    pub hydrate_options: Option<HydrateOptions>,
    pub hydrate_with_es_results: EsResultMode,
    pub highlight: Option<Value>,
    pub suggest: Option<Value>,
    pub aggs: Option<Value>,
    pub min_score: Option<f64>,
    pub routing: Option<String>,
    pub sort: Option<SortSpec>,
    pub from: Option<u64>,
    pub size: Option<u64>,
    /// Overrides the model's index
    pub index: Option<String>,
}

impl SearchOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn hydrate(mut self, hydrate: bool) -> Self {
        self.hydrate = Some(hydrate);
        self
    }

    #[must_use]
    pub fn hydrate_options(mut self, options: HydrateOptions) -> Self {
        self.hydrate_options = Some(options);
        self
    }

    #[must_use]
    pub fn with_es_results(mut self, mode: EsResultMode) -> Self {
        self.hydrate_with_es_results = mode;
        self
    }

    #[must_use]
    pub fn highlight(mut self, highlight: Value) -> Self {
        self.highlight = Some(highlight);
        self
    }

    #[must_use]
    pub fn suggest(mut self, suggest: Value) -> Self {
        self.suggest = Some(suggest);
        self
    }

    #[must_use]
    pub fn aggs(mut self, aggs: Value) -> Self {
        self.aggs = Some(aggs);
        self
    }

    #[must_use]
    pub fn min_score(mut self, min_score: f64) -> Self {
        self.min_score = Some(min_score);
        self
    }

    #[must_use]
    pub fn routing(mut self, routing: impl Into<String>) -> Self {
        self.routing = Some(routing.into());
        self
    }

    #[must_use]
    pub fn sort(mut self, sort: SortSpec) -> Self {
        self.sort = Some(sort);
        self
    }

    #[must_use]
    pub fn page(mut self, from: u64, size: u64) -> Self {
        self.from = Some(from);
        self.size = Some(size);
        self
    }

    #[must_use]
    pub fn index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }
}

/// Merge per-call options into a raw request body. Keys set by the options
/// replace the same keys in the body.
#[must_use]
pub fn build_search_body(body: Value, options: &SearchOptions) -> Value {
    let mut map = match body {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("query".to_string(), other);
            map
        }
    };

    let mut set = |key: &str, value: Option<Value>| {
        if let Some(value) = value {
            map.insert(key.to_string(), value);
        }
    };
    set("highlight", options.highlight.clone());
    set("suggest", options.suggest.clone());
    set("aggs", options.aggs.clone());
    set("min_score", options.min_score.map(|s| json!(s)));
    set("sort", options.sort.as_ref().map(|s| Value::Array(s.to_clauses())));
    set("from", options.from.map(|v| json!(v)));
    set("size", options.size.map(|v| json!(v)));

    Value::Object(map)
}
