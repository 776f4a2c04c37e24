// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Engine search responses and their normalized form.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::hydrate::HydratedHit;

/// `hits.total`: a bare number on older engines, `{value, relation}` on newer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TotalHits {
    Count(u64),
    Detailed {
        value: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        relation: Option<String>,
    },
}

impl TotalHits {
    #[must_use]
    pub fn value(&self) -> u64 {
        match self {
            TotalHits::Count(n) => *n,
            TotalHits::Detailed { value, .. } => *value,
        }
    }
}

impl Default for TotalHits {
    fn default() -> Self {
        TotalHits::Count(0)
    }
}

/// One search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    #[serde(rename = "_index", default)]
    pub index: String,
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_score", default)]
    pub score: Option<f64>,
    #[serde(rename = "_routing", default, skip_serializing_if = "Option::is_none")]
    pub routing: Option<String>,
    #[serde(rename = "_source", default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlight: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<Vec<Value>>,
}

impl Hit {
    pub fn new(index: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            doc_type: None,
            id: id.into(),
            score: None,
            routing: None,
            source: None,
            highlight: None,
            sort: None,
        }
    }

    /// Hit metadata as JSON, without `_source` unless `keep_source`.
    #[must_use]
    pub fn metadata(&self, keep_source: bool) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if !keep_source {
            if let Value::Object(map) = &mut value {
                map.remove("_source");
            }
        }
        value
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HitsEnvelope {
    #[serde(default)]
    pub total: TotalHits,
    #[serde(default)]
    pub max_score: Option<f64>,
    #[serde(default)]
    pub hits: Vec<Hit>,
}

/// Raw engine response body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub took: u64,
    #[serde(default)]
    pub timed_out: bool,
    #[serde(default)]
    pub hits: HitsEnvelope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregations: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggest: Option<Value>,
}

/// Search results handed to callers.
///
/// `total` is always a plain count; `raw_total` keeps whatever shape the
/// engine returned. `hydrated` is set when hydration ran.
#[derive(Debug, Clone, Default)]
pub struct SearchResults {
    pub took: u64,
    pub timed_out: bool,
    pub total: u64,
    pub raw_total: TotalHits,
    pub max_score: Option<f64>,
    pub hits: Vec<Hit>,
    pub hydrated: Option<Vec<HydratedHit>>,
    pub aggregations: Option<Value>,
    pub suggest: Option<Value>,
}

impl From<SearchResponse> for SearchResults {
    fn from(response: SearchResponse) -> Self {
        Self {
            took: response.took,
            timed_out: response.timed_out,
            total: response.hits.total.value(),
            raw_total: response.hits.total,
            max_score: response.hits.max_score,
            hits: response.hits.hits,
            hydrated: None,
            aggregations: response.aggregations,
            suggest: response.suggest,
        }
    }
}

impl SearchResults {
    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        self.hits.iter().map(|h| h.id.as_str()).collect()
    }
}
