// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Search, count, refresh and mapping management.

use serde_json::{json, Value};
use tracing::{debug, info, instrument};

use crate::mapping::merge_json;
use crate::metrics::{self, LatencyTimer};
use crate::search::{build_search_body, hydrate, Attachments, SearchOptions, SearchResults};
use crate::storage::traits::{IndexError, SearchRequest};

use super::ModelIndexer;

impl ModelIndexer {
    /// Search with a query clause; wrapped as `{"query": query}`.
    pub async fn search(&self, query: Value, options: SearchOptions) -> Result<SearchResults, IndexError> {
        self.es_search(json!({ "query": query }), options).await
    }

    /// Search with a full request body, hydrating when asked to (or when the
    /// model always hydrates).
    pub async fn es_search(&self, body: Value, options: SearchOptions) -> Result<SearchResults, IndexError> {
        let _timer = LatencyTimer::new("search");
        let index = self.target_index(options.index.as_deref());
        let request = SearchRequest {
            index: index.clone(),
            body: build_search_body(body, &options),
            routing: options.routing.clone(),
        };

        let response = self.client.search(request).await.inspect_err(|_| {
            metrics::record_operation(&index, "search", "error");
        })?;
        let mut results = SearchResults::from(response);
        metrics::record_operation(&index, "search", "success");
        metrics::record_search_results(results.hits.len());

        let (always_hydrate, default_options) = {
            let config = self.config.read();
            (config.always_hydrate, config.hydrate_options.clone())
        };
        if options.hydrate.unwrap_or(always_hydrate) {
            let hydrate_options = options.hydrate_options.clone().unwrap_or(default_options);
            let attachments = Attachments {
                highlight: options.highlight.is_some(),
                es_results: options.hydrate_with_es_results,
            };
            let hydrated = hydrate(self.store.as_ref(), &results.hits, &hydrate_options, attachments).await?;
            metrics::record_hydration(results.hits.len(), hydrated.len());
            results.hydrated = Some(hydrated);
        }

        debug!(index = %index, total = results.total, hits = results.hits.len(), "Search complete");
        Ok(results)
    }

    /// Count matches; match-all when no query is given.
    pub async fn es_count(&self, query: Option<Value>) -> Result<u64, IndexError> {
        let query = query.unwrap_or_else(|| json!({"match_all": {}}));
        self.client.count(&self.index_name(), query).await
    }

    pub async fn refresh(&self) -> Result<(), IndexError> {
        self.client.refresh(&self.index_name()).await
    }

    /// Create the index when absent, then put the generated mapping with any
    /// configured `properties` overrides merged on top. Returns the mapping
    /// that was sent.
    #[instrument(skip(self, settings), fields(index = %self.index_name()))]
    pub async fn create_mapping(&self, settings: Option<Value>) -> Result<Value, IndexError> {
        let index = self.index_name();
        let mut mapping = self.mapping().to_json();
        let overrides = self.config.read().properties.clone();
        if let Some(overrides) = overrides {
            merge_json(&mut mapping, &json!({ "properties": overrides }));
        }

        if !self.client.index_exists(&index).await? {
            self.client.create_index(&index, settings).await?;
            info!(index = %index, "Index created");
        }
        self.client.put_mapping(&index, mapping.clone()).await?;
        info!(index = %index, "Mapping applied");
        Ok(mapping)
    }
}
