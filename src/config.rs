// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-model indexing configuration.
//!
//! # Example
//!
//! ```
//! use search_sync::{BulkConfig, IndexerConfig};
//!
//! // Minimal config (uses defaults): immediate, non-bulk indexing
//! let config = IndexerConfig::default();
//! assert!(config.bulk.is_none());
//! assert!(config.index_automatically);
//!
//! // Bulk indexing into a named index
//! let config = IndexerConfig {
//!     index: Some("blog-posts".into()),
//!     bulk: Some(BulkConfig { size: 100, delay_ms: 200, batch: 50 }),
//!     ..Default::default()
//! };
//!
//! // Or from JSON
//! let config = IndexerConfig::from_json(r#"{"index": "posts", "always_hydrate": true}"#).unwrap();
//! assert!(config.always_hydrate);
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::batching::BulkConfig;
use crate::resilience::retry::RetryConfig;
use crate::storage::traits::IndexError;

/// Configuration for one indexed model.
///
/// Closure capabilities (filter, routing, transform, custom serializer) are
/// not data and live in [`crate::ModelHooks`].
#[derive(Debug, Clone, Deserialize)]
pub struct IndexerConfig {
    /// Index name; defaults to the lower-cased collection name
    #[serde(default)]
    pub index: Option<String>,

    /// Index on save / unindex on remove from lifecycle hooks
    #[serde(default = "default_true")]
    pub index_automatically: bool,

    /// Bulk settings; `None` means every operation is sent immediately
    #[serde(default)]
    pub bulk: Option<BulkConfig>,

    /// Reference paths populated before serialization
    #[serde(default)]
    pub populate: Vec<String>,

    /// Hydrate every search unless the call says otherwise
    #[serde(default)]
    pub always_hydrate: bool,

    /// Default hydration options
    #[serde(default)]
    pub hydrate_options: HydrateOptions,

    /// Refresh the index after each immediate index call
    #[serde(default)]
    pub force_index_refresh: bool,

    /// Mapping overrides merged over the generated properties
    #[serde(default)]
    pub properties: Option<Value>,

    /// Re-save documents while synchronizing (otherwise index directly)
    #[serde(default = "default_true")]
    pub save_on_synchronize: bool,

    /// Cache the generated mapping per schema
    #[serde(default)]
    pub cache_mapping: bool,

    #[serde(default)]
    pub synchronize: SynchronizeConfig,

    #[serde(default)]
    pub truncate: TruncateConfig,

    /// Attempts for an immediate delete before reporting a soft failure
    #[serde(default = "default_unindex_attempts")]
    pub unindex_attempts: usize,

    #[serde(default = "default_unindex_retry_delay_ms")]
    pub unindex_retry_delay_ms: u64,
}

fn default_true() -> bool { true }
fn default_unindex_attempts() -> usize { 3 }
fn default_unindex_retry_delay_ms() -> u64 { 500 }

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            index: None,
            index_automatically: true,
            bulk: None,
            populate: Vec::new(),
            always_hydrate: false,
            hydrate_options: HydrateOptions::default(),
            force_index_refresh: false,
            properties: None,
            save_on_synchronize: true,
            cache_mapping: false,
            synchronize: SynchronizeConfig::default(),
            truncate: TruncateConfig::default(),
            unindex_attempts: default_unindex_attempts(),
            unindex_retry_delay_ms: default_unindex_retry_delay_ms(),
        }
    }
}

impl IndexerConfig {
    /// Parse from a JSON document.
    pub fn from_json(raw: &str) -> Result<Self, IndexError> {
        serde_json::from_str(raw).map_err(|e| IndexError::Config(e.to_string()))
    }

    #[must_use]
    pub fn unindex_retry(&self) -> RetryConfig {
        RetryConfig::unindex(self.unindex_attempts, self.unindex_retry_delay_ms)
    }
}

/// Settings for full-collection synchronization.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SynchronizeConfig {
    /// Bulk settings in force for the duration of the run
    #[serde(default = "BulkConfig::batch_friendly")]
    pub bulk: BulkConfig,
    /// Documents processed at once; 1 pauses intake per document
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// How often the drain condition is polled
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_concurrency() -> usize { 1 }
fn default_poll_interval_ms() -> u64 { 10 }

impl Default for SynchronizeConfig {
    fn default() -> Self {
        Self {
            bulk: BulkConfig::batch_friendly(),
            concurrency: default_concurrency(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Settings for truncation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TruncateConfig {
    /// Keep deleting pages until the index is empty; `false` sweeps one page
    #[serde(default = "default_true")]
    pub paginate: bool,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_page_size() -> usize { 1000 }

impl Default for TruncateConfig {
    fn default() -> Self {
        Self {
            paginate: true,
            page_size: default_page_size(),
        }
    }
}

/// Sort direction for database-side sorts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortField {
    pub field: String,
    #[serde(default)]
    pub order: SortOrder,
}

impl SortField {
    pub fn asc(field: impl Into<String>) -> Self {
        Self { field: field.into(), order: SortOrder::Asc }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self { field: field.into(), order: SortOrder::Desc }
    }
}

/// Options for the database query issued during hydration. Passed to the
/// document store verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HydrateOptions {
    #[serde(default)]
    pub lean: bool,
    #[serde(default)]
    pub select: Option<Vec<String>>,
    /// When set, the database order wins over search order
    #[serde(default)]
    pub sort: Option<Vec<SortField>>,
    #[serde(default)]
    pub populate: Vec<String>,
}
