// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Bulk buffer for index/delete instructions.
//!
//! The [`BulkBuffer`] collects [`BulkInstruction`]s and reports when the size
//! threshold is reached. The delay threshold is driven by the owner (a timer
//! armed on the first append), see `coordinator::flush`.
//!
//! # Example
//!
//! ```
//! use search_sync::{BulkBuffer, BulkConfig, BulkInstruction, FlushReason};
//! use serde_json::json;
//!
//! let config = BulkConfig { size: 2, delay_ms: 100, batch: 50 };
//! let mut buffer = BulkBuffer::new(config);
//!
//! assert!(buffer.push(BulkInstruction::delete("posts", "1", None)).is_none());
//! let reason = buffer.push(BulkInstruction::index("posts", "2", json!({"t": 1}), None));
//! assert_eq!(reason, Some(FlushReason::Size));
//!
//! let batch = buffer.take();
//! assert_eq!(batch.len(), 2);
//! assert!(buffer.is_empty());
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

/// Why a batch left the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// Size threshold reached
    Size,
    /// Delay elapsed since the first pending instruction
    Delay,
    /// Manual flush requested
    Manual,
    /// Shutdown flush
    Shutdown,
}

impl FlushReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FlushReason::Size => "size",
            FlushReason::Delay => "delay",
            FlushReason::Manual => "manual",
            FlushReason::Shutdown => "shutdown",
        }
    }
}

/// Bulk settings for one model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkConfig {
    /// Flush once this many instructions are pending
    #[serde(default = "default_bulk_size")]
    pub size: usize,
    /// Flush this many milliseconds after the first pending instruction
    #[serde(default = "default_bulk_delay_ms")]
    pub delay_ms: u64,
    /// Cursor batch size used when streaming a collection
    #[serde(default = "default_bulk_batch")]
    pub batch: usize,
}

fn default_bulk_size() -> usize { 1000 }
fn default_bulk_delay_ms() -> u64 { 1000 }
fn default_bulk_batch() -> usize { 50 }

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            size: default_bulk_size(),
            delay_ms: default_bulk_delay_ms(),
            batch: default_bulk_batch(),
        }
    }
}

impl BulkConfig {
    /// Batch-friendly settings applied while synchronizing or truncating.
    #[must_use]
    pub fn batch_friendly() -> Self {
        Self {
            size: 1000,
            delay_ms: 1000,
            batch: 100,
        }
    }

    #[must_use]
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkAction {
    Index,
    Delete,
}

/// One bulk operation: descriptor plus optional body.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkInstruction {
    pub action: BulkAction,
    pub index: String,
    pub id: String,
    pub routing: Option<String>,
    pub body: Option<Value>,
}

impl BulkInstruction {
    pub fn index(
        index: impl Into<String>,
        id: impl Into<String>,
        body: Value,
        routing: Option<String>,
    ) -> Self {
        Self {
            action: BulkAction::Index,
            index: index.into(),
            id: id.into(),
            routing,
            body: Some(body),
        }
    }

    pub fn delete(index: impl Into<String>, id: impl Into<String>, routing: Option<String>) -> Self {
        Self {
            action: BulkAction::Delete,
            index: index.into(),
            id: id.into(),
            routing,
            body: None,
        }
    }

    /// Bulk API lines: the action descriptor, then the body for index actions.
    #[must_use]
    pub fn to_lines(&self) -> Vec<Value> {
        let mut descriptor = json!({"_index": self.index, "_id": self.id});
        if let Some(routing) = &self.routing {
            descriptor["routing"] = Value::String(routing.clone());
        }
        let action = match self.action {
            BulkAction::Index => "index",
            BulkAction::Delete => "delete",
        };
        let mut lines = vec![json!({ action: descriptor })];
        if let Some(body) = &self.body {
            lines.push(body.clone());
        }
        lines
    }
}

/// Render instructions as an NDJSON bulk request body.
#[must_use]
pub fn to_ndjson(instructions: &[BulkInstruction]) -> String {
    let mut out = String::new();
    for line in instructions.iter().flat_map(BulkInstruction::to_lines) {
        out.push_str(&line.to_string());
        out.push('\n');
    }
    out
}

/// Pending instructions plus the settings that decide when they go out.
#[derive(Debug)]
pub struct BulkBuffer {
    config: BulkConfig,
    pending: Vec<BulkInstruction>,
}

impl BulkBuffer {
    #[must_use]
    pub fn new(config: BulkConfig) -> Self {
        Self {
            config,
            pending: Vec::new(),
        }
    }

    /// Append one instruction; returns `Size` once the threshold is reached.
    pub fn push(&mut self, instruction: BulkInstruction) -> Option<FlushReason> {
        self.pending.push(instruction);
        self.threshold()
    }

    /// Append several instructions at once.
    pub fn extend(&mut self, instructions: impl IntoIterator<Item = BulkInstruction>) -> Option<FlushReason> {
        self.pending.extend(instructions);
        self.threshold()
    }

    fn threshold(&self) -> Option<FlushReason> {
        (self.pending.len() >= self.config.size).then_some(FlushReason::Size)
    }

    /// Take everything pending and reset the buffer.
    pub fn take(&mut self) -> Vec<BulkInstruction> {
        let items = std::mem::take(&mut self.pending);
        if !items.is_empty() {
            debug!(count = items.len(), "Bulk buffer taken for flush");
        }
        items
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn config(&self) -> &BulkConfig {
        &self.config
    }

    /// Swap settings, returning the previous ones.
    pub fn replace_config(&mut self, config: BulkConfig) -> BulkConfig {
        std::mem::replace(&mut self.config, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(size: usize, delay_ms: u64) -> BulkConfig {
        BulkConfig { size, delay_ms, batch: 10 }
    }

    fn index_op(id: &str) -> BulkInstruction {
        BulkInstruction::index("idx", id, json!({"id": id}), None)
    }

    #[test]
    fn test_buffer_empty_initially() {
        let buffer = BulkBuffer::new(BulkConfig::default());
        assert!(buffer.is_empty());
        assert_eq!(buffer.len(), 0);
    }

    #[test]
    fn test_flush_on_size_threshold() {
        let mut buffer = BulkBuffer::new(config(3, 10_000));

        assert!(buffer.push(index_op("a")).is_none());
        assert!(buffer.push(index_op("b")).is_none());
        assert_eq!(buffer.push(index_op("c")), Some(FlushReason::Size));
    }

    #[test]
    fn test_extend_reports_threshold_once() {
        let mut buffer = BulkBuffer::new(config(2, 10_000));
        let reason = buffer.extend(vec![index_op("a"), index_op("b"), index_op("c")]);
        assert_eq!(reason, Some(FlushReason::Size));
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn test_take_resets_buffer() {
        let mut buffer = BulkBuffer::new(BulkConfig::default());
        buffer.push(index_op("a"));
        buffer.push(BulkInstruction::delete("idx", "b", None));

        let items = buffer.take();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].action, BulkAction::Delete);
        assert!(buffer.is_empty());
        assert!(buffer.take().is_empty());
    }

    #[test]
    fn test_insertion_order_across_indices() {
        let mut buffer = BulkBuffer::new(BulkConfig::default());
        buffer.push(BulkInstruction::delete("a", "1", None));
        buffer.push(BulkInstruction::delete("b", "2", None));
        buffer.push(BulkInstruction::delete("a", "3", None));

        let ids: Vec<String> = buffer.take().into_iter().map(|i| i.id).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_replace_config() {
        let mut buffer = BulkBuffer::new(config(5, 5));
        let previous = buffer.replace_config(BulkConfig::batch_friendly());
        assert_eq!(previous.size, 5);
        assert_eq!(buffer.config().size, 1000);
    }

    #[test]
    fn test_lines_and_ndjson() {
        let index = BulkInstruction::index("posts", "1", json!({"t": "a"}), Some("r1".into()));
        assert_eq!(
            index.to_lines(),
            vec![json!({"index": {"_index": "posts", "_id": "1", "routing": "r1"}}), json!({"t": "a"})]
        );

        let delete = BulkInstruction::delete("posts", "2", None);
        assert_eq!(delete.to_lines(), vec![json!({"delete": {"_index": "posts", "_id": "2"}})]);

        let body = to_ndjson(&[index, delete]);
        assert_eq!(body.lines().count(), 3);
        assert!(body.ends_with('\n'));
    }

    #[test]
    fn test_config_defaults_from_json() {
        let config: BulkConfig = serde_json::from_str(r#"{"size": 10}"#).unwrap();
        assert_eq!(config.size, 10);
        assert_eq!(config.delay_ms, 1000);
        assert_eq!(config.batch, 50);
    }
}
