// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-model capabilities supplied as code: filter, routing, transform and
//! custom serializer.
//!
//! Each is a single-method trait with a blanket impl for closures, so either
//! a plain closure or a named type works. Implementations are expected to be
//! total; their panics are not caught.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::document::Document;
use crate::mapping::FieldMapping;

/// Documents for which this returns `true` are kept out of the index.
pub trait DocumentFilter: Send + Sync {
    fn excludes(&self, doc: &Document) -> bool;
}

impl<F> DocumentFilter for F
where
    F: Fn(&Document) -> bool + Send + Sync,
{
    fn excludes(&self, doc: &Document) -> bool {
        self(doc)
    }
}

/// Shard routing key computed from a document's plain-object form. The same
/// function is applied to stored sources when truncating.
pub trait RoutingKey: Send + Sync {
    fn routing(&self, source: &Value) -> Option<String>;
}

impl<F> RoutingKey for F
where
    F: Fn(&Value) -> Option<String> + Send + Sync,
{
    fn routing(&self, source: &Value) -> Option<String> {
        self(source)
    }
}

/// Rewrites the serialized body before it is sent.
pub trait BodyTransform: Send + Sync {
    fn transform(&self, body: Value, doc: &Document) -> Value;
}

impl<F> BodyTransform for F
where
    F: Fn(Value, &Document) -> Value + Send + Sync,
{
    fn transform(&self, body: Value, doc: &Document) -> Value {
        self(body, doc)
    }
}

/// Replaces the default mapping-driven serializer.
pub trait CustomSerializer: Send + Sync {
    fn serialize(&self, doc: &Document, mapping: &FieldMapping) -> Value;
}

impl<F> CustomSerializer for F
where
    F: Fn(&Document, &FieldMapping) -> Value + Send + Sync,
{
    fn serialize(&self, doc: &Document, mapping: &FieldMapping) -> Value {
        self(doc, mapping)
    }
}

#[derive(Clone, Default)]
pub struct ModelHooks {
    pub filter: Option<Arc<dyn DocumentFilter>>,
    pub routing: Option<Arc<dyn RoutingKey>>,
    pub transform: Option<Arc<dyn BodyTransform>>,
    pub serializer: Option<Arc<dyn CustomSerializer>>,
}

impl ModelHooks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn filter(mut self, filter: impl DocumentFilter + 'static) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    #[must_use]
    pub fn routing(mut self, routing: impl RoutingKey + 'static) -> Self {
        self.routing = Some(Arc::new(routing));
        self
    }

    #[must_use]
    pub fn transform(mut self, transform: impl BodyTransform + 'static) -> Self {
        self.transform = Some(Arc::new(transform));
        self
    }

    #[must_use]
    pub fn serializer(mut self, serializer: impl CustomSerializer + 'static) -> Self {
        self.serializer = Some(Arc::new(serializer));
        self
    }

    #[must_use]
    pub fn excludes(&self, doc: &Document) -> bool {
        self.filter.as_ref().is_some_and(|f| f.excludes(doc))
    }

    #[must_use]
    pub fn routing_for(&self, source: &Value) -> Option<String> {
        self.routing.as_ref().and_then(|r| r.routing(source))
    }
}

impl fmt::Debug for ModelHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHooks")
            .field("filter", &self.filter.is_some())
            .field("routing", &self.routing.is_some())
            .field("transform", &self.transform.is_some())
            .field("serializer", &self.serializer.is_some())
            .finish()
    }
}
