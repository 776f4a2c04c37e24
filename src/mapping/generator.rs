// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Schema → mapping generation.
//!
//! Rules, applied per schema level:
//! - `_id` is dropped at the root and kept inside sub-documents.
//! - If any field at the level is explicitly indexed, only explicitly indexed
//!   fields are emitted, plus sub-documents (which filter independently).
//! - Virtual fields are never emitted; mixed fields carry no type.
//! - Arrays of primitives flatten to the element mapping; arrays of
//!   sub-documents recurse and keep any declared `nested` type.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use super::FieldMapping;
use crate::schema::{Directives, FieldDef, FieldKind, Schema};

/// Mapping generator with an opt-in cache keyed by schema identity.
#[derive(Debug, Default)]
pub struct MappingGenerator {
    cache: DashMap<u64, Arc<FieldMapping>>,
}

impl MappingGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate the mapping for `schema`.
    ///
    /// With `use_cache`, the first result for a schema is stored and the same
    /// `Arc` is returned on later cached calls. Without it, every call builds
    /// a fresh mapping.
    pub fn generate(&self, schema: &Schema, use_cache: bool) -> Arc<FieldMapping> {
        if !use_cache {
            return Arc::new(generate_mapping(schema));
        }
        self.cache
            .entry(schema.id())
            .or_insert_with(|| {
                debug!(schema = schema.id(), "Caching generated mapping");
                Arc::new(generate_mapping(schema))
            })
            .clone()
    }

    /// Forget a cached mapping.
    pub fn invalidate(&self, schema: &Schema) -> bool {
        self.cache.remove(&schema.id()).is_some()
    }

    #[must_use]
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }
}

/// Build a mapping for `schema` without caching.
#[must_use]
pub fn generate_mapping(schema: &Schema) -> FieldMapping {
    FieldMapping::object(level_properties(schema, 0, None))
}

/// Lower-case a driver type name and map it onto an engine type. `None`
/// means untyped.
#[must_use]
pub fn normalize_type(driver_type: &str) -> Option<String> {
    let lower = driver_type.to_lowercase();
    let generic = match lower.as_str() {
        "objectid" => "string",
        other => other,
    };
    match generic {
        "string" => Some("text"),
        "number" => Some("double"),
        "mixed" => None,
        other => Some(other),
    }
    .map(str::to_string)
}

fn level_properties(
    schema: &Schema,
    depth: usize,
    selection: Option<&[String]>,
) -> BTreeMap<String, FieldMapping> {
    let explicit = schema.has_explicit();
    let mut properties = BTreeMap::new();

    for (name, def) in schema.fields() {
        if def.virtual_field || (name == "_id" && depth == 0) {
            continue;
        }
        if selection.is_some_and(|sel| !sel.iter().any(|s| s == name)) {
            continue;
        }
        if def.directives.indexed == Some(false) {
            continue;
        }

        let included = def.directives.indexed == Some(true);
        let structural = def.is_structural();
        if explicit && !included && !structural {
            continue;
        }

        let mapping = field_mapping(def, depth);
        // Traversed-only sub-documents that end up empty are left out.
        if explicit && !included && mapping.properties.as_ref().is_some_and(BTreeMap::is_empty) {
            continue;
        }
        properties.insert(name.to_string(), mapping);
    }

    properties
}

fn field_mapping(def: &FieldDef, depth: usize) -> FieldMapping {
    let mut mapping = match &def.kind {
        FieldKind::Object(sub) => FieldMapping::object(level_properties(sub, depth + 1, None)),
        FieldKind::Reference {
            schema: Some(sub),
            select,
            ..
        } => FieldMapping::object(level_properties(sub, depth + 1, select.as_deref())),
        FieldKind::Array(element) => {
            let mut mapping = field_mapping(element, depth);
            mapping.array = true;
            mapping
        }
        kind => FieldMapping::leaf(normalize_type(kind.type_name()).as_deref()),
    };
    apply_directives(&mut mapping, &def.directives);
    mapping
}

fn apply_directives(mapping: &mut FieldMapping, directives: &Directives) {
    if let Some(field_type) = &directives.field_type {
        mapping.field_type = Some(field_type.clone());
        if !matches!(field_type.as_str(), "object" | "nested") {
            mapping.properties = None;
        }
    }
    for (name, value) in &directives.options {
        mapping.options.insert(name.clone(), value.clone());
    }
    for (name, sub) in &directives.fields {
        mapping.fields.insert(name.clone(), directive_mapping(sub));
    }
    if directives.cast.is_some() {
        mapping.cast = directives.cast.clone();
    }
}

/// Mapping built from directives alone (multi-field sub-definitions).
fn directive_mapping(directives: &Directives) -> FieldMapping {
    let mut mapping = FieldMapping::default();
    apply_directives(&mut mapping, directives);
    mapping
}
