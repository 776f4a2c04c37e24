// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Search index mappings.
//!
//! ```text
//! Schema (FieldDef tree)
//!     ↓  MappingGenerator::generate
//! FieldMapping { properties: { title: {type: text, boost: 2}, ... } }
//!     ↓  serialize()          ↓  to_json()
//! index body             PUT _mapping
//! ```

mod generator;

pub use generator::{generate_mapping, normalize_type, MappingGenerator};

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::schema::Cast;

/// Field mapping node. The root node has only `properties`.
///
/// `cast` and `array` steer serialization and are never sent to the engine.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FieldMapping {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub field_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, FieldMapping>>,
    /// Multi-field sub-mappings.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, FieldMapping>,
    #[serde(flatten)]
    pub options: BTreeMap<String, Value>,
    #[serde(skip)]
    pub cast: Option<Cast>,
    #[serde(skip)]
    pub array: bool,
}

impl FieldMapping {
    #[must_use]
    pub fn leaf(field_type: Option<&str>) -> Self {
        Self {
            field_type: field_type.map(str::to_string),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn object(properties: BTreeMap<String, FieldMapping>) -> Self {
        Self {
            properties: Some(properties),
            ..Self::default()
        }
    }

    /// `object` when the node has sub-fields and no override.
    #[must_use]
    pub fn effective_type(&self) -> Option<&str> {
        match (&self.field_type, &self.properties) {
            (Some(t), _) => Some(t),
            (None, Some(_)) => Some("object"),
            (None, None) => None,
        }
    }

    #[must_use]
    pub fn property(&self, name: &str) -> Option<&FieldMapping> {
        self.properties.as_ref()?.get(name)
    }

    /// Engine-facing JSON.
    #[must_use]
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Deep-merge `overrides` into `base`. Objects merge key by key, anything else
/// replaces.
pub fn merge_json(base: &mut Value, overrides: &Value) {
    match (base, overrides) {
        (Value::Object(base_map), Value::Object(over_map)) => {
            for (key, value) in over_map {
                match base_map.get_mut(key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (slot, value) => *slot = value.clone(),
    }
}
