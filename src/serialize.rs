// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Document → index body serialization.
//!
//! The body follows the mapping: only mapped fields are emitted, absent
//! values are omitted rather than null-filled, and leaves are normalized
//! (identifiers to hex text, dates to ISO text). A field with a cast gets the
//! cast's output verbatim.
//!
//! # Example
//!
//! ```
//! use search_sync::schema::{FieldDef, Schema};
//! use search_sync::{generate_mapping, serialize, Document};
//! use serde_json::json;
//!
//! let schema = Schema::builder()
//!     .field("title", FieldDef::string())
//!     .build();
//! let mapping = generate_mapping(&schema);
//!
//! let doc = Document::new("1").with("title", "Hi").with("unmapped", true);
//! assert_eq!(serialize(&doc, &mapping), json!({"title": "Hi"}));
//! ```

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::document::{format_date, DocValue, Document};
use crate::mapping::FieldMapping;

/// Serialize a document against a mapping.
///
/// Without mapped properties the document's plain-object form is used as-is.
#[must_use]
pub fn serialize(doc: &Document, mapping: &FieldMapping) -> Value {
    match &mapping.properties {
        Some(properties) => serialize_fields(properties, |name| doc.get(name)),
        None => doc.to_plain_json(),
    }
}

/// Serialize every document in order.
#[must_use]
pub fn serialize_many(docs: &[Document], mapping: &FieldMapping) -> Vec<Value> {
    docs.iter().map(|doc| serialize(doc, mapping)).collect()
}

/// Serialize one field value. `None` means "omit the field".
#[must_use]
pub fn serialize_value(value: Option<&DocValue>, mapping: &FieldMapping) -> Option<Value> {
    let value = match value {
        None | Some(DocValue::Null) if mapping.array => return Some(Value::Array(Vec::new())),
        None => return None,
        Some(value) => value,
    };

    if let DocValue::Array(items) = value {
        return Some(Value::Array(
            items
                .iter()
                .map(|item| serialize_element(item, mapping))
                .collect(),
        ));
    }

    Some(serialize_element(value, mapping))
}

fn serialize_element(value: &DocValue, mapping: &FieldMapping) -> Value {
    if let (Some(properties), DocValue::Object(object)) = (&mapping.properties, value) {
        return serialize_object(properties, object);
    }
    if let Some(cast) = &mapping.cast {
        return cast.apply(value);
    }
    normalize_leaf(value)
}

fn serialize_object(
    properties: &BTreeMap<String, FieldMapping>,
    object: &BTreeMap<String, DocValue>,
) -> Value {
    serialize_fields(properties, |name| object.get(name))
}

fn serialize_fields<'a>(
    properties: &BTreeMap<String, FieldMapping>,
    lookup: impl Fn(&str) -> Option<&'a DocValue>,
) -> Value {
    let mut body = Map::new();
    for (name, field_mapping) in properties {
        if let Some(value) = serialize_value(lookup(name), field_mapping) {
            body.insert(name.clone(), value);
        }
    }
    Value::Object(body)
}

/// Identifier → hex text, date → ISO text; everything else passes through.
fn normalize_leaf(value: &DocValue) -> Value {
    match value {
        DocValue::ObjectId(id) => Value::String(id.to_hex()),
        DocValue::Date(date) => Value::String(format_date(date)),
        other => other.to_json(),
    }
}
