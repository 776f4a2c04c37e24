// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Document schema trees.
//!
//! A [`Schema`] describes one document type: an ordered list of named
//! [`FieldDef`]s. Each field has a [`FieldKind`] (leaf type, embedded object,
//! array, or reference to another collection) and a set of engine
//! [`Directives`] that steer mapping generation.
//!
//! Directives can be given programmatically through the builder methods or
//! parsed from `es_`-prefixed annotations, the form a host ORM usually keeps
//! them in.
//!
//! # Example
//!
//! ```
//! use search_sync::schema::{FieldDef, Schema};
//!
//! let comment = Schema::builder()
//!     .field("text", FieldDef::string())
//!     .build();
//!
//! let post = Schema::builder()
//!     .field("title", FieldDef::string().indexed().boost(2.0))
//!     .field("comments", FieldDef::array(FieldDef::object(comment)))
//!     .build();
//!
//! assert!(post.has_explicit());
//! assert!(post.field("_id").is_some());
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::document::DocValue;

static SCHEMA_IDS: AtomicU64 = AtomicU64::new(1);

/// Prefix marking engine directives in raw annotations.
pub const DIRECTIVE_PREFIX: &str = "es_";

/// Per-field cast applied to the raw value before it goes into an index body.
#[derive(Clone)]
pub struct Cast(Arc<dyn Fn(&DocValue) -> Value + Send + Sync>);

impl Cast {
    pub fn new(f: impl Fn(&DocValue) -> Value + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    #[must_use]
    pub fn apply(&self, value: &DocValue) -> Value {
        (self.0)(value)
    }
}

impl fmt::Debug for Cast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cast(<fn>)")
    }
}

/// Engine directives attached to a field.
///
/// `options` holds every directive the generator copies through verbatim
/// (boost, analyzer, index, format, null_value, ...). Values are not
/// validated here; the engine rejects bad ones when the mapping is applied.
#[derive(Debug, Clone, Default)]
pub struct Directives {
    /// Explicit inclusion flag (`es_indexed`).
    pub indexed: Option<bool>,
    /// Type override (`es_type`), e.g. `keyword`, `nested`, `geo_point`.
    pub field_type: Option<String>,
    pub options: BTreeMap<String, Value>,
    /// Multi-field sub-definitions (`es_fields`).
    pub fields: BTreeMap<String, Directives>,
    pub cast: Option<Cast>,
}

impl Directives {
    /// Parse `es_`-prefixed annotations. Keys without the prefix are ignored.
    #[must_use]
    pub fn from_annotations(annotations: &Map<String, Value>) -> Self {
        let mut directives = Directives::default();
        for (key, value) in annotations {
            let Some(name) = key.strip_prefix(DIRECTIVE_PREFIX) else {
                continue;
            };
            match name {
                "indexed" => directives.indexed = Some(truthy(value)),
                "type" => match value {
                    Value::String(s) => directives.field_type = Some(s.clone()),
                    other => {
                        directives.options.insert("type".to_string(), other.clone());
                    }
                },
                "fields" => {
                    if let Value::Object(subs) = value {
                        for (sub_name, sub) in subs {
                            let sub = match sub {
                                Value::Object(m) => Directives::from_annotations(m),
                                _ => Directives::default(),
                            };
                            directives.fields.insert(sub_name.clone(), sub);
                        }
                    }
                }
                _ => {
                    directives.options.insert(name.to_string(), value.clone());
                }
            }
        }
        directives
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indexed.is_none()
            && self.field_type.is_none()
            && self.options.is_empty()
            && self.fields.is_empty()
            && self.cast.is_none()
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Shape of a field.
#[derive(Debug, Clone)]
pub enum FieldKind {
    String,
    Number,
    Date,
    Boolean,
    ObjectId,
    /// Untyped; values vary per document.
    Mixed,
    /// Embedded sub-document or nested object.
    Object(Arc<Schema>),
    /// Array of the element definition.
    Array(Box<FieldDef>),
    /// Reference to a document of another collection. With an attached
    /// `schema` the reference is mapped as that (populated) object,
    /// optionally restricted to `select`.
    Reference {
        collection: String,
        schema: Option<Arc<Schema>>,
        select: Option<Vec<String>>,
    },
}

impl FieldKind {
    /// Driver-style type name, before normalization.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldKind::String => "String",
            FieldKind::Number => "Number",
            FieldKind::Date => "Date",
            FieldKind::Boolean => "Boolean",
            FieldKind::ObjectId | FieldKind::Reference { .. } => "ObjectId",
            FieldKind::Mixed => "Mixed",
            FieldKind::Object(_) => "Embedded",
            FieldKind::Array(_) => "Array",
        }
    }
}

/// A field definition: kind, directives, and whether it is virtual.
#[derive(Debug, Clone)]
pub struct FieldDef {
    pub kind: FieldKind,
    pub directives: Directives,
    /// Computed field not backed by a stored path.
    pub virtual_field: bool,
}

impl FieldDef {
    #[must_use]
    pub fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            directives: Directives::default(),
            virtual_field: false,
        }
    }

    #[must_use]
    pub fn string() -> Self {
        Self::new(FieldKind::String)
    }

    #[must_use]
    pub fn number() -> Self {
        Self::new(FieldKind::Number)
    }

    #[must_use]
    pub fn date() -> Self {
        Self::new(FieldKind::Date)
    }

    #[must_use]
    pub fn boolean() -> Self {
        Self::new(FieldKind::Boolean)
    }

    #[must_use]
    pub fn object_id() -> Self {
        Self::new(FieldKind::ObjectId)
    }

    #[must_use]
    pub fn mixed() -> Self {
        Self::new(FieldKind::Mixed)
    }

    #[must_use]
    pub fn object(schema: Arc<Schema>) -> Self {
        Self::new(FieldKind::Object(schema))
    }

    #[must_use]
    pub fn array(element: FieldDef) -> Self {
        Self::new(FieldKind::Array(Box::new(element)))
    }

    pub fn reference(collection: impl Into<String>) -> Self {
        Self::new(FieldKind::Reference {
            collection: collection.into(),
            schema: None,
            select: None,
        })
    }

    /// Attach the referenced collection's schema (`es_schema`).
    #[must_use]
    pub fn with_schema(mut self, target: Arc<Schema>) -> Self {
        if let FieldKind::Reference { schema, .. } = &mut self.kind {
            *schema = Some(target);
        }
        self
    }

    /// Restrict a referenced schema to these sub-fields (`es_select`).
    #[must_use]
    pub fn select(mut self, fields: &[&str]) -> Self {
        if let FieldKind::Reference { select, .. } = &mut self.kind {
            *select = Some(fields.iter().map(|f| (*f).to_string()).collect());
        }
        self
    }

    #[must_use]
    pub fn indexed(mut self) -> Self {
        self.directives.indexed = Some(true);
        self
    }

    #[must_use]
    pub fn not_indexed(mut self) -> Self {
        self.directives.indexed = Some(false);
        self
    }

    #[must_use]
    pub fn es_type(mut self, field_type: impl Into<String>) -> Self {
        self.directives.field_type = Some(field_type.into());
        self
    }

    #[must_use]
    pub fn boost(self, boost: f64) -> Self {
        self.option("boost", Value::from(boost))
    }

    #[must_use]
    pub fn analyzer(self, analyzer: &str) -> Self {
        self.option("analyzer", Value::from(analyzer))
    }

    /// Any other directive, copied to the mapping as-is.
    #[must_use]
    pub fn option(mut self, name: impl Into<String>, value: Value) -> Self {
        self.directives.options.insert(name.into(), value);
        self
    }

    #[must_use]
    pub fn multi_field(mut self, name: impl Into<String>, sub: Directives) -> Self {
        self.directives.fields.insert(name.into(), sub);
        self
    }

    #[must_use]
    pub fn cast(mut self, f: impl Fn(&DocValue) -> Value + Send + Sync + 'static) -> Self {
        self.directives.cast = Some(Cast::new(f));
        self
    }

    /// Merge `es_`-prefixed annotations into the directives.
    #[must_use]
    pub fn annotations(mut self, annotations: &Value) -> Self {
        if let Value::Object(map) = annotations {
            let parsed = Directives::from_annotations(map);
            if parsed.indexed.is_some() {
                self.directives.indexed = parsed.indexed;
            }
            if parsed.field_type.is_some() {
                self.directives.field_type = parsed.field_type;
            }
            self.directives.options.extend(parsed.options);
            self.directives.fields.extend(parsed.fields);
        }
        self
    }

    #[must_use]
    pub fn virtual_field(mut self) -> Self {
        self.virtual_field = true;
        self
    }

    /// Sub-documents and arrays of sub-documents: traversed regardless of
    /// explicit inclusion at their own level.
    #[must_use]
    pub fn is_structural(&self) -> bool {
        match &self.kind {
            FieldKind::Object(_) => true,
            FieldKind::Reference { schema, .. } => schema.is_some(),
            FieldKind::Array(element) => element.is_structural(),
            _ => false,
        }
    }
}

/// An immutable document schema.
#[derive(Debug)]
pub struct Schema {
    id: u64,
    fields: Vec<(String, FieldDef)>,
}

impl Schema {
    /// Builder that declares the `_id` field up front.
    #[must_use]
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder {
            fields: vec![("_id".to_string(), FieldDef::object_id())],
        }
    }

    /// Process-unique identity, used as the mapping cache key.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldDef)> {
        self.fields.iter().map(|(name, def)| (name.as_str(), def))
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, def)| def)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Whether any field at this level is explicitly included.
    #[must_use]
    pub fn has_explicit(&self) -> bool {
        self.fields
            .iter()
            .any(|(_, def)| def.directives.indexed == Some(true))
    }
}

pub struct SchemaBuilder {
    fields: Vec<(String, FieldDef)>,
}

impl SchemaBuilder {
    /// Declare a field. Re-declaring a name replaces the earlier definition.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, def: FieldDef) -> Self {
        let name = name.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = def,
            None => self.fields.push((name, def)),
        }
        self
    }

    /// Drop the implicit `_id` (sub-documents declared with `_id: false`).
    #[must_use]
    pub fn without_id(mut self) -> Self {
        self.fields.retain(|(n, _)| n != "_id");
        self
    }

    #[must_use]
    pub fn build(self) -> Arc<Schema> {
        Arc::new(Schema {
            id: SCHEMA_IDS.fetch_add(1, Ordering::Relaxed),
            fields: self.fields,
        })
    }
}
