//! Property-based tests (fuzzing) for mapping, serialization and bulk plumbing.
//!
//! Uses proptest to generate random schemas, documents and inputs and checks
//! the invariants hold for all of them, and that nothing panics.
//!
//! Run with: `cargo test --test proptest_fuzz`

use std::collections::BTreeSet;

use proptest::prelude::*;
use serde_json::{json, Value};

use search_sync::schema::{FieldDef, Schema};
use search_sync::search::order_by_hits;
use search_sync::{
    generate_mapping, serialize, to_ndjson, BulkBuffer, BulkConfig, BulkInstruction, DocValue, Document, Hit,
    IndexerConfig, SearchOptions,
};

// =============================================================================
// Strategies for generating test data
// =============================================================================

/// Distinct field names, each flagged as explicitly indexed or not
fn fields_strategy() -> impl Strategy<Value = Vec<(String, bool)>> {
    prop::collection::btree_map("[a-z]{1,8}", any::<bool>(), 1..12).prop_map(|m| m.into_iter().collect())
}

/// Distinct document ids
fn ids_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_set("[a-f0-9]{1,6}", 0..30).prop_map(|s| s.into_iter().collect())
}

/// Generate arbitrary JSON values (including invalid structures)
fn arbitrary_json_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| Value::Number(n.into())),
        ".*".prop_map(Value::String),
    ];

    leaf.prop_recursive(
        4,  // depth
        64, // max nodes
        10, // items per collection
        |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..10).prop_map(Value::Array),
                prop::collection::hash_map(".*", inner, 0..10)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        },
    )
}

fn schema_from(fields: &[(String, bool)]) -> std::sync::Arc<Schema> {
    fields
        .iter()
        .fold(Schema::builder(), |builder, (name, indexed)| {
            let def = if *indexed { FieldDef::string().indexed() } else { FieldDef::string() };
            builder.field(name.clone(), def)
        })
        .build()
}

fn mapped_keys(schema: &Schema) -> BTreeSet<String> {
    generate_mapping(schema)
        .properties
        .map(|p| p.into_keys().collect())
        .unwrap_or_default()
}

// =============================================================================
// Mapping Properties
// =============================================================================

proptest! {
    /// With any explicit field, exactly the explicit fields are mapped;
    /// without one, every field is
    #[test]
    fn prop_explicit_inclusion(fields in fields_strategy()) {
        let schema = schema_from(&fields);
        let keys = mapped_keys(&schema);

        let explicit: BTreeSet<String> = fields.iter().filter(|(_, i)| *i).map(|(n, _)| n.clone()).collect();
        if explicit.is_empty() {
            let all: BTreeSet<String> = fields.iter().map(|(n, _)| n.clone()).collect();
            prop_assert_eq!(keys, all);
        } else {
            prop_assert_eq!(keys, explicit);
        }
    }

    /// The root identifier never reaches the mapping
    #[test]
    fn prop_root_id_never_mapped(fields in fields_strategy(), index_id in any::<bool>()) {
        let mut builder = Schema::builder();
        for (name, indexed) in &fields {
            let def = if *indexed { FieldDef::string().indexed() } else { FieldDef::string() };
            builder = builder.field(name.clone(), def);
        }
        let id_def = if index_id { FieldDef::object_id().indexed() } else { FieldDef::object_id() };
        let schema = builder.field("_id", id_def).build();

        prop_assert!(!mapped_keys(&schema).contains("_id"));
    }

    /// Mapping generation is deterministic for a given schema
    #[test]
    fn prop_mapping_stable(fields in fields_strategy()) {
        let schema = schema_from(&fields);
        prop_assert_eq!(generate_mapping(&schema).to_json(), generate_mapping(&schema).to_json());
    }
}

// =============================================================================
// Serialization Properties
// =============================================================================

proptest! {
    /// Serialized bodies only carry mapped fields
    #[test]
    fn prop_body_keys_subset_of_mapping(
        fields in fields_strategy(),
        extra in prop::collection::btree_map("[A-Z]{1,5}", ".{0,20}", 0..5),
    ) {
        let schema = schema_from(&fields);
        let mapping = generate_mapping(&schema);
        let keys = mapped_keys(&schema);

        let mut doc = Document::new("doc");
        for (name, _) in &fields {
            doc.set(name.clone(), format!("value of {name}"));
        }
        for (name, value) in &extra {
            doc.set(name.clone(), value.clone());
        }

        let body = serialize(&doc, &mapping);
        let body_keys: BTreeSet<String> = body.as_object().unwrap().keys().cloned().collect();
        prop_assert_eq!(body_keys, keys);
    }

    /// An absent or null array field serializes as an empty array
    #[test]
    fn prop_absent_array_is_empty(name in "[a-z]{1,8}", null in any::<bool>()) {
        let schema = Schema::builder()
            .field(name.clone(), FieldDef::array(FieldDef::string()))
            .build();
        let mapping = generate_mapping(&schema);

        let mut doc = Document::new("doc");
        if null {
            doc.set(name.clone(), DocValue::Null);
        }
        prop_assert_eq!(serialize(&doc, &mapping), json!({ name: [] }));
    }
}

// =============================================================================
// Hydration Ordering
// =============================================================================

proptest! {
    /// Hydrated documents follow hit order; ids without a document are skipped
    #[test]
    fn prop_order_by_hits(
        ids in ids_strategy(),
        missing in prop::collection::vec(any::<bool>(), 30),
        seed in any::<u64>(),
    ) {
        let hits: Vec<Hit> = ids.iter().map(|id| Hit::new("posts", id.as_str())).collect();

        let mut docs: Vec<Document> = ids
            .iter()
            .zip(&missing)
            .filter(|(_, gone)| !**gone)
            .map(|(id, _)| Document::new(id.as_str()))
            .collect();
        // Deterministic shuffle so store order differs from hit order
        if !docs.is_empty() {
            let rotate = (seed % docs.len() as u64) as usize;
            docs.rotate_left(rotate);
            docs.reverse();
        }

        let expected: Vec<String> = ids
            .iter()
            .zip(&missing)
            .filter(|(_, gone)| !**gone)
            .map(|(id, _)| id.clone())
            .collect();
        let ordered: Vec<String> = order_by_hits(&hits, docs).iter().map(Document::id_string).collect();
        prop_assert_eq!(ordered, expected);
    }
}

// =============================================================================
// Bulk Properties
// =============================================================================

proptest! {
    /// Index instructions take two lines, deletes one
    #[test]
    fn prop_ndjson_line_count(actions in prop::collection::vec(any::<bool>(), 0..50)) {
        let instructions: Vec<BulkInstruction> = actions
            .iter()
            .enumerate()
            .map(|(i, is_index)| {
                if *is_index {
                    BulkInstruction::index("posts", i.to_string(), json!({"n": i}), None)
                } else {
                    BulkInstruction::delete("posts", i.to_string(), None)
                }
            })
            .collect();

        let expected = actions.iter().map(|is_index| if *is_index { 2 } else { 1 }).sum::<usize>();
        prop_assert_eq!(to_ndjson(&instructions).lines().count(), expected);
    }

    /// Taking from the buffer returns everything pushed, once
    #[test]
    fn prop_buffer_take_drains(size in 1usize..20, pushes in 0usize..60) {
        let mut buffer = BulkBuffer::new(BulkConfig { size, delay_ms: 1000, batch: 10 });
        let mut taken = Vec::new();
        for i in 0..pushes {
            if buffer.push(BulkInstruction::delete("posts", i.to_string(), None)).is_some() {
                taken.extend(buffer.take());
            }
        }
        taken.extend(buffer.take());

        prop_assert!(buffer.is_empty());
        let ids: Vec<String> = taken.into_iter().map(|i| i.id).collect();
        let expected: Vec<String> = (0..pushes).map(|i| i.to_string()).collect();
        prop_assert_eq!(ids, expected);
    }
}

// =============================================================================
// Input Fuzz Tests
// =============================================================================

proptest! {
    /// Config parsing never panics on arbitrary JSON
    #[test]
    fn fuzz_config_from_arbitrary_json(value in arbitrary_json_strategy()) {
        let _ = IndexerConfig::from_json(&value.to_string());
    }

    /// Search option parsing never panics on arbitrary JSON
    #[test]
    fn fuzz_search_options_from_arbitrary_json(value in arbitrary_json_strategy()) {
        let _: Result<SearchOptions, _> = serde_json::from_value(value);
    }

    /// Documents built from arbitrary JSON never panic and keep their id
    #[test]
    fn fuzz_document_from_arbitrary_json(value in arbitrary_json_strategy()) {
        let doc = Document::from_json(&value);
        let _ = doc.to_plain_json();
        let _ = doc.id_string();
    }
}
