//! Tests for EntityCodec
//!
//! These tests verify:
//! - Key derivation (namespace, partial keys)
//! - Field encoding for every declared type
//! - Decoding back to equal instances
//! - Rejection of corrupt or mismatched stored entities
//! - Defaults and nullability on both directions
//! - Embedded maps, nested and empty

use std::collections::BTreeMap;

use bytes::Bytes;
use chrono::{TimeZone, Timelike, Utc};

use datastore_adapter::{
    AdapterError, Entity, EntityCodec, FieldDef, FieldType, FieldValue, Id, Key, ModelInstance,
    ModelMeta, Value,
};

// =============================================================================
// Helper Functions
// =============================================================================

fn everything_model() -> ModelMeta {
    ModelMeta::new("everything")
        .field(FieldDef::text("name"))
        .field(FieldDef::integer("count"))
        .field(FieldDef::float("ratio"))
        .field(FieldDef::boolean("flag"))
        .field(FieldDef::datetime("created"))
        .field(FieldDef::binary("payload"))
        .field(FieldDef::foreign_key("owner", "user").nullable())
        .field(FieldDef::list("scores", FieldType::Integer))
        .field(FieldDef::set("tags", FieldType::Text))
        .field(FieldDef::text("note").nullable())
}

fn full_instance() -> ModelInstance {
    ModelInstance::new("everything")
        .with_pk(7)
        .with("name", "widget")
        .with("count", 3i64)
        .with("ratio", 0.25)
        .with("flag", true)
        .with(
            "created",
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap(),
        )
        .with("payload", FieldValue::Binary(Bytes::from_static(b"\x00\x01\x02")))
        .with("owner", FieldValue::ForeignKey(Id::Int(11)))
        .with(
            "scores",
            FieldValue::List(vec![3i64.into(), 1i64.into(), 3i64.into()]),
        )
        .with("tags", FieldValue::List(vec!["a".into(), "b".into()]))
        .with("note", FieldValue::Null)
}

fn settings_model() -> ModelMeta {
    ModelMeta::new("profile")
        .field(FieldDef::text("name"))
        .field(FieldDef::embedded("settings"))
}

fn map(entries: Vec<(&str, FieldValue)>) -> FieldValue {
    FieldValue::Map(
        entries
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect(),
    )
}

// =============================================================================
// Key Tests
// =============================================================================

#[test]
fn test_derive_key_applies_namespace() {
    let codec = EntityCodec::new("tenant-a");
    let key = codec.derive_key(&everything_model(), Some(Id::Int(5)));

    assert_eq!(key.kind(), "everything");
    assert_eq!(key.namespace(), "tenant-a");
    assert_eq!(key.id(), Some(&Id::Int(5)));
}

#[test]
fn test_derive_key_without_id_is_partial() {
    let codec = EntityCodec::new("");
    let key = codec.derive_key(&everything_model(), None);

    assert!(key.is_partial());
    assert_eq!(key.kind(), "everything");
}

// =============================================================================
// Round Trip Tests
// =============================================================================

#[test]
fn test_round_trip_every_type() {
    let codec = EntityCodec::new("");
    let model = everything_model();
    let instance = full_instance();

    let entity = codec.encode(&model, &instance).unwrap();
    let decoded = codec.decode(&model, &entity).unwrap();

    assert_eq!(decoded, instance);
}

#[test]
fn test_every_field_becomes_one_property() {
    let codec = EntityCodec::new("");
    let model = everything_model();
    let entity = codec.encode(&model, &full_instance()).unwrap();

    assert_eq!(entity.properties().len(), model.fields().len());
    assert_eq!(entity.get("note"), Some(&Value::Null));
}

#[test]
fn test_foreign_key_stored_as_reference() {
    let codec = EntityCodec::new("ns");
    let entity = codec.encode(&everything_model(), &full_instance()).unwrap();

    assert_eq!(
        entity.get("owner"),
        Some(&Value::Key(Key::new("user", 11).with_namespace("ns")))
    );
}

#[test]
fn test_empty_list_round_trips() {
    let codec = EntityCodec::new("");
    let model = everything_model();
    let instance = full_instance().with("scores", FieldValue::List(vec![]));

    let entity = codec.encode(&model, &instance).unwrap();
    assert_eq!(entity.get("scores"), Some(&Value::Array(vec![])));

    let decoded = codec.decode(&model, &entity).unwrap();
    assert_eq!(decoded.get("scores"), Some(&FieldValue::List(vec![])));
}

#[test]
fn test_list_keeps_order_and_duplicates() {
    let codec = EntityCodec::new("");
    let entity = codec.encode(&everything_model(), &full_instance()).unwrap();

    assert_eq!(
        entity.get("scores"),
        Some(&Value::Array(vec![
            Value::Integer(3),
            Value::Integer(1),
            Value::Integer(3)
        ]))
    );
}

#[test]
fn test_set_stored_sorted_and_distinct() {
    let codec = EntityCodec::new("");
    let model = everything_model();
    let instance = full_instance().with(
        "tags",
        FieldValue::List(vec!["c".into(), "a".into(), "c".into(), "b".into()]),
    );

    let entity = codec.encode(&model, &instance).unwrap();
    assert_eq!(
        entity.get("tags"),
        Some(&Value::Array(vec!["a".into(), "b".into(), "c".into()]))
    );
}

#[test]
fn test_datetime_truncated_to_microseconds() {
    let codec = EntityCodec::new("");
    let model = everything_model();
    let precise = Utc
        .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .unwrap()
        .with_nanosecond(123_456_789)
        .unwrap();
    let instance = full_instance().with("created", precise);

    let entity = codec.encode(&model, &instance).unwrap();
    match entity.get("created") {
        Some(Value::Timestamp(at)) => assert_eq!(at.nanosecond(), 123_456_000),
        other => panic!("unexpected stored value {:?}", other),
    }
}

#[test]
fn test_integer_accepted_for_float_field() {
    let codec = EntityCodec::new("");
    let entity = codec
        .encode(&everything_model(), &full_instance().with("ratio", 2i64))
        .unwrap();

    assert_eq!(entity.get("ratio"), Some(&Value::Float(2.0)));
}

// =============================================================================
// Embedded Map Tests
// =============================================================================

#[test]
fn test_embedded_map_round_trips_nested_floats() {
    let codec = EntityCodec::new("");
    let model = settings_model();
    let settings = map(vec![
        ("theme", "dark".into()),
        ("zoom", FieldValue::Float(1.25)),
        (
            "window",
            map(vec![
                ("x", FieldValue::Float(-0.1)),
                ("y", FieldValue::Float(1e-300)),
                ("sizes", FieldValue::List(vec![0.5.into(), 2.0.into()])),
            ]),
        ),
        ("cleared", FieldValue::Null),
    ]);
    let instance = ModelInstance::new("profile")
        .with_pk(1)
        .with("name", "ada")
        .with("settings", settings);

    let entity = codec.encode(&model, &instance).unwrap();
    let Some(Value::Embedded(stored)) = entity.get("settings") else {
        panic!("settings not embedded: {:?}", entity.get("settings"));
    };
    let Some(Value::Embedded(window)) = stored.get("window") else {
        panic!("window not embedded: {:?}", stored.get("window"));
    };
    assert_eq!(window.get("y"), Some(&Value::Float(1e-300)));
    assert_eq!(
        window.get("sizes"),
        Some(&Value::Array(vec![Value::Float(0.5), Value::Float(2.0)]))
    );
    assert_eq!(stored.get("cleared"), Some(&Value::Null));

    let decoded = codec.decode(&model, &entity).unwrap();
    assert_eq!(decoded, instance);
}

#[test]
fn test_empty_embedded_map_round_trips() {
    let codec = EntityCodec::new("");
    let model = settings_model();
    let instance = ModelInstance::new("profile")
        .with_pk(2)
        .with("name", "bob")
        .with("settings", FieldValue::Map(BTreeMap::new()));

    let entity = codec.encode(&model, &instance).unwrap();
    assert_eq!(entity.get("settings"), Some(&Value::Embedded(BTreeMap::new())));

    let decoded = codec.decode(&model, &entity).unwrap();
    assert_eq!(decoded.get("settings"), Some(&FieldValue::Map(BTreeMap::new())));
}

#[test]
fn test_embedded_map_rejects_references() {
    let codec = EntityCodec::new("");
    let instance = ModelInstance::new("profile")
        .with("name", "eve")
        .with("settings", map(vec![("owner", FieldValue::ForeignKey(Id::Int(3)))]));

    let err = codec.encode(&settings_model(), &instance).unwrap_err();
    assert!(matches!(err, AdapterError::Codec(_)));
}

#[test]
fn test_embedded_field_rejects_scalar() {
    let codec = EntityCodec::new("");
    let instance = ModelInstance::new("profile")
        .with("name", "eve")
        .with("settings", "dark");

    let err = codec.encode(&settings_model(), &instance).unwrap_err();
    assert!(matches!(err, AdapterError::Codec(_)));
}

// =============================================================================
// Defaults and Nullability Tests
// =============================================================================

#[test]
fn test_missing_nullable_field_encodes_null() {
    let codec = EntityCodec::new("");
    let model = ModelMeta::new("post")
        .field(FieldDef::text("title"))
        .field(FieldDef::text("subtitle").nullable());
    let instance = ModelInstance::new("post").with("title", "hello");

    let entity = codec.encode(&model, &instance).unwrap();
    assert_eq!(entity.get("subtitle"), Some(&Value::Null));
}

#[test]
fn test_missing_required_field_rejected_on_encode() {
    let codec = EntityCodec::new("");
    let model = ModelMeta::new("post").field(FieldDef::text("title"));

    let err = codec.encode(&model, &ModelInstance::new("post")).unwrap_err();
    assert!(matches!(err, AdapterError::Codec(_)));
}

#[test]
fn test_null_rejected_for_non_nullable_field() {
    let codec = EntityCodec::new("");
    let model = ModelMeta::new("post").field(FieldDef::text("title"));
    let instance = ModelInstance::new("post").with("title", FieldValue::Null);

    assert!(codec.encode(&model, &instance).is_err());
}

#[test]
fn test_null_saves_default_for_non_nullable_field() {
    let codec = EntityCodec::new("");
    let model = ModelMeta::new("counter").field(FieldDef::integer("n").with_default(1086i64));
    let instance = ModelInstance::new("counter")
        .with_pk(1)
        .with("n", FieldValue::Null);

    let entity = codec.encode(&model, &instance).unwrap();
    assert_eq!(entity.get("n"), Some(&Value::Integer(1086)));

    let decoded = codec.decode(&model, &entity).unwrap();
    assert_eq!(decoded.get("n"), Some(&FieldValue::Integer(1086)));
}

#[test]
fn test_default_used_when_property_absent() {
    let codec = EntityCodec::new("");
    let model = ModelMeta::new("post")
        .field(FieldDef::text("title"))
        .field(FieldDef::integer("views").with_default(0i64));

    // Stored before `views` existed
    let entity = Entity::new(Key::new("post", 1)).with("title", "old");
    let decoded = codec.decode(&model, &entity).unwrap();

    assert_eq!(decoded.get("views"), Some(&FieldValue::Integer(0)));
}

#[test]
fn test_custom_column_name() {
    let codec = EntityCodec::new("");
    let model = ModelMeta::new("post").field(FieldDef::text("title").column("t"));
    let instance = ModelInstance::new("post").with_pk(1).with("title", "x");

    let entity = codec.encode(&model, &instance).unwrap();
    assert_eq!(entity.get("t"), Some(&Value::Text("x".to_string())));
    assert!(!entity.contains("title"));
    assert_eq!(codec.decode(&model, &entity).unwrap(), instance);
}

// =============================================================================
// Corruption Tests
// =============================================================================

#[test]
fn test_decode_rejects_missing_required_property() {
    let codec = EntityCodec::new("");
    let model = ModelMeta::new("post").field(FieldDef::text("title"));
    let entity = Entity::new(Key::new("post", 1));

    let err = codec.decode(&model, &entity).unwrap_err();
    assert!(matches!(err, AdapterError::Codec(_)));
}

#[test]
fn test_decode_rejects_kind_mismatch() {
    let codec = EntityCodec::new("");
    let model = ModelMeta::new("post").field(FieldDef::text("title"));
    let entity = Entity::new(Key::new("comment", 1)).with("title", "x");

    assert!(codec.decode(&model, &entity).is_err());
}

#[test]
fn test_decode_rejects_wrong_value_type() {
    let codec = EntityCodec::new("");
    let model = ModelMeta::new("post").field(FieldDef::integer("views"));
    let entity = Entity::new(Key::new("post", 1)).with("views", "many");

    assert!(codec.decode(&model, &entity).is_err());
}

#[test]
fn test_decode_rejects_reference_to_wrong_kind() {
    let codec = EntityCodec::new("");
    let model = ModelMeta::new("post").field(FieldDef::foreign_key("author", "user"));
    let entity = Entity::new(Key::new("post", 1)).with("author", Key::new("team", 3));

    assert!(codec.decode(&model, &entity).is_err());
}

#[test]
fn test_encode_rejects_unknown_field() {
    let codec = EntityCodec::new("");
    let model = ModelMeta::new("post").field(FieldDef::text("title"));
    let instance = ModelInstance::new("post")
        .with("title", "x")
        .with("bogus", 1i64);

    assert!(codec.encode(&model, &instance).is_err());
}

#[test]
fn test_decode_partial_keeps_present_properties_only() {
    let codec = EntityCodec::new("");
    let model = ModelMeta::new("post")
        .field(FieldDef::text("title"))
        .field(FieldDef::integer("views"));
    let entity = Entity::new(Key::new("post", 9)).with("views", 4i64);

    let decoded = codec.decode_partial(&model, &entity).unwrap();
    assert_eq!(decoded.pk(), Some(&Id::Int(9)));
    assert_eq!(decoded.get("views"), Some(&FieldValue::Integer(4)));
    assert_eq!(decoded.get("title"), None);
}
