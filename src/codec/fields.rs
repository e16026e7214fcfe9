//! Per-type field conversions

use std::collections::BTreeMap;

use chrono::{DateTime, Timelike, Utc};

use crate::entity::Value;
use crate::error::{AdapterError, Result};
use crate::model::{FieldDef, FieldType, FieldValue};

use super::EntityCodec;

pub(super) fn encode_value(codec: &EntityCodec, field: &FieldDef, value: &FieldValue) -> Result<Value> {
    match &field.field_type {
        FieldType::List(element) => {
            let items = expect_list(field, value)?;
            let encoded = items
                .iter()
                .map(|item| encode_scalar(codec, element, item, &field.name))
                .collect::<Result<Vec<_>>>()?;
            Ok(Value::Array(encoded))
        }
        FieldType::Set(element) => {
            let items = expect_list(field, value)?;
            let encoded = items
                .iter()
                .map(|item| encode_scalar(codec, element, item, &field.name))
                .collect::<Result<Vec<_>>>()?;
            Ok(Value::Array(normalize_set(encoded)))
        }
        scalar => encode_scalar(codec, scalar, value, &field.name),
    }
}

pub(super) fn encode_scalar(
    codec: &EntityCodec,
    field_type: &FieldType,
    value: &FieldValue,
    name: &str,
) -> Result<Value> {
    let encoded = match (field_type, value) {
        (FieldType::Text, FieldValue::Text(text)) => Value::Text(text.clone()),
        (FieldType::Integer, FieldValue::Integer(int)) => Value::Integer(*int),
        (FieldType::Float, FieldValue::Float(float)) => Value::Float(*float),
        (FieldType::Float, FieldValue::Integer(int)) => Value::Float(*int as f64),
        (FieldType::Boolean, FieldValue::Boolean(flag)) => Value::Boolean(*flag),
        (FieldType::DateTime, FieldValue::DateTime(at)) => Value::Timestamp(truncate_micros(*at)),
        (FieldType::Binary, FieldValue::Binary(bytes)) => Value::Blob(bytes.clone()),
        (FieldType::ForeignKey { target }, FieldValue::ForeignKey(id)) => {
            Value::Key(codec.reference_key(target, id.clone()))
        }
        (FieldType::Embedded, FieldValue::Map(entries)) => {
            Value::Embedded(encode_entries(entries, name)?)
        }
        (_, FieldValue::Null) => {
            return Err(AdapterError::Codec(format!(
                "{} cannot hold NULL elements",
                name
            )))
        }
        (expected, got) => {
            return Err(AdapterError::Codec(format!(
                "{} expects {:?}, got {}",
                name, expected, got
            )))
        }
    };
    Ok(encoded)
}

pub(super) fn decode_value(field: &FieldDef, stored: &Value) -> Result<FieldValue> {
    if stored.is_null() {
        if field.nullable {
            return Ok(FieldValue::Null);
        }
        return Err(AdapterError::Codec(format!(
            "NULL stored in non-nullable field {}",
            field.name
        )));
    }

    match &field.field_type {
        FieldType::List(element) => {
            let items = expect_array(field, stored)?;
            let decoded = items
                .iter()
                .map(|item| decode_scalar(element, item, &field.name))
                .collect::<Result<Vec<_>>>()?;
            Ok(FieldValue::List(decoded))
        }
        FieldType::Set(element) => {
            let items = normalize_set(expect_array(field, stored)?.to_vec());
            let decoded = items
                .iter()
                .map(|item| decode_scalar(element, item, &field.name))
                .collect::<Result<Vec<_>>>()?;
            Ok(FieldValue::List(decoded))
        }
        scalar => decode_scalar(scalar, stored, &field.name),
    }
}

fn decode_scalar(field_type: &FieldType, stored: &Value, name: &str) -> Result<FieldValue> {
    let decoded = match (field_type, stored) {
        (FieldType::Text, Value::Text(text)) => FieldValue::Text(text.clone()),
        (FieldType::Integer, Value::Integer(int)) => FieldValue::Integer(*int),
        (FieldType::Float, Value::Float(float)) => FieldValue::Float(*float),
        (FieldType::Boolean, Value::Boolean(flag)) => FieldValue::Boolean(*flag),
        (FieldType::DateTime, Value::Timestamp(at)) => FieldValue::DateTime(*at),
        (FieldType::Binary, Value::Blob(bytes)) => FieldValue::Binary(bytes.clone()),
        (FieldType::ForeignKey { target }, Value::Key(key)) => {
            if key.kind() != target {
                return Err(AdapterError::Codec(format!(
                    "{} references {} but stored key is {}",
                    name, target, key
                )));
            }
            let id = key.id().cloned().ok_or_else(|| {
                AdapterError::Codec(format!("{} stores a partial key {}", name, key))
            })?;
            FieldValue::ForeignKey(id)
        }
        (FieldType::Embedded, Value::Embedded(entries)) => {
            FieldValue::Map(decode_entries(entries, name)?)
        }
        (expected, got) => {
            return Err(AdapterError::Codec(format!(
                "{} expects {:?}, stored value is {}",
                name,
                expected,
                got.type_name()
            )))
        }
    };
    Ok(decoded)
}

fn encode_entries(entries: &BTreeMap<String, FieldValue>, name: &str) -> Result<BTreeMap<String, Value>> {
    entries
        .iter()
        .map(|(key, value)| Ok((key.clone(), encode_untyped(value, name)?)))
        .collect()
}

/// Embedded values carry no declared type, so each maps by its own variant
fn encode_untyped(value: &FieldValue, name: &str) -> Result<Value> {
    let encoded = match value {
        FieldValue::Null => Value::Null,
        FieldValue::Text(text) => Value::Text(text.clone()),
        FieldValue::Integer(int) => Value::Integer(*int),
        FieldValue::Float(float) => Value::Float(*float),
        FieldValue::Boolean(flag) => Value::Boolean(*flag),
        FieldValue::DateTime(at) => Value::Timestamp(truncate_micros(*at)),
        FieldValue::Binary(bytes) => Value::Blob(bytes.clone()),
        FieldValue::List(items) => Value::Array(
            items
                .iter()
                .map(|item| encode_untyped(item, name))
                .collect::<Result<Vec<_>>>()?,
        ),
        FieldValue::Map(entries) => Value::Embedded(encode_entries(entries, name)?),
        FieldValue::ForeignKey(id) => {
            return Err(AdapterError::Codec(format!(
                "{} cannot embed reference {} without a target kind",
                name, id
            )))
        }
    };
    Ok(encoded)
}

fn decode_entries(entries: &BTreeMap<String, Value>, name: &str) -> Result<BTreeMap<String, FieldValue>> {
    entries
        .iter()
        .map(|(key, value)| Ok((key.clone(), decode_untyped(value, name)?)))
        .collect()
}

fn decode_untyped(stored: &Value, name: &str) -> Result<FieldValue> {
    let decoded = match stored {
        Value::Null => FieldValue::Null,
        Value::Text(text) => FieldValue::Text(text.clone()),
        Value::Integer(int) => FieldValue::Integer(*int),
        Value::Float(float) => FieldValue::Float(*float),
        Value::Boolean(flag) => FieldValue::Boolean(*flag),
        Value::Timestamp(at) => FieldValue::DateTime(*at),
        Value::Blob(bytes) => FieldValue::Binary(bytes.clone()),
        Value::Array(items) => FieldValue::List(
            items
                .iter()
                .map(|item| decode_untyped(item, name))
                .collect::<Result<Vec<_>>>()?,
        ),
        Value::Embedded(entries) => FieldValue::Map(decode_entries(entries, name)?),
        Value::Key(key) => {
            return Err(AdapterError::Codec(format!(
                "{} embeds key {} which has no field to decode into",
                name, key
            )))
        }
    };
    Ok(decoded)
}

fn expect_list<'a>(field: &FieldDef, value: &'a FieldValue) -> Result<&'a [FieldValue]> {
    match value {
        FieldValue::List(items) => Ok(items),
        other => Err(AdapterError::Codec(format!(
            "{} expects a list, got {}",
            field.name, other
        ))),
    }
}

fn expect_array<'a>(field: &FieldDef, stored: &'a Value) -> Result<&'a [Value]> {
    match stored {
        Value::Array(items) => Ok(items),
        other => Err(AdapterError::Codec(format!(
            "{} expects repeated values, stored value is {}",
            field.name,
            other.type_name()
        ))),
    }
}

/// Sets are stored sorted and distinct so round trips are reproducible
fn normalize_set(mut values: Vec<Value>) -> Vec<Value> {
    values.sort_by(|a, b| a.compare(b));
    values.dedup_by(|a, b| a.compare(b).is_eq());
    values
}

fn truncate_micros(at: DateTime<Utc>) -> DateTime<Utc> {
    at.with_nanosecond(at.nanosecond() / 1_000 * 1_000)
        .unwrap_or(at)
}
