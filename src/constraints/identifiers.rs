//! Marker identifiers
//!
//! A marker is named after the model kind and the constrained columns with
//! their values:
//!
//! ```text
//! user|email:<sha256 of "a@example.com">
//! user|first_name:<sha256>|second_name:<sha256>
//! ```
//!
//! Text and binary values are hashed to bound the key length; other values
//! use their canonical text form. A NULL value or an empty list exempts the
//! combination. A list value yields one identifier per element (the
//! cartesian product across the fields of a combination).

use std::collections::HashSet;

use sha2::{Digest, Sha256};

use crate::entity::{Entity, Key, Value};
use crate::error::{AdapterError, Result};
use crate::model::ModelMeta;

/// Kind of every marker entity
pub const UNIQUE_MARKER_KIND: &str = "uniquemarker";

/// Marker property holding the owner's key
pub const MARKER_INSTANCE: &str = "instance";

pub const MARKER_UPDATED_AT: &str = "updated_at";

/// One value combination claimed by an entity
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MarkerIdentifier {
    /// Marker key name
    pub name: String,
    /// Field names of the constraint, sorted
    pub fields: Vec<String>,
    /// Readable values, aligned with `fields`
    pub values: Vec<String>,
}

impl MarkerIdentifier {
    pub fn key(&self, namespace: &str) -> Key {
        marker_key(namespace, &self.name)
    }

    pub(crate) fn violation(&self, model: &ModelMeta) -> AdapterError {
        AdapterError::UniqueConstraintViolation {
            kind: model.kind().to_string(),
            fields: self.fields.clone(),
            values: self.values.clone(),
        }
    }
}

pub fn marker_key(namespace: &str, name: &str) -> Key {
    Key::new(UNIQUE_MARKER_KIND, name).with_namespace(namespace)
}

/// Identifiers for every unique constraint `entity` participates in
pub fn unique_identifiers(model: &ModelMeta, entity: &Entity) -> Result<Vec<MarkerIdentifier>> {
    let mut identifiers = Vec::new();

    'combinations: for combination in model.unique_combinations()? {
        let mut partials: Vec<(Vec<String>, Vec<String>)> = vec![(Vec::new(), Vec::new())];

        for field in &combination {
            let value = entity.get(&field.column).unwrap_or(&Value::Null);
            if value.is_null() || matches!(value, Value::Array(items) if items.is_empty()) {
                continue 'combinations;
            }

            let mut expanded = Vec::with_capacity(partials.len());
            for (parts, values) in &partials {
                for element in value.elements() {
                    if element.is_null() {
                        continue;
                    }
                    let mut parts = parts.clone();
                    let mut values = values.clone();
                    parts.push(format!(
                        "{}:{}",
                        field.column,
                        format_identifier_value(element)
                    ));
                    values.push(display_value(element));
                    expanded.push((parts, values));
                }
            }
            partials = expanded;
        }

        let fields: Vec<String> = combination.iter().map(|f| f.name.clone()).collect();
        for (parts, values) in partials {
            identifiers.push(MarkerIdentifier {
                name: format!("{}|{}", model.kind(), parts.join("|")),
                fields: fields.clone(),
                values,
            });
        }
    }

    Ok(identifiers)
}

/// Reject a batch whose own members collide before any backend call
pub fn check_in_memory(model: &ModelMeta, entities: &[Entity]) -> Result<()> {
    let mut claimed = HashSet::new();
    for entity in entities {
        for identifier in unique_identifiers(model, entity)? {
            if !claimed.insert(identifier.name.clone()) {
                return Err(identifier.violation(model));
            }
        }
    }
    Ok(())
}

pub fn format_identifier_value(value: &Value) -> String {
    match value {
        Value::Text(text) => hex_digest(text.as_bytes()),
        Value::Blob(bytes) => hex_digest(bytes),
        other => display_value(other),
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Integer(int) => int.to_string(),
        Value::Timestamp(at) => at.to_rfc3339(),
        Value::Boolean(flag) => flag.to_string(),
        Value::Blob(bytes) => format!("<{} bytes>", bytes.len()),
        Value::Text(text) => text.clone(),
        Value::Float(float) => float.to_string(),
        Value::Key(key) => key.to_string(),
        Value::Embedded(_) | Value::Array(_) => format!("{:?}", value),
    }
}

fn hex_digest(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|byte| format!("{:02x}", byte))
        .collect()
}
