//! Native property values
//!
//! The store is schemaless, so a property is a tagged union: a scalar, a
//! reference to another entity, an embedded structure, or repeated values.
//! The model's declared field types supply the schema on top of this.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Key;

/// A single property value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Integer(i64),
    Timestamp(DateTime<Utc>),
    Boolean(bool),
    Blob(Bytes),
    Text(String),
    Float(f64),
    Key(Key),
    Embedded(BTreeMap<String, Value>),
    Array(Vec<Value>),
}

impl Value {
    /// Position of this value's type in the store's cross-type ordering
    ///
    /// null < integer < timestamp < boolean < blob < text < float < key < embedded
    pub fn type_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Integer(_) => 1,
            Value::Timestamp(_) => 2,
            Value::Boolean(_) => 3,
            Value::Blob(_) => 4,
            Value::Text(_) => 5,
            Value::Float(_) => 6,
            Value::Key(_) => 7,
            Value::Embedded(_) => 8,
            Value::Array(_) => 9,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Integer(_) => "integer",
            Value::Timestamp(_) => "timestamp",
            Value::Boolean(_) => "boolean",
            Value::Blob(_) => "blob",
            Value::Text(_) => "text",
            Value::Float(_) => "float",
            Value::Key(_) => "key",
            Value::Embedded(_) => "embedded",
            Value::Array(_) => "array",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Total order over all values: type rank first, then value.
    ///
    /// Floats use IEEE total ordering so NaN sorts deterministically.
    pub fn compare(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Blob(a), Value::Blob(b)) => a.cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Key(a), Value::Key(b)) => a.cmp(b),
            (Value::Embedded(a), Value::Embedded(b)) => {
                for ((ka, va), (kb, vb)) in a.iter().zip(b.iter()) {
                    let ordering = ka.cmp(kb).then_with(|| va.compare(vb));
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                a.len().cmp(&b.len())
            }
            (Value::Array(a), Value::Array(b)) => {
                for (va, vb) in a.iter().zip(b.iter()) {
                    let ordering = va.compare(vb);
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                a.len().cmp(&b.len())
            }
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }

    /// Elements a filter is evaluated against: the values of a repeated
    /// property, or the value itself.
    pub fn elements(&self) -> &[Value] {
        match self {
            Value::Array(values) => values,
            other => std::slice::from_ref(other),
        }
    }

    /// Sort representative of a (possibly repeated) value: the smallest
    /// element ascending, the largest descending.
    pub fn sort_representative(&self, descending: bool) -> &Value {
        let elements = self.elements();
        let picked = if descending {
            elements.iter().max_by(|a, b| a.compare(b))
        } else {
            elements.iter().min_by(|a, b| a.compare(b))
        };
        picked.unwrap_or(&Value::Null)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<Key> for Value {
    fn from(value: Key) -> Self {
        Value::Key(value)
    }
}
