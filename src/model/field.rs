//! Field definitions and ORM-side values

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::entity::Id;

/// Declared type of a model field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    Text,
    Integer,
    Float,
    Boolean,
    DateTime,
    Binary,
    /// Reference to an entity of `target` kind, stored as its key
    ForeignKey { target: String },
    /// Ordered repeated values
    List(Box<FieldType>),
    /// Unordered distinct values, stored sorted
    Set(Box<FieldType>),
    /// Schemaless map stored as an embedded entity
    Embedded,
}

impl FieldType {
    pub fn is_repeated(&self) -> bool {
        matches!(self, FieldType::List(_) | FieldType::Set(_))
    }

    /// Element type for repeated fields, the type itself otherwise
    pub fn element_type(&self) -> &FieldType {
        match self {
            FieldType::List(inner) | FieldType::Set(inner) => inner,
            other => other,
        }
    }
}

/// A value as the ORM sees it
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    DateTime(DateTime<Utc>),
    Binary(Bytes),
    ForeignKey(Id),
    List(Vec<FieldValue>),
    Map(BTreeMap<String, FieldValue>),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => write!(f, "NULL"),
            FieldValue::Text(v) => write!(f, "{}", v),
            FieldValue::Integer(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Boolean(v) => write!(f, "{}", v),
            FieldValue::DateTime(v) => write!(f, "{}", v.to_rfc3339()),
            FieldValue::Binary(v) => write!(f, "<{} bytes>", v.len()),
            FieldValue::ForeignKey(id) => write!(f, "{}", id),
            FieldValue::List(values) => {
                write!(f, "[")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", value)?;
                }
                write!(f, "]")
            }
            FieldValue::Map(entries) => {
                write!(f, "{{")?;
                for (i, (name, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", name, value)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

impl From<BTreeMap<String, FieldValue>> for FieldValue {
    fn from(value: BTreeMap<String, FieldValue>) -> Self {
        FieldValue::Map(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::DateTime(value)
    }
}

/// One declared field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    /// Attribute name on the model
    pub name: String,
    /// Property name in the stored entity
    pub column: String,
    pub field_type: FieldType,
    pub nullable: bool,
    pub default: Option<FieldValue>,
    pub unique: bool,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        let name = name.into();
        Self {
            column: name.clone(),
            name,
            field_type,
            nullable: false,
            default: None,
            unique: false,
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Text)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Integer)
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Float)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Boolean)
    }

    pub fn datetime(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::DateTime)
    }

    pub fn binary(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Binary)
    }

    pub fn foreign_key(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(
            name,
            FieldType::ForeignKey {
                target: target.into(),
            },
        )
    }

    pub fn list(name: impl Into<String>, element: FieldType) -> Self {
        Self::new(name, FieldType::List(Box::new(element)))
    }

    pub fn set(name: impl Into<String>, element: FieldType) -> Self {
        Self::new(name, FieldType::Set(Box::new(element)))
    }

    pub fn embedded(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Embedded)
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<FieldValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Value used when the field is absent: the default, else NULL for
    /// nullable fields.
    pub fn fallback_value(&self) -> Option<FieldValue> {
        if let Some(default) = &self.default {
            return Some(default.clone());
        }
        if self.nullable {
            return Some(FieldValue::Null);
        }
        None
    }
}
