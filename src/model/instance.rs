//! Model instances

use std::collections::BTreeMap;

use crate::entity::Id;

use super::FieldValue;

/// One row of a model: its primary key (if assigned) and field values
/// keyed by field name.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInstance {
    kind: String,
    pk: Option<Id>,
    values: BTreeMap<String, FieldValue>,
}

impl ModelInstance {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            pk: None,
            values: BTreeMap::new(),
        }
    }

    pub fn with_pk(mut self, pk: impl Into<Id>) -> Self {
        self.pk = Some(pk.into());
        self
    }

    /// Builder-style value setter
    pub fn with(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.values.insert(field.into(), value.into());
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn pk(&self) -> Option<&Id> {
        self.pk.as_ref()
    }

    pub fn set_pk(&mut self, pk: Option<Id>) {
        self.pk = pk;
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.values.get(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<FieldValue>) {
        self.values.insert(field.into(), value.into());
    }

    pub fn values(&self) -> &BTreeMap<String, FieldValue> {
        &self.values
    }
}
