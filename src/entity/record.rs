//! Entity record
//!
//! A key plus a property bag.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{Key, Value};

/// A schemaless record stored under a key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    key: Key,
    properties: BTreeMap<String, Value>,
}

impl Entity {
    pub fn new(key: Key) -> Self {
        Self {
            key,
            properties: BTreeMap::new(),
        }
    }

    /// Builder-style property setter
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn kind(&self) -> &str {
        self.key.kind()
    }

    pub fn set_key(&mut self, key: Key) {
        self.key = key;
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.properties.insert(name.into(), value.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    pub fn properties(&self) -> &BTreeMap<String, Value> {
        &self.properties
    }

    /// Keep only the named properties
    pub fn retain_properties(&mut self, names: &[String]) {
        self.properties.retain(|name, _| names.iter().any(|n| n == name));
    }

    /// Same key, no properties (shape of keys-only query results)
    pub fn key_only(&self) -> Self {
        Self::new(self.key.clone())
    }
}
