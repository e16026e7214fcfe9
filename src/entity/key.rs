//! Entity keys
//!
//! A key is an ordered path of `(kind, id)` pairs inside a namespace. The
//! last element names the entity itself; earlier elements are ancestors.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of one path element: a store-assigned number or a chosen name.
///
/// Numeric ids order before names, matching the store's key ordering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Id {
    Int(i64),
    Name(String),
}

impl Id {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Id::Int(id) => Some(*id),
            Id::Name(_) => None,
        }
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::Int(id) => write!(f, "{}", id),
            Id::Name(name) => write!(f, "{:?}", name),
        }
    }
}

impl From<i64> for Id {
    fn from(id: i64) -> Self {
        Id::Int(id)
    }
}

impl From<&str> for Id {
    fn from(name: &str) -> Self {
        Id::Name(name.to_string())
    }
}

impl From<String> for Id {
    fn from(name: String) -> Self {
        Id::Name(name)
    }
}

/// One `(kind, id)` step of a key path. `id` is `None` only on the last
/// element of a partial key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PathElement {
    pub kind: String,
    pub id: Option<Id>,
}

/// Immutable entity key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawKey")]
pub struct Key {
    namespace: String,
    path: Vec<PathElement>,
}

/// Wire shape of a key, checked before it becomes a [`Key`]
#[derive(Serialize, Deserialize)]
struct RawKey {
    namespace: String,
    path: Vec<PathElement>,
}

impl TryFrom<RawKey> for Key {
    type Error = String;

    fn try_from(raw: RawKey) -> std::result::Result<Self, Self::Error> {
        let Some((_, ancestors)) = raw.path.split_last() else {
            return Err("key path cannot be empty".to_string());
        };
        if let Some(element) = ancestors.iter().find(|element| element.id.is_none()) {
            return Err(format!("ancestor {} has no id", element.kind));
        }
        Ok(Self {
            namespace: raw.namespace,
            path: raw.path,
        })
    }
}

impl Key {
    /// Complete root key in the default namespace
    pub fn new(kind: impl Into<String>, id: impl Into<Id>) -> Self {
        Self {
            namespace: String::new(),
            path: vec![PathElement {
                kind: kind.into(),
                id: Some(id.into()),
            }],
        }
    }

    /// Root key without an id; completed by the store on insert
    pub fn partial(kind: impl Into<String>) -> Self {
        Self {
            namespace: String::new(),
            path: vec![PathElement {
                kind: kind.into(),
                id: None,
            }],
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Child key of this (complete) key
    pub fn child(&self, kind: impl Into<String>, id: Option<Id>) -> Self {
        let mut path = self.path.clone();
        path.push(PathElement {
            kind: kind.into(),
            id,
        });
        Self {
            namespace: self.namespace.clone(),
            path,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn path(&self) -> &[PathElement] {
        &self.path
    }

    fn last(&self) -> &PathElement {
        // Constructors and deserialization both guarantee a non-empty path
        &self.path[self.path.len() - 1]
    }

    /// Kind of the entity this key names
    pub fn kind(&self) -> &str {
        &self.last().kind
    }

    pub fn id(&self) -> Option<&Id> {
        self.last().id.as_ref()
    }

    pub fn is_partial(&self) -> bool {
        self.path.iter().any(|element| element.id.is_none())
    }

    pub fn is_complete(&self) -> bool {
        !self.is_partial()
    }

    /// Complete a partial key with a store-assigned id.
    ///
    /// Returns `None` if the key is already complete.
    pub fn completed(&self, id: i64) -> Option<Self> {
        if self.id().is_some() {
            return None;
        }
        let mut completed = self.clone();
        let last = completed.path.len() - 1;
        completed.path[last].id = Some(Id::Int(id));
        Some(completed)
    }

    pub fn parent(&self) -> Option<Self> {
        if self.path.len() < 2 {
            return None;
        }
        Some(Self {
            namespace: self.namespace.clone(),
            path: self.path[..self.path.len() - 1].to_vec(),
        })
    }

    /// Whether `self` is `other` or one of its ancestors
    pub fn is_ancestor_of(&self, other: &Key) -> bool {
        self.namespace == other.namespace
            && self.path.len() <= other.path.len()
            && other.path[..self.path.len()] == self.path[..]
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.namespace.is_empty() {
            write!(f, "[{}]", self.namespace)?;
        }
        for (i, element) in self.path.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            match &element.id {
                Some(id) => write!(f, "{}({})", element.kind, id)?,
                None => write!(f, "{}(?)", element.kind)?,
            }
        }
        Ok(())
    }
}
