//! Native query primitives
//!
//! The shape of a query the backend executes directly. The translator emits
//! these; the backend client runs them.

use std::fmt;

use crate::entity::{Entity, Key, Value};

use super::eval;

/// Pseudo-property that filters and orders on the entity key
pub const KEY_PROPERTY: &str = "__key__";

/// Comparison operator of a property filter.
///
/// `NotEqual` and `NotIn` are only ever evaluated client-side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equal,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    NotEqual,
    NotIn,
}

impl Operator {
    pub fn is_inequality(self) -> bool {
        matches!(
            self,
            Operator::LessThan
                | Operator::LessThanOrEqual
                | Operator::GreaterThan
                | Operator::GreaterThanOrEqual
        )
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Equal => "=",
            Operator::LessThan => "<",
            Operator::LessThanOrEqual => "<=",
            Operator::GreaterThan => ">",
            Operator::GreaterThanOrEqual => ">=",
            Operator::NotEqual => "!=",
            Operator::NotIn => "NOT IN",
        }
    }
}

/// `property <op> value`
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyFilter {
    pub property: String,
    pub op: Operator,
    pub value: Value,
}

impl PropertyFilter {
    pub fn new(property: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        Self {
            property: property.into(),
            op,
            value: value.into(),
        }
    }

    pub fn matches(&self, entity: &Entity) -> bool {
        eval::matches(self, entity)
    }
}

impl fmt::Display for PropertyFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {:?}", self.property, self.op.symbol(), self.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyOrder {
    pub property: String,
    pub direction: Direction,
}

impl PropertyOrder {
    pub fn asc(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            direction: Direction::Ascending,
        }
    }

    pub fn desc(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            direction: Direction::Descending,
        }
    }

    pub fn is_descending(&self) -> bool {
        self.direction == Direction::Descending
    }
}

/// A query the backend can execute as-is
#[derive(Debug, Clone, PartialEq)]
pub struct NativeQuery {
    pub namespace: String,
    pub kind: String,
    pub ancestor: Option<Key>,
    pub filters: Vec<PropertyFilter>,
    pub orders: Vec<PropertyOrder>,
    pub projection: Vec<String>,
    pub keys_only: bool,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl NativeQuery {
    pub fn new(namespace: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            kind: kind.into(),
            ancestor: None,
            filters: Vec::new(),
            orders: Vec::new(),
            projection: Vec::new(),
            keys_only: false,
            offset: 0,
            limit: None,
        }
    }

    pub fn filter(mut self, filter: PropertyFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order(mut self, order: PropertyOrder) -> Self {
        self.orders.push(order);
        self
    }

    /// Whether the entity falls inside this query's scope and filters.
    /// Ordering, offset and limit are not considered.
    pub fn matches(&self, entity: &Entity) -> bool {
        let key = entity.key();
        key.namespace() == self.namespace
            && key.kind() == self.kind
            && self
                .ancestor
                .as_ref()
                .map_or(true, |ancestor| ancestor.is_ancestor_of(key))
            && self.filters.iter().all(|filter| filter.matches(entity))
    }

    /// Properties with an inequality filter, in order of appearance
    pub fn inequality_properties(&self) -> Vec<&str> {
        let mut properties: Vec<&str> = Vec::new();
        for filter in &self.filters {
            if filter.op.is_inequality() && !properties.contains(&filter.property.as_str()) {
                properties.push(&filter.property);
            }
        }
        properties
    }
}
