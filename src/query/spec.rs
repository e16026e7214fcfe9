//! ORM-side query specification
//!
//! What the ORM's query compiler hands the adapter: a filter tree over
//! model field names, an ordering, a window and an optional aggregate.

use crate::entity::{Id, Key};
use crate::model::FieldValue;

/// Field name that always refers to the primary key
pub const PK_FIELD: &str = "pk";

/// Comparison applied to one field
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Exact(FieldValue),
    Gt(FieldValue),
    Gte(FieldValue),
    Lt(FieldValue),
    Lte(FieldValue),
    /// Inclusive on both ends
    Range(FieldValue, FieldValue),
    Ne(FieldValue),
    In(Vec<FieldValue>),
    NotIn(Vec<FieldValue>),
    IsNull(bool),
}

/// Boolean filter tree
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Leaf { field: String, condition: Condition },
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    pub fn leaf(field: impl Into<String>, condition: Condition) -> Self {
        Filter::Leaf {
            field: field.into(),
            condition,
        }
    }

    pub fn exact(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::leaf(field, Condition::Exact(value.into()))
    }

    pub fn gt(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::leaf(field, Condition::Gt(value.into()))
    }

    pub fn gte(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::leaf(field, Condition::Gte(value.into()))
    }

    pub fn lt(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::leaf(field, Condition::Lt(value.into()))
    }

    pub fn lte(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::leaf(field, Condition::Lte(value.into()))
    }

    pub fn range(
        field: impl Into<String>,
        low: impl Into<FieldValue>,
        high: impl Into<FieldValue>,
    ) -> Self {
        Self::leaf(field, Condition::Range(low.into(), high.into()))
    }

    pub fn ne(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::leaf(field, Condition::Ne(value.into()))
    }

    pub fn is_in<V: Into<FieldValue>>(field: impl Into<String>, values: Vec<V>) -> Self {
        Self::leaf(
            field,
            Condition::In(values.into_iter().map(Into::into).collect()),
        )
    }

    pub fn not_in<V: Into<FieldValue>>(field: impl Into<String>, values: Vec<V>) -> Self {
        Self::leaf(
            field,
            Condition::NotIn(values.into_iter().map(Into::into).collect()),
        )
    }

    pub fn is_null(field: impl Into<String>, null: bool) -> Self {
        Self::leaf(field, Condition::IsNull(null))
    }

    pub fn and(filters: Vec<Filter>) -> Self {
        Filter::And(filters)
    }

    pub fn or(filters: Vec<Filter>) -> Self {
        Filter::Or(filters)
    }
}

/// Aggregate computed over the matched rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Aggregate {
    Count,
    Sum(String),
    Avg(String),
    Min(String),
    Max(String),
}

impl Aggregate {
    pub fn field(&self) -> Option<&str> {
        match self {
            Aggregate::Count => None,
            Aggregate::Sum(field)
            | Aggregate::Avg(field)
            | Aggregate::Min(field)
            | Aggregate::Max(field) => Some(field),
        }
    }
}

/// A complete ORM query against one model
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySpec {
    filter: Option<Filter>,
    ordering: Vec<String>,
    offset: usize,
    limit: Option<usize>,
    ancestor: Option<Key>,
    keys_only: bool,
    projection: Vec<String>,
    exclude_keys: Vec<Id>,
    aggregate: Option<Aggregate>,
}

impl QuerySpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a filter, ANDed with any filter already present
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(match self.filter.take() {
            None => filter,
            Some(Filter::And(mut existing)) => {
                existing.push(filter);
                Filter::And(existing)
            }
            Some(existing) => Filter::And(vec![existing, filter]),
        });
        self
    }

    /// Field names, `-` prefix for descending
    pub fn order_by(mut self, fields: &[&str]) -> Self {
        self.ordering = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn ancestor(mut self, ancestor: Key) -> Self {
        self.ancestor = Some(ancestor);
        self
    }

    pub fn keys_only(mut self) -> Self {
        self.keys_only = true;
        self
    }

    /// Only load the named fields
    pub fn only(mut self, fields: &[&str]) -> Self {
        self.projection = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn exclude_keys(mut self, ids: Vec<Id>) -> Self {
        self.exclude_keys = ids;
        self
    }

    pub fn aggregate(mut self, aggregate: Aggregate) -> Self {
        self.aggregate = Some(aggregate);
        self
    }

    pub fn get_filter(&self) -> Option<&Filter> {
        self.filter.as_ref()
    }

    pub fn get_ordering(&self) -> &[String] {
        &self.ordering
    }

    pub fn get_offset(&self) -> usize {
        self.offset
    }

    pub fn get_limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn get_ancestor(&self) -> Option<&Key> {
        self.ancestor.as_ref()
    }

    pub fn is_keys_only(&self) -> bool {
        self.keys_only
    }

    pub fn get_projection(&self) -> &[String] {
        &self.projection
    }

    pub fn get_exclude_keys(&self) -> &[Id] {
        &self.exclude_keys
    }

    pub fn get_aggregate(&self) -> Option<&Aggregate> {
        self.aggregate.as_ref()
    }
}
