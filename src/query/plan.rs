//! Query translation
//!
//! Turns a [`QuerySpec`] into a [`QueryPlan`]:
//!
//! ```text
//! Filter tree ──DNF──► branches ──┬── every branch pins __key__ ──► KeyLookup
//!  (IN / OR expand)               │
//!                                 └── otherwise ──► Native (one query per branch)
//!                                                     │
//!                              per branch: filters ───┼── native filters
//!                                                     └── residual filters
//! ```
//!
//! Anything the backend cannot run natively is evaluated client-side and
//! recorded as a [`Fallback`] on the plan.

use std::collections::HashSet;

use crate::codec::EntityCodec;
use crate::config::Config;
use crate::entity::{Entity, Key, Value};
use crate::error::{AdapterError, Result};
use crate::model::{FieldDef, FieldValue, ModelMeta};

use super::native::{NativeQuery, Operator, PropertyFilter, PropertyOrder, KEY_PROPERTY};
use super::spec::{Aggregate, Condition, Filter, QuerySpec, PK_FIELD};

/// A client-side step the plan needs because the backend cannot do it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fallback {
    /// Inequality beyond the backend's per-query property cap
    ExtraInequality { property: String },
    /// Inequality on a property that is not a leading sort property
    InequalityOrder { property: String },
    NotEqual { property: String },
    NotIn { property: String },
    /// OR/IN expanded into several native queries merged client-side
    MultiQueryMerge { branches: usize },
    ExcludedKeys { count: usize },
    /// Sum/avg/min/max evaluated over fetched rows
    ClientAggregate,
}

/// One DNF branch: a native query plus the filters evaluated client-side
#[derive(Debug, Clone, PartialEq)]
pub struct BranchPlan {
    pub query: NativeQuery,
    pub residual: Vec<PropertyFilter>,
}

impl BranchPlan {
    /// Full predicate of the branch, native and residual
    pub fn matches(&self, entity: &Entity) -> bool {
        self.query.matches(entity) && self.residual.iter().all(|f| f.matches(entity))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    /// The filter can never match; no backend call is made
    NoOp,
    Native(Vec<BranchPlan>),
    /// Batched lookup of pinned keys, re-checked against each branch
    KeyLookup {
        keys: Vec<Key>,
        branches: Vec<BranchPlan>,
    },
}

/// Executable plan for one query
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub kind: String,
    pub strategy: Strategy,
    /// Result ordering (also the merge order across branches)
    pub orders: Vec<PropertyOrder>,
    /// Offset applied client-side
    pub offset: usize,
    /// Limit applied client-side
    pub limit: Option<usize>,
    pub keys_only: bool,
    /// Columns to keep on each result; empty keeps all
    pub projection: Vec<String>,
    pub exclude: Vec<Key>,
    pub aggregate: Option<Aggregate>,
    pub fallbacks: Vec<Fallback>,
}

impl QueryPlan {
    /// True when a single native query answers the query with no
    /// client-side work
    pub fn is_direct(&self) -> bool {
        match &self.strategy {
            Strategy::NoOp => true,
            Strategy::Native(branches) => branches.len() == 1 && self.fallbacks.is_empty(),
            Strategy::KeyLookup { .. } => false,
        }
    }

    /// True when some filter is evaluated client-side
    pub fn uses_residual_filter(&self) -> bool {
        match &self.strategy {
            Strategy::NoOp => false,
            Strategy::Native(branches) | Strategy::KeyLookup { branches, .. } => {
                branches.iter().any(|branch| !branch.residual.is_empty())
            }
        }
    }

    pub fn fallbacks(&self) -> &[Fallback] {
        &self.fallbacks
    }

    pub fn branches(&self) -> &[BranchPlan] {
        match &self.strategy {
            Strategy::NoOp => &[],
            Strategy::Native(branches) | Strategy::KeyLookup { branches, .. } => branches,
        }
    }

    /// Whether `entity` satisfies any branch of the plan's filter
    pub fn matches(&self, entity: &Entity) -> bool {
        self.branches().iter().any(|branch| branch.matches(entity))
    }

    /// Whether results carry only a subset of the model's properties
    pub fn is_partial(&self) -> bool {
        self.keys_only || !self.projection.is_empty()
    }
}

/// A single comparison of a DNF branch
#[derive(Debug, Clone, Copy)]
struct Leaf<'s> {
    field: &'s str,
    test: Test<'s>,
}

#[derive(Debug, Clone, Copy)]
enum Test<'s> {
    Condition(&'s Condition),
    /// One value of an expanded IN
    OneOf(&'s FieldValue),
}

/// Translates query specs for one connection
#[derive(Debug, Clone)]
pub struct QueryTranslator<'a> {
    codec: &'a EntityCodec,
    max_branches: usize,
    max_inequalities: usize,
}

impl<'a> QueryTranslator<'a> {
    pub fn new(codec: &'a EntityCodec, config: &Config) -> Self {
        Self {
            codec,
            max_branches: config.max_query_branches,
            max_inequalities: config.max_inequality_properties,
        }
    }

    pub fn translate(&self, model: &ModelMeta, spec: &QuerySpec) -> Result<QueryPlan> {
        let orders = self.resolve_orders(model, spec.get_ordering())?;
        let projection = spec
            .get_projection()
            .iter()
            .map(|name| self.column_of(model, name))
            .collect::<Result<Vec<_>>>()?;
        let exclude: Vec<Key> = spec
            .get_exclude_keys()
            .iter()
            .map(|id| self.codec.derive_key(model, Some(id.clone())))
            .collect();
        if let Some(field) = spec.get_aggregate().and_then(Aggregate::field) {
            self.column_of(model, field)?;
        }

        let mut plan = QueryPlan {
            kind: model.kind().to_string(),
            strategy: Strategy::NoOp,
            orders,
            offset: spec.get_offset(),
            limit: spec.get_limit(),
            keys_only: spec.is_keys_only(),
            projection,
            exclude,
            aggregate: spec.get_aggregate().cloned(),
            fallbacks: Vec::new(),
        };

        let dnf = match spec.get_filter() {
            Some(filter) => self.to_dnf(filter)?,
            None => vec![Vec::new()],
        };
        if dnf.is_empty() || spec.get_limit() == Some(0) {
            return Ok(plan);
        }

        let mut branches = Vec::with_capacity(dnf.len());
        for leaves in &dnf {
            branches.push(self.plan_branch(model, spec, leaves, &plan.orders, &mut plan.fallbacks)?);
        }

        if let Some(keys) = pinned_keys(&branches) {
            plan.strategy = Strategy::KeyLookup { keys, branches };
            return Ok(plan);
        }

        if branches.len() > 1 {
            plan.fallbacks.push(Fallback::MultiQueryMerge {
                branches: branches.len(),
            });
        }
        if !plan.exclude.is_empty() {
            plan.fallbacks.push(Fallback::ExcludedKeys {
                count: plan.exclude.len(),
            });
        }
        if matches!(
            plan.aggregate,
            Some(Aggregate::Sum(_) | Aggregate::Avg(_) | Aggregate::Min(_) | Aggregate::Max(_))
        ) {
            plan.fallbacks.push(Fallback::ClientAggregate);
        }

        self.push_down(&mut plan, &mut branches);
        plan.strategy = Strategy::Native(branches);
        Ok(plan)
    }

    // -------------------------------------------------------------------------
    // Filter normalization
    // -------------------------------------------------------------------------

    /// Disjunctive normal form; IN expands to one branch per value and an
    /// empty IN removes its branch.
    fn to_dnf<'s>(&self, filter: &'s Filter) -> Result<Vec<Vec<Leaf<'s>>>> {
        let branches = match filter {
            Filter::Leaf {
                field,
                condition: Condition::In(values),
            } => values
                .iter()
                .map(|value| {
                    vec![Leaf {
                        field: field.as_str(),
                        test: Test::OneOf(value),
                    }]
                })
                .collect(),
            Filter::Leaf { field, condition } => vec![vec![Leaf {
                field: field.as_str(),
                test: Test::Condition(condition),
            }]],
            Filter::Or(children) => {
                let mut branches = Vec::new();
                for child in children {
                    branches.extend(self.to_dnf(child)?);
                    self.check_branches(branches.len())?;
                }
                branches
            }
            Filter::And(children) => {
                let mut branches: Vec<Vec<Leaf<'s>>> = vec![Vec::new()];
                for child in children {
                    let expanded = self.to_dnf(child)?;
                    self.check_branches(branches.len().saturating_mul(expanded.len()))?;
                    branches = branches
                        .iter()
                        .flat_map(|left| {
                            expanded.iter().map(move |right| {
                                let mut combined = left.clone();
                                combined.extend(right.iter().copied());
                                combined
                            })
                        })
                        .collect();
                }
                branches
            }
        };
        self.check_branches(branches.len())?;
        Ok(branches)
    }

    fn check_branches(&self, count: usize) -> Result<()> {
        if count > self.max_branches {
            return Err(AdapterError::NotSupported(format!(
                "query expands into {} branches, the limit is {}",
                count, self.max_branches
            )));
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Branch planning
    // -------------------------------------------------------------------------

    fn plan_branch(
        &self,
        model: &ModelMeta,
        spec: &QuerySpec,
        leaves: &[Leaf<'_>],
        orders: &[PropertyOrder],
        fallbacks: &mut Vec<Fallback>,
    ) -> Result<BranchPlan> {
        let mut filters = Vec::new();
        for leaf in leaves {
            self.lower_leaf(model, leaf, &mut filters)?;
        }

        let mut query = NativeQuery::new(self.codec.namespace(), model.kind());
        query.ancestor = spec.get_ancestor().cloned();
        query.orders = orders.to_vec();

        let leading_orders: Vec<&str> = orders
            .iter()
            .take(self.max_inequalities)
            .map(|order| order.property.as_str())
            .collect();
        let mut native_inequalities: Vec<String> = Vec::new();
        let mut residual = Vec::new();

        for filter in filters {
            match filter.op {
                Operator::Equal => query.filters.push(filter),
                Operator::NotEqual => {
                    note(fallbacks, Fallback::NotEqual { property: filter.property.clone() });
                    residual.push(filter);
                }
                Operator::NotIn => {
                    note(fallbacks, Fallback::NotIn { property: filter.property.clone() });
                    residual.push(filter);
                }
                _ => {
                    let property = filter.property.clone();
                    if native_inequalities.contains(&property) {
                        query.filters.push(filter);
                    } else if native_inequalities.len() >= self.max_inequalities {
                        note(fallbacks, Fallback::ExtraInequality { property });
                        residual.push(filter);
                    } else if !orders.is_empty() && !leading_orders.contains(&property.as_str()) {
                        note(fallbacks, Fallback::InequalityOrder { property });
                        residual.push(filter);
                    } else {
                        native_inequalities.push(property);
                        query.filters.push(filter);
                    }
                }
            }
        }

        Ok(BranchPlan { query, residual })
    }

    fn lower_leaf(
        &self,
        model: &ModelMeta,
        leaf: &Leaf<'_>,
        out: &mut Vec<PropertyFilter>,
    ) -> Result<()> {
        let (property, target) = self.resolve_field(model, leaf.field)?;
        let operand = |value: &FieldValue| -> Result<Value> {
            match target {
                Some(def) => self.codec.encode_operand(def, value),
                None => self.codec.encode_pk_operand(model, value),
            }
        };
        let mut push = |op: Operator, value: Value| {
            out.push(PropertyFilter::new(property.clone(), op, value));
        };

        let condition = match leaf.test {
            Test::OneOf(value) => {
                push(Operator::Equal, operand(value)?);
                return Ok(());
            }
            Test::Condition(condition) => condition,
        };

        match condition {
            Condition::Exact(value) => push(Operator::Equal, operand(value)?),
            Condition::Gt(value) => push(Operator::GreaterThan, operand(value)?),
            Condition::Gte(value) => push(Operator::GreaterThanOrEqual, operand(value)?),
            Condition::Lt(value) => push(Operator::LessThan, operand(value)?),
            Condition::Lte(value) => push(Operator::LessThanOrEqual, operand(value)?),
            Condition::Range(low, high) => {
                push(Operator::GreaterThanOrEqual, operand(low)?);
                push(Operator::LessThanOrEqual, operand(high)?);
            }
            Condition::Ne(value) => push(Operator::NotEqual, operand(value)?),
            Condition::NotIn(values) => {
                let encoded = values.iter().map(&operand).collect::<Result<Vec<_>>>()?;
                push(Operator::NotIn, Value::Array(encoded));
            }
            Condition::IsNull(true) => push(Operator::Equal, Value::Null),
            Condition::IsNull(false) => push(Operator::NotEqual, Value::Null),
            // Expanded during DNF conversion
            Condition::In(_) => {
                return Err(AdapterError::NotSupported(
                    "IN must be expanded before lowering".to_string(),
                ))
            }
        }
        Ok(())
    }

    /// Pushes offset, limit and result shape into the native query when a
    /// single branch answers the query without client-side filtering.
    fn push_down(&self, plan: &mut QueryPlan, branches: &mut [BranchPlan]) {
        let single = branches.len() == 1;
        let residual = branches.iter().any(|branch| !branch.residual.is_empty());
        let needs_rows = matches!(
            plan.aggregate,
            Some(Aggregate::Sum(_) | Aggregate::Avg(_) | Aggregate::Min(_) | Aggregate::Max(_))
        );
        let only_keys = plan.keys_only || plan.aggregate == Some(Aggregate::Count);

        for branch in branches.iter_mut() {
            if !residual && (single || plan.orders.is_empty()) && !needs_rows {
                if only_keys {
                    branch.query.keys_only = true;
                } else if single && !plan.projection.is_empty() {
                    branch.query.projection = plan.projection.clone();
                }
            }
            if !residual && plan.exclude.is_empty() {
                if single {
                    branch.query.offset = plan.offset;
                    branch.query.limit = plan.limit;
                } else {
                    branch.query.limit = plan.limit.map(|limit| limit.saturating_add(plan.offset));
                }
            }
        }

        if single && !residual && plan.exclude.is_empty() {
            plan.offset = 0;
            plan.limit = None;
        }
    }

    // -------------------------------------------------------------------------
    // Field resolution
    // -------------------------------------------------------------------------

    /// Native property for a field name; `None` definition means the key
    fn resolve_field<'m>(
        &self,
        model: &'m ModelMeta,
        name: &str,
    ) -> Result<(String, Option<&'m FieldDef>)> {
        if name == PK_FIELD || name == model.pk() {
            return Ok((KEY_PROPERTY.to_string(), None));
        }
        let field = model.get_field(name).ok_or_else(|| {
            AdapterError::Codec(format!("{} has no field named {}", model.kind(), name))
        })?;
        Ok((field.column.clone(), Some(field)))
    }

    fn column_of(&self, model: &ModelMeta, name: &str) -> Result<String> {
        self.resolve_field(model, name).map(|(property, _)| property)
    }

    fn resolve_orders(&self, model: &ModelMeta, ordering: &[String]) -> Result<Vec<PropertyOrder>> {
        let mut orders: Vec<PropertyOrder> = Vec::with_capacity(ordering.len());
        for name in ordering {
            let (descending, field) = match name.strip_prefix('-') {
                Some(field) => (true, field),
                None => (false, name.as_str()),
            };
            let property = self.column_of(model, field)?;
            if orders.iter().any(|order| order.property == property) {
                continue;
            }
            orders.push(if descending {
                PropertyOrder::desc(property)
            } else {
                PropertyOrder::asc(property)
            });
        }
        Ok(orders)
    }
}

fn note(fallbacks: &mut Vec<Fallback>, fallback: Fallback) {
    if !fallbacks.contains(&fallback) {
        fallbacks.push(fallback);
    }
}

/// Keys pinned by `__key__ =` in every branch, deduplicated in order
fn pinned_keys(branches: &[BranchPlan]) -> Option<Vec<Key>> {
    let mut seen = HashSet::new();
    let mut keys = Vec::new();
    for branch in branches {
        let pinned = branch.query.filters.iter().find_map(|filter| {
            match (&filter.op, &filter.value, filter.property.as_str()) {
                (Operator::Equal, Value::Key(key), KEY_PROPERTY) => Some(key),
                _ => None,
            }
        })?;
        if seen.insert(pinned.clone()) {
            keys.push(pinned.clone());
        }
    }
    Some(keys)
}
