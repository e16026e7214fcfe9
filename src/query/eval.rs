//! Filter and ordering evaluation
//!
//! Shared by the in-memory backend (native execution) and by residual
//! client-side filtering, so both paths agree on every comparison.
//!
//! - A repeated property matches a filter when any element matches.
//! - Inequalities only match values of the operand's type: `age < 10`
//!   never matches a NULL `age`.
//! - Absent properties behave as NULL.

use std::borrow::Cow;
use std::cmp::Ordering;

use crate::entity::{Entity, Value};

use super::native::{Operator, PropertyFilter, PropertyOrder, KEY_PROPERTY};

/// Value of `property` on `entity`, with `__key__` resolving to the key
pub fn property_value<'a>(entity: &'a Entity, property: &str) -> Cow<'a, Value> {
    if property == KEY_PROPERTY {
        return Cow::Owned(Value::Key(entity.key().clone()));
    }
    match entity.get(property) {
        Some(value) => Cow::Borrowed(value),
        None => Cow::Owned(Value::Null),
    }
}

pub fn matches(filter: &PropertyFilter, entity: &Entity) -> bool {
    let value = property_value(entity, &filter.property);
    let elements = value.elements();

    match filter.op {
        Operator::Equal => contains(elements, &filter.value),
        Operator::NotEqual => !contains(elements, &filter.value),
        Operator::NotIn => !filter
            .value
            .elements()
            .iter()
            .any(|operand| contains(elements, operand)),
        op => elements.iter().any(|element| {
            element.type_rank() == filter.value.type_rank()
                && satisfies(op, element.compare(&filter.value))
        }),
    }
}

fn contains(elements: &[Value], operand: &Value) -> bool {
    if elements.is_empty() {
        return operand.is_null();
    }
    elements.iter().any(|element| element.compare(operand).is_eq())
}

fn satisfies(op: Operator, ordering: Ordering) -> bool {
    match op {
        Operator::LessThan => ordering.is_lt(),
        Operator::LessThanOrEqual => ordering.is_le(),
        Operator::GreaterThan => ordering.is_gt(),
        Operator::GreaterThanOrEqual => ordering.is_ge(),
        _ => false,
    }
}

/// Order two entities by `orders`, breaking ties by key
pub fn compare_entities(orders: &[PropertyOrder], a: &Entity, b: &Entity) -> Ordering {
    for order in orders {
        let descending = order.is_descending();
        let left = property_value(a, &order.property);
        let right = property_value(b, &order.property);
        let ordering = left
            .sort_representative(descending)
            .compare(right.sort_representative(descending));
        let ordering = if descending { ordering.reverse() } else { ordering };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    a.key().cmp(b.key())
}
