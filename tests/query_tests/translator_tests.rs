//! Tests for QueryTranslator
//!
//! These tests verify:
//! - Native pushdown of equality and single-property inequality filters
//! - Residual filters and their disclosed fallbacks
//! - OR/IN expansion, the branch cap and empty IN
//! - Primary-key lookups
//! - Ordering, projection, window and aggregate planning

use datastore_adapter::query::{
    Direction, Operator, PropertyFilter, QueryTranslator, KEY_PROPERTY,
};
use datastore_adapter::{
    AdapterError, Aggregate, Config, EntityCodec, Fallback, FieldDef, FieldType, Filter, Id, Key,
    ModelMeta, QueryPlan, QuerySpec, Strategy, Value,
};

// =============================================================================
// Helper Functions
// =============================================================================

fn item_model() -> ModelMeta {
    ModelMeta::new("item")
        .field(FieldDef::text("name"))
        .field(FieldDef::integer("price"))
        .field(FieldDef::float("rating"))
        .field(FieldDef::text("color").nullable())
        .field(FieldDef::list("sizes", FieldType::Integer))
}

fn translate_with(config: &Config, spec: &QuerySpec) -> Result<QueryPlan, AdapterError> {
    let codec = EntityCodec::new("");
    QueryTranslator::new(&codec, config).translate(&item_model(), spec)
}

fn translate(spec: &QuerySpec) -> QueryPlan {
    translate_with(&Config::default(), spec).unwrap()
}

fn native_filters(plan: &QueryPlan) -> &[PropertyFilter] {
    &plan.branches()[0].query.filters
}

// =============================================================================
// Direct Plan Tests
// =============================================================================

#[test]
fn test_equality_and_single_inequality_are_direct() {
    let plan = translate(
        &QuerySpec::new()
            .filter(Filter::exact("name", "lamp"))
            .filter(Filter::gt("price", 10i64))
            .limit(5)
            .offset(2),
    );

    assert!(plan.is_direct());
    assert!(!plan.uses_residual_filter());
    assert_eq!(native_filters(&plan).len(), 2);

    // Window pushed into the native query
    let query = &plan.branches()[0].query;
    assert_eq!(query.limit, Some(5));
    assert_eq!(query.offset, 2);
    assert_eq!(plan.limit, None);
    assert_eq!(plan.offset, 0);
}

#[test]
fn test_range_counts_as_one_inequality_property() {
    let plan = translate(&QuerySpec::new().filter(Filter::range("price", 5i64, 10i64)));

    assert!(plan.is_direct());
    let ops: Vec<Operator> = native_filters(&plan).iter().map(|f| f.op).collect();
    assert_eq!(
        ops,
        vec![Operator::GreaterThanOrEqual, Operator::LessThanOrEqual]
    );
}

#[test]
fn test_inequality_on_leading_sort_property_is_direct() {
    let plan = translate(
        &QuerySpec::new()
            .filter(Filter::gte("price", 3i64))
            .order_by(&["price", "name"]),
    );

    assert!(plan.is_direct());
}

#[test]
fn test_no_filter_is_a_kind_scan() {
    let plan = translate(&QuerySpec::new());

    assert!(plan.is_direct());
    assert_eq!(plan.branches().len(), 1);
    assert!(native_filters(&plan).is_empty());
    assert_eq!(plan.branches()[0].query.kind, "item");
}

// =============================================================================
// Fallback Tests
// =============================================================================

#[test]
fn test_second_inequality_property_is_residual() {
    let plan = translate(
        &QuerySpec::new()
            .filter(Filter::gt("price", 10i64))
            .filter(Filter::lt("rating", 4.5)),
    );

    assert!(!plan.is_direct());
    assert!(plan.uses_residual_filter());
    assert_eq!(
        plan.fallbacks(),
        &[Fallback::ExtraInequality {
            property: "rating".to_string()
        }]
    );
    assert_eq!(plan.branches()[0].query.inequality_properties(), vec!["price"]);
    assert_eq!(plan.branches()[0].residual[0].property, "rating");
}

#[test]
fn test_raised_inequality_cap_keeps_both_native() {
    let config = Config::builder().max_inequality_properties(2).build().unwrap();
    let plan = translate_with(
        &config,
        &QuerySpec::new()
            .filter(Filter::gt("price", 10i64))
            .filter(Filter::lt("rating", 4.5)),
    )
    .unwrap();

    assert!(plan.is_direct());
}

#[test]
fn test_inequality_off_the_sort_order_is_residual() {
    let plan = translate(
        &QuerySpec::new()
            .filter(Filter::gt("price", 10i64))
            .order_by(&["name"]),
    );

    assert_eq!(
        plan.fallbacks(),
        &[Fallback::InequalityOrder {
            property: "price".to_string()
        }]
    );
    assert!(native_filters(&plan).is_empty());
}

#[test]
fn test_not_equal_and_not_in_are_residual() {
    let plan = translate(
        &QuerySpec::new()
            .filter(Filter::ne("name", "lamp"))
            .filter(Filter::not_in("color", vec!["red", "blue"])),
    );

    assert!(plan.fallbacks().contains(&Fallback::NotEqual {
        property: "name".to_string()
    }));
    assert!(plan.fallbacks().contains(&Fallback::NotIn {
        property: "color".to_string()
    }));
    assert_eq!(plan.branches()[0].residual.len(), 2);
    // Nothing native constrains the scan, so nothing is pushed down
    assert!(plan.branches()[0].query.limit.is_none());
}

#[test]
fn test_is_null_lowering() {
    let null = translate(&QuerySpec::new().filter(Filter::is_null("color", true)));
    assert!(null.is_direct());
    assert_eq!(
        native_filters(&null)[0],
        PropertyFilter::new("color", Operator::Equal, Value::Null)
    );

    let not_null = translate(&QuerySpec::new().filter(Filter::is_null("color", false)));
    assert_eq!(not_null.branches()[0].residual[0].op, Operator::NotEqual);
}

#[test]
fn test_excluded_keys_disclosed() {
    let plan = translate(
        &QuerySpec::new()
            .exclude_keys(vec![Id::Int(1), Id::Int(2)])
            .limit(3),
    );

    assert!(plan.fallbacks().contains(&Fallback::ExcludedKeys { count: 2 }));
    assert_eq!(plan.exclude, vec![Key::new("item", 1), Key::new("item", 2)]);
    // Limit stays client-side so excluded rows do not eat into it
    assert_eq!(plan.limit, Some(3));
    assert!(plan.branches()[0].query.limit.is_none());
}

// =============================================================================
// OR / IN Tests
// =============================================================================

#[test]
fn test_in_expands_into_branches() {
    let plan = translate(&QuerySpec::new().filter(Filter::is_in("name", vec!["a", "b", "c"])));

    assert_eq!(plan.branches().len(), 3);
    assert!(plan
        .fallbacks()
        .contains(&Fallback::MultiQueryMerge { branches: 3 }));
    for branch in plan.branches() {
        assert_eq!(branch.query.filters.len(), 1);
        assert_eq!(branch.query.filters[0].op, Operator::Equal);
    }
}

#[test]
fn test_and_of_ors_is_a_cartesian_product() {
    let plan = translate(&QuerySpec::new().filter(Filter::and(vec![
        Filter::or(vec![Filter::exact("name", "a"), Filter::exact("name", "b")]),
        Filter::or(vec![
            Filter::exact("color", "red"),
            Filter::exact("color", "blue"),
        ]),
    ])));

    assert_eq!(plan.branches().len(), 4);
    assert!(plan
        .branches()
        .iter()
        .all(|branch| branch.query.filters.len() == 2));
}

#[test]
fn test_branch_cap() {
    let config = Config::builder().max_query_branches(2).build().unwrap();
    let err = translate_with(
        &config,
        &QuerySpec::new().filter(Filter::is_in("name", vec!["a", "b", "c"])),
    )
    .unwrap_err();

    assert!(matches!(err, AdapterError::NotSupported(_)));
}

#[test]
fn test_empty_in_is_a_no_op() {
    let plan = translate(&QuerySpec::new().filter(Filter::is_in("name", Vec::<&str>::new())));

    assert_eq!(plan.strategy, Strategy::NoOp);
    assert!(plan.branches().is_empty());
}

#[test]
fn test_empty_in_drops_only_its_or_branch() {
    let plan = translate(&QuerySpec::new().filter(Filter::or(vec![
        Filter::is_in("name", Vec::<&str>::new()),
        Filter::exact("name", "x"),
    ])));

    assert_eq!(plan.branches().len(), 1);
}

#[test]
fn test_zero_limit_is_a_no_op() {
    let plan = translate(&QuerySpec::new().limit(0));
    assert_eq!(plan.strategy, Strategy::NoOp);
}

#[test]
fn test_multi_branch_limit_covers_offset() {
    let plan = translate(
        &QuerySpec::new()
            .filter(Filter::is_in("name", vec!["a", "b"]))
            .order_by(&["price"])
            .offset(2)
            .limit(3),
    );

    for branch in plan.branches() {
        assert_eq!(branch.query.limit, Some(5));
        assert_eq!(branch.query.offset, 0);
    }
    assert_eq!(plan.offset, 2);
    assert_eq!(plan.limit, Some(3));
}

// =============================================================================
// Primary Key Tests
// =============================================================================

#[test]
fn test_pk_equality_becomes_key_lookup() {
    let plan = translate(&QuerySpec::new().filter(Filter::exact("pk", 5i64)));

    match &plan.strategy {
        Strategy::KeyLookup { keys, .. } => assert_eq!(keys, &vec![Key::new("item", 5)]),
        other => panic!("expected a key lookup, got {:?}", other),
    }
}

#[test]
fn test_pk_in_deduplicates_keys() {
    let plan = translate(&QuerySpec::new().filter(Filter::is_in("id", vec![1i64, 2, 1])));

    match &plan.strategy {
        Strategy::KeyLookup { keys, .. } => {
            assert_eq!(keys, &vec![Key::new("item", 1), Key::new("item", 2)])
        }
        other => panic!("expected a key lookup, got {:?}", other),
    }
}

#[test]
fn test_pk_range_is_a_native_key_filter() {
    let plan = translate(&QuerySpec::new().filter(Filter::gt("pk", 10i64)));

    assert!(plan.is_direct());
    assert_eq!(native_filters(&plan)[0].property, KEY_PROPERTY);
    assert_eq!(
        native_filters(&plan)[0].value,
        Value::Key(Key::new("item", 10))
    );
}

// =============================================================================
// Shape Tests
// =============================================================================

#[test]
fn test_ordering_resolution() {
    let plan = translate(&QuerySpec::new().order_by(&["-price", "pk", "price"]));

    assert_eq!(plan.orders.len(), 2);
    assert_eq!(plan.orders[0].property, "price");
    assert_eq!(plan.orders[0].direction, Direction::Descending);
    assert_eq!(plan.orders[1].property, KEY_PROPERTY);
}

#[test]
fn test_projection_pushed_down() {
    let plan = translate(&QuerySpec::new().only(&["name"]));

    assert!(plan.is_partial());
    assert_eq!(plan.branches()[0].query.projection, vec!["name".to_string()]);
}

#[test]
fn test_count_runs_keys_only() {
    let plan = translate(&QuerySpec::new().aggregate(Aggregate::Count));

    assert!(plan.branches()[0].query.keys_only);
    assert!(plan.fallbacks().is_empty());
}

#[test]
fn test_sum_needs_full_rows() {
    let plan = translate(&QuerySpec::new().aggregate(Aggregate::Sum("price".to_string())));

    assert!(plan.fallbacks().contains(&Fallback::ClientAggregate));
    assert!(!plan.branches()[0].query.keys_only);
}

#[test]
fn test_ancestor_carried_to_every_branch() {
    let parent = Key::new("shop", 1);
    let plan = translate(
        &QuerySpec::new()
            .ancestor(parent.clone())
            .filter(Filter::is_in("name", vec!["a", "b"])),
    );

    assert!(plan
        .branches()
        .iter()
        .all(|branch| branch.query.ancestor.as_ref() == Some(&parent)));
}

#[test]
fn test_unknown_field_rejected() {
    let err = translate_with(
        &Config::default(),
        &QuerySpec::new().filter(Filter::exact("weight", 3i64)),
    )
    .unwrap_err();

    assert!(matches!(err, AdapterError::Codec(_)));
}

#[test]
fn test_list_field_takes_scalar_operand() {
    let plan = translate(&QuerySpec::new().filter(Filter::exact("sizes", 42i64)));

    assert_eq!(native_filters(&plan)[0].value, Value::Integer(42));
}
