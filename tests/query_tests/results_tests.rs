//! Tests for query execution
//!
//! These tests verify:
//! - Residual filtering matches a full scan evaluated client-side
//! - Branch merging keeps the requested order and drops duplicates
//! - Paging through small batches, restart, offset and limit
//! - Keys-only, projection, excluded keys and key lookups
//! - Count and client-side aggregates

use std::collections::BTreeSet;
use std::sync::Arc;

use datastore_adapter::client::{RemoteError, RpcKind};
use datastore_adapter::{
    Aggregate, Config, Connection, FieldDef, FieldType, FieldValue, Filter, Id, MemoryDatastore,
    ModelInstance, ModelMeta, QuerySpec, TransactionOptions,
};

// =============================================================================
// Helper Functions
// =============================================================================

const ITEMS: i64 = 30;

fn item_model() -> ModelMeta {
    ModelMeta::new("item")
        .field(FieldDef::text("name"))
        .field(FieldDef::integer("price"))
        .field(FieldDef::float("rating"))
        .field(FieldDef::text("color").nullable())
        .field(FieldDef::list("sizes", FieldType::Integer).with_default(FieldValue::List(vec![])))
}

struct Row {
    id: i64,
    name: &'static str,
    price: i64,
    rating: f64,
    color: Option<&'static str>,
}

fn row(i: i64) -> Row {
    Row {
        id: i,
        name: ["a", "b", "c"][(i % 3) as usize],
        price: (i * 13) % ITEMS,
        rating: ((i * 7) % 10) as f64,
        color: match i % 4 {
            0 => None,
            1 | 3 => Some("red"),
            _ => Some("blue"),
        },
    }
}

fn instance(row: &Row) -> ModelInstance {
    ModelInstance::new("item")
        .with_pk(row.id)
        .with("name", row.name)
        .with("price", row.price)
        .with("rating", row.rating)
        .with(
            "color",
            row.color.map_or(FieldValue::Null, FieldValue::from),
        )
        .with(
            "sizes",
            FieldValue::List(vec![
                FieldValue::Integer(row.id % 5),
                FieldValue::Integer(row.id % 5 + 1),
            ]),
        )
}

fn setup_with(config: Config) -> (Arc<MemoryDatastore>, Connection) {
    let store = Arc::new(MemoryDatastore::new());
    let mut conn = Connection::new(store.clone(), config);
    let rows: Vec<ModelInstance> = (1..=ITEMS).map(|i| instance(&row(i))).collect();
    conn.insert(&item_model(), rows).unwrap();
    store.reset_stats();
    (store, conn)
}

fn setup() -> (Arc<MemoryDatastore>, Connection) {
    setup_with(Config::builder().query_batch_size(4).build().unwrap())
}

fn ids(conn: &Connection, spec: &QuerySpec) -> Vec<i64> {
    conn.select(&item_model(), spec)
        .unwrap()
        .map(|row| row.unwrap().pk().and_then(Id::as_int).unwrap())
        .collect()
}

fn expected_ids(predicate: impl Fn(&Row) -> bool) -> BTreeSet<i64> {
    (1..=ITEMS).map(row).filter(|r| predicate(r)).map(|r| r.id).collect()
}

fn price_of(id: i64) -> i64 {
    row(id).price
}

// =============================================================================
// Residual Filter Tests
// =============================================================================

#[test]
fn test_two_inequalities_match_full_scan() {
    let (_store, conn) = setup();
    let spec = QuerySpec::new()
        .filter(Filter::gt("price", 10i64))
        .filter(Filter::lt("rating", 5.0));

    let plan = conn.explain(&item_model(), &spec).unwrap();
    assert!(plan.uses_residual_filter());

    let found: BTreeSet<i64> = ids(&conn, &spec).into_iter().collect();
    assert_eq!(found, expected_ids(|r| r.price > 10 && r.rating < 5.0));
    assert!(!found.is_empty());
}

#[test]
fn test_residual_results_keep_sort_order() {
    let (_store, conn) = setup();
    let spec = QuerySpec::new()
        .filter(Filter::gte("price", 5i64))
        .filter(Filter::ne("color", "red"))
        .order_by(&["price"]);

    let found = ids(&conn, &spec);
    let prices: Vec<i64> = found.iter().map(|&id| price_of(id)).collect();
    let mut sorted = prices.clone();
    sorted.sort();

    assert_eq!(prices, sorted);
    assert_eq!(
        found.iter().copied().collect::<BTreeSet<_>>(),
        expected_ids(|r| r.price >= 5 && r.color != Some("red"))
    );
}

#[test]
fn test_not_in_and_is_not_null() {
    let (_store, conn) = setup();

    let not_in: BTreeSet<i64> = ids(
        &conn,
        &QuerySpec::new().filter(Filter::not_in("name", vec!["a", "b"])),
    )
    .into_iter()
    .collect();
    assert_eq!(not_in, expected_ids(|r| r.name == "c"));

    let colored: BTreeSet<i64> = ids(
        &conn,
        &QuerySpec::new().filter(Filter::is_null("color", false)),
    )
    .into_iter()
    .collect();
    assert_eq!(colored, expected_ids(|r| r.color.is_some()));

    let blank: BTreeSet<i64> = ids(
        &conn,
        &QuerySpec::new().filter(Filter::is_null("color", true)),
    )
    .into_iter()
    .collect();
    assert_eq!(blank, expected_ids(|r| r.color.is_none()));
}

#[test]
fn test_list_field_matches_any_element() {
    let (_store, conn) = setup();

    let found: BTreeSet<i64> = ids(&conn, &QuerySpec::new().filter(Filter::exact("sizes", 3i64)))
        .into_iter()
        .collect();
    assert_eq!(found, expected_ids(|r| r.id % 5 == 3 || r.id % 5 + 1 == 3));
}

// =============================================================================
// Merge Tests
// =============================================================================

#[test]
fn test_in_branches_merged_in_order() {
    let (_store, conn) = setup();
    let spec = QuerySpec::new()
        .filter(Filter::is_in("name", vec!["a", "c"]))
        .order_by(&["-price"]);

    let found = ids(&conn, &spec);
    let prices: Vec<i64> = found.iter().map(|&id| price_of(id)).collect();
    let mut sorted = prices.clone();
    sorted.sort_by(|a, b| b.cmp(a));

    assert_eq!(prices, sorted);
    assert_eq!(found.len(), expected_ids(|r| r.name != "b").len());
}

#[test]
fn test_overlapping_branches_deduplicated() {
    let (_store, conn) = setup();
    let spec = QuerySpec::new().filter(Filter::or(vec![
        Filter::lt("price", 10i64),
        Filter::exact("name", "a"),
    ]));

    let found = ids(&conn, &spec);
    let distinct: BTreeSet<i64> = found.iter().copied().collect();

    assert_eq!(found.len(), distinct.len());
    assert_eq!(distinct, expected_ids(|r| r.price < 10 || r.name == "a"));
}

#[test]
fn test_window_over_merged_branches() {
    let (_store, conn) = setup();
    let all = ids(
        &conn,
        &QuerySpec::new()
            .filter(Filter::is_in("name", vec!["a", "b"]))
            .order_by(&["price"]),
    );
    let window = ids(
        &conn,
        &QuerySpec::new()
            .filter(Filter::is_in("name", vec!["a", "b"]))
            .order_by(&["price"])
            .offset(3)
            .limit(4),
    );

    assert_eq!(window, all[3..7].to_vec());
}

// =============================================================================
// Paging Tests
// =============================================================================

#[test]
fn test_small_batches_return_everything_once() {
    let (store, conn) = setup_with(Config::builder().query_batch_size(1).build().unwrap());

    let found = ids(&conn, &QuerySpec::new().order_by(&["pk"]));

    assert_eq!(found, (1..=ITEMS).collect::<Vec<_>>());
    assert!(store.stats().run_query >= ITEMS as u64);
}

#[test]
fn test_restart_requeries() {
    let (store, conn) = setup();
    let mut rows = conn
        .select(&item_model(), &QuerySpec::new().order_by(&["pk"]))
        .unwrap();

    let first: Vec<_> = rows.by_ref().take(3).map(|r| r.unwrap()).collect();
    let calls = store.stats().run_query;
    rows.restart();
    let again: Vec<_> = rows.map(|r| r.unwrap()).collect();

    assert_eq!(first[..], again[..3]);
    assert_eq!(again.len(), ITEMS as usize);
    assert!(store.stats().run_query > calls);
}

#[test]
fn test_offset_and_limit_with_residual() {
    let (_store, conn) = setup();
    let base = QuerySpec::new()
        .filter(Filter::ne("color", "blue"))
        .order_by(&["pk"]);

    let all = ids(&conn, &base);
    let window = ids(&conn, &base.clone().offset(2).limit(5));

    assert_eq!(window, all[2..7].to_vec());
}

#[test]
fn test_transient_page_failure_retried() {
    let (store, conn) = setup();
    store.inject_failure(RpcKind::RunQuery, RemoteError::Unavailable("blip".into()));

    let found = ids(&conn, &QuerySpec::new());
    assert_eq!(found.len(), ITEMS as usize);
}

#[test]
fn test_page_failure_surfaces_as_error_item() {
    let (store, conn) = setup();
    for _ in 0..3 {
        store.inject_failure(RpcKind::RunQuery, RemoteError::Unavailable("down".into()));
    }

    let mut rows = conn.select(&item_model(), &QuerySpec::new()).unwrap();
    assert!(rows.next().unwrap().is_err());
    assert!(rows.next().is_none());
}

// =============================================================================
// Shape Tests
// =============================================================================

#[test]
fn test_keys_only_rows_carry_no_values() {
    let (_store, conn) = setup();
    let rows: Vec<ModelInstance> = conn
        .select(&item_model(), &QuerySpec::new().keys_only().limit(5))
        .unwrap()
        .map(|r| r.unwrap())
        .collect();

    assert_eq!(rows.len(), 5);
    assert!(rows.iter().all(|r| r.pk().is_some() && r.values().is_empty()));
}

#[test]
fn test_projection_keeps_requested_fields() {
    let (_store, conn) = setup();
    let rows: Vec<ModelInstance> = conn
        .select(&item_model(), &QuerySpec::new().only(&["name"]))
        .unwrap()
        .map(|r| r.unwrap())
        .collect();

    assert_eq!(rows.len(), ITEMS as usize);
    assert!(rows
        .iter()
        .all(|r| r.values().len() == 1 && r.get("name").is_some()));
}

#[test]
fn test_excluded_keys_skipped_before_limit() {
    let (_store, conn) = setup();
    let found = ids(
        &conn,
        &QuerySpec::new()
            .order_by(&["pk"])
            .exclude_keys(vec![Id::Int(1), Id::Int(2)])
            .limit(3),
    );

    assert_eq!(found, vec![3, 4, 5]);
}

#[test]
fn test_pk_lookup_uses_lookup() {
    let (store, conn) = setup();
    let found = ids(
        &conn,
        &QuerySpec::new().filter(Filter::is_in("pk", vec![5i64, 2, 99])),
    );

    let found: BTreeSet<i64> = found.into_iter().collect();
    assert_eq!(found, BTreeSet::from([2, 5]));
    assert_eq!(store.stats().run_query, 0);
    assert_eq!(store.stats().lookup, 1);
}

#[test]
fn test_pk_lookup_rechecks_other_filters() {
    let (_store, conn) = setup();
    let spec = QuerySpec::new()
        .filter(Filter::exact("pk", 3i64))
        .filter(Filter::exact("name", "b"));

    // Item 3 is named "a"
    assert!(ids(&conn, &spec).is_empty());
}

#[test]
fn test_empty_in_makes_no_backend_call() {
    let (store, conn) = setup();
    let found = ids(
        &conn,
        &QuerySpec::new().filter(Filter::is_in("name", Vec::<&str>::new())),
    );

    assert!(found.is_empty());
    assert_eq!(store.stats().run_query, 0);
}

#[test]
fn test_queries_do_not_see_staged_writes() {
    let (_store, mut conn) = setup();
    let model = item_model();

    conn.atomic(TransactionOptions::new(), |conn| {
        conn.insert(&model, vec![instance(&row(ITEMS + 1))])?;
        assert_eq!(conn.count(&model, &QuerySpec::new())?, ITEMS as usize);
        Ok(())
    })
    .unwrap();

    assert_eq!(conn.count(&model, &QuerySpec::new()).unwrap(), ITEMS as usize + 1);
}

// =============================================================================
// Aggregate Tests
// =============================================================================

#[test]
fn test_count_with_residual_filter() {
    let (_store, conn) = setup();
    let spec = QuerySpec::new()
        .filter(Filter::gt("price", 3i64))
        .filter(Filter::gt("rating", 2.0));

    assert_eq!(
        conn.count(&item_model(), &spec).unwrap(),
        expected_ids(|r| r.price > 3 && r.rating > 2.0).len()
    );
}

#[test]
fn test_sum_avg_min_max() {
    let (_store, conn) = setup();
    let model = item_model();
    let spec = QuerySpec::new().filter(Filter::exact("name", "b"));
    let prices: Vec<i64> = (1..=ITEMS)
        .map(row)
        .filter(|r| r.name == "b")
        .map(|r| r.price)
        .collect();
    let total: i64 = prices.iter().sum();

    assert_eq!(
        conn.aggregate(&model, &spec, Aggregate::Sum("price".into())).unwrap(),
        FieldValue::Integer(total)
    );
    assert_eq!(
        conn.aggregate(&model, &spec, Aggregate::Avg("price".into())).unwrap(),
        FieldValue::Float(total as f64 / prices.len() as f64)
    );
    assert_eq!(
        conn.aggregate(&model, &spec, Aggregate::Min("price".into())).unwrap(),
        FieldValue::Integer(*prices.iter().min().unwrap())
    );
    assert_eq!(
        conn.aggregate(&model, &spec, Aggregate::Max("price".into())).unwrap(),
        FieldValue::Integer(*prices.iter().max().unwrap())
    );
    assert_eq!(
        conn.aggregate(&model, &spec, Aggregate::Count).unwrap(),
        FieldValue::Integer(prices.len() as i64)
    );
}

#[test]
fn test_aggregate_over_no_rows_is_null() {
    let (_store, conn) = setup();
    let spec = QuerySpec::new().filter(Filter::exact("name", "zzz"));

    assert_eq!(
        conn.aggregate(&item_model(), &spec, Aggregate::Sum("price".into()))
            .unwrap(),
        FieldValue::Null
    );
    assert_eq!(conn.count(&item_model(), &spec).unwrap(), 0);
}

#[test]
fn test_sum_of_text_not_supported() {
    let (_store, conn) = setup();
    let err = conn
        .aggregate(&item_model(), &QuerySpec::new(), Aggregate::Sum("name".into()))
        .unwrap_err();

    assert!(matches!(err, datastore_adapter::AdapterError::NotSupported(_)));
}
