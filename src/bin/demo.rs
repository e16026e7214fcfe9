//! Datastore Adapter Demo Binary
//!
//! Runs a short unique-constraint and query walkthrough against the
//! in-memory backend and reports the backend calls it made.

use std::sync::Arc;

use clap::Parser;
use datastore_adapter::{
    AdapterError, Config, Connection, FieldDef, Filter, MemoryDatastore, ModelInstance, ModelMeta,
    QuerySpec,
};
use tracing_subscriber::{fmt, EnvFilter};

/// Datastore Adapter Demo
#[derive(Parser, Debug)]
#[command(name = "datastore-adapter-demo")]
#[command(about = "Walk through unique markers and query translation on an in-memory store")]
#[command(version)]
struct Args {
    /// Key namespace for every entity written
    #[arg(short, long, default_value = "")]
    namespace: String,

    /// Number of users to insert
    #[arg(short, long, default_value = "20")]
    users: usize,

    /// Result page size
    #[arg(short, long, default_value = "5")]
    batch_size: usize,

    /// Disable unique-marker enforcement
    #[arg(long)]
    no_constraints: bool,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,datastore_adapter=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("Datastore Adapter Demo v{}", datastore_adapter::VERSION);

    if let Err(e) = run(&args) {
        tracing::error!("Demo failed: {}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), AdapterError> {
    let config = Config::builder()
        .namespace(&args.namespace)
        .enforce_constraint_checks(!args.no_constraints)
        .query_batch_size(args.batch_size.max(1))
        .build()?;

    let backend = Arc::new(MemoryDatastore::new());
    let mut conn = Connection::new(backend.clone(), config);

    let user = ModelMeta::new("user")
        .field(FieldDef::text("email").unique())
        .field(FieldDef::integer("age"))
        .field(FieldDef::text("city").nullable());

    // Unique email walkthrough
    let users: Vec<ModelInstance> = (0..args.users)
        .map(|i| {
            ModelInstance::new("user")
                .with("email", format!("user{}@example.com", i))
                .with("age", 18 + (i as i64 * 7) % 50)
                .with("city", if i % 2 == 0 { "Lisbon" } else { "Oslo" })
        })
        .collect();
    let inserted = conn.insert(&user, users)?;
    tracing::info!("Inserted {} users", inserted.len());

    let duplicate = ModelInstance::new("user")
        .with("email", "user0@example.com")
        .with("age", 40i64);
    match conn.insert(&user, vec![duplicate]) {
        Err(e @ AdapterError::UniqueConstraintViolation { .. }) => {
            for (field, message) in e.field_errors() {
                tracing::info!("Duplicate rejected on {}: {}", field, message);
            }
        }
        Err(e) => return Err(e),
        Ok(_) => tracing::warn!("Duplicate email was accepted"),
    }

    // Two inequality properties: one runs natively, one client-side
    let spec = QuerySpec::new()
        .filter(Filter::gte("age", 30i64))
        .filter(Filter::ne("city", "Oslo"))
        .order_by(&["age"]);
    let plan = conn.explain(&user, &spec)?;
    for fallback in plan.fallbacks() {
        tracing::info!("Client-side fallback: {:?}", fallback);
    }

    let mut matched = 0;
    for row in conn.select(&user, &spec)? {
        let row = row?;
        matched += 1;
        tracing::debug!(pk = ?row.pk(), age = ?row.get("age"), "Row");
    }
    tracing::info!("Query matched {} users", matched);
    tracing::info!("Stored markers: {}", backend.count_kind(datastore_adapter::UNIQUE_MARKER_KIND));

    let stats = backend.stats();
    println!("begin_transaction  {}", stats.begin_transaction);
    println!("commit             {}", stats.commit);
    println!("rollback           {}", stats.rollback);
    println!("lookup             {}", stats.lookup);
    println!("run_query          {}", stats.run_query);
    println!("allocate_ids       {}", stats.allocate_ids);
    println!("reserve_ids        {}", stats.reserve_ids);
    println!("conflicts          {}", stats.conflicts);
    Ok(())
}
