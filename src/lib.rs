//! # Datastore Adapter
//!
//! An ORM backend adapter for a schemaless, Datastore-style document store:
//! - Model instances encoded as native entities with deterministic keys
//! - Unique constraints emulated with marker entities
//! - Nested, independent and suspended transaction scopes with bounded
//!   conflict retry
//! - Relational-style queries translated into native queries, with
//!   disclosed client-side fallbacks for what the store cannot run
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Adapter (ORM surface)                     │
//! │        insert / update / delete / select / aggregate         │
//! └──────┬───────────────────────┬───────────────────────┬──────┘
//!        │                       │                       │
//! ┌──────▼──────┐        ┌───────▼───────┐       ┌───────▼───────┐
//! │ Constraints │        │     Query     │       │     Codec     │
//! │  (markers)  │        │ (translator)  │       │ (key/entity)  │
//! └──────┬──────┘        └───────┬───────┘       └───────────────┘
//!        │                       │
//! ┌──────▼───────────────────────▼──────────────────────────────┐
//! │             Connection + Transaction Coordinator             │
//! │       (transaction stack, write buffer, retry policy)        │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!              ┌────────▼────────┐
//!              │ DatastoreClient │
//!              │    (backend)    │
//!              └─────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod entity;
pub mod model;
pub mod codec;
pub mod client;
pub mod connection;
pub mod transaction;
pub mod constraints;
pub mod query;
pub mod adapter;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{AdapterError, Result};
pub use config::{Config, ConfigBuilder};
pub use entity::{Entity, Id, Key, Value};
pub use model::{FieldDef, FieldType, FieldValue, ModelInstance, ModelMeta};
pub use codec::EntityCodec;
pub use client::{
    Cursor, DatastoreClient, MemoryDatastore, Mutation, RemoteError, RemoteResult, RpcKind,
    RpcStats, TransactionId,
};
pub use connection::Connection;
pub use transaction::{Propagation, Refresh, TransactionOptions};
pub use constraints::{MarkerIdentifier, UniqueMarkerManager, UNIQUE_MARKER_KIND};
pub use query::{Aggregate, Condition, Fallback, Filter, QueryPlan, QuerySpec, Rows, Strategy};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of the adapter
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
