//! Client Module
//!
//! The backend contract the adapter is written against, plus an in-process
//! implementation used by tests, benches and the demo binary.
//!
//! ## Responsibilities
//! - Transactions: begin, commit (optionally transactional), rollback
//! - Point reads by key and paged queries with opaque cursors
//! - Id allocation and reservation of caller-chosen ids
//!
//! ## Commit Semantics
//! ```text
//! begin_transaction ──► lookup / run_query (tx) ──► commit(tx, mutations)
//!                                                     │
//!                 any key read or written was changed │ since begin
//!                 by another commit ──────────────────┴──► Conflict
//! ```
//!
//! Backend failures are reported as [`RemoteError`]; the transaction
//! coordinator maps them onto [`AdapterError`](crate::AdapterError).

mod cursor;
mod memory;

pub use cursor::Cursor;
pub use memory::{MemoryDatastore, RpcKind, RpcStats};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entity::{Entity, Key};
use crate::query::NativeQuery;

/// Result type for backend calls
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Failure reported by the backend
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("not found: {0}")]
    NotFound(String),

    /// Optimistic concurrency collision; the transaction is gone
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Handle of an open backend transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub u64);

/// A single write applied at commit
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Insert or overwrite; a partial key is completed by the backend
    Upsert(Entity),
    Delete(Key),
}

impl Mutation {
    pub fn key(&self) -> &Key {
        match self {
            Mutation::Upsert(entity) => entity.key(),
            Mutation::Delete(key) => key,
        }
    }
}

/// Outcome of a successful commit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitResponse {
    /// Final key of every mutation, in mutation order
    pub keys: Vec<Key>,
    pub mutation_count: usize,
}

/// One page of query results
#[derive(Debug, Clone, PartialEq)]
pub struct QueryBatch {
    pub results: Vec<Entity>,
    /// Resume point after the last returned result
    pub end_cursor: Option<Cursor>,
    pub more_results: bool,
}

/// Backend operations the adapter depends on
pub trait DatastoreClient: Send + Sync {
    fn begin_transaction(&self, read_only: bool) -> RemoteResult<TransactionId>;

    /// Apply `mutations` atomically, inside `transaction` when given
    fn commit(
        &self,
        transaction: Option<TransactionId>,
        mutations: Vec<Mutation>,
    ) -> RemoteResult<CommitResponse>;

    fn rollback(&self, transaction: TransactionId) -> RemoteResult<()>;

    /// Fetch entities by key; the result is aligned with `keys`
    fn lookup(
        &self,
        keys: &[Key],
        transaction: Option<TransactionId>,
    ) -> RemoteResult<Vec<Option<Entity>>>;

    /// Run one page of a query, resuming from `cursor`
    fn run_query(
        &self,
        query: &NativeQuery,
        cursor: Option<&Cursor>,
        batch_size: usize,
        transaction: Option<TransactionId>,
    ) -> RemoteResult<QueryBatch>;

    /// Complete `count` copies of a partial key with fresh numeric ids
    fn allocate_ids(&self, key: &Key, count: usize) -> RemoteResult<Vec<Key>>;

    /// Keep the numeric ids of `keys` out of future allocations
    fn reserve_ids(&self, keys: &[Key]) -> RemoteResult<()>;
}
