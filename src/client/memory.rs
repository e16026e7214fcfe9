//! In-memory backend
//!
//! A single-process stand-in for the real store with the same observable
//! contract: optimistic transactions that fail on contention, paged queries
//! with opaque cursors, and id allocation that never hands out reserved ids.
//!
//! ## Conflict Detection
//! Every commit bumps a global sequence number and stamps each written key
//! with it. A transaction remembers the sequence at `begin` plus every key
//! it read; at commit, if any read or written key carries a newer stamp the
//! commit fails with `Conflict` and the transaction is discarded.
//!
//! Failures can be queued per RPC with [`MemoryDatastore::inject_failure`]
//! so callers can exercise retry and error-translation paths.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use parking_lot::Mutex;
use tracing::debug;

use crate::entity::{Entity, Key};
use crate::query::{eval, NativeQuery};

use super::{
    CommitResponse, Cursor, DatastoreClient, Mutation, QueryBatch, RemoteError, RemoteResult,
    TransactionId,
};

/// Backend call, used to target injected failures and count calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcKind {
    BeginTransaction,
    Commit,
    Rollback,
    Lookup,
    RunQuery,
    AllocateIds,
    ReserveIds,
}

/// Call counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RpcStats {
    pub begin_transaction: u64,
    pub commit: u64,
    pub rollback: u64,
    pub lookup: u64,
    pub run_query: u64,
    pub allocate_ids: u64,
    pub reserve_ids: u64,
    /// Commits rejected because of contention
    pub conflicts: u64,
}

impl RpcStats {
    fn record(&mut self, rpc: RpcKind) {
        let counter = match rpc {
            RpcKind::BeginTransaction => &mut self.begin_transaction,
            RpcKind::Commit => &mut self.commit,
            RpcKind::Rollback => &mut self.rollback,
            RpcKind::Lookup => &mut self.lookup,
            RpcKind::RunQuery => &mut self.run_query,
            RpcKind::AllocateIds => &mut self.allocate_ids,
            RpcKind::ReserveIds => &mut self.reserve_ids,
        };
        *counter += 1;
    }
}

struct TxState {
    read_only: bool,
    start_sequence: u64,
    read_set: HashSet<Key>,
}

#[derive(Default)]
struct State {
    entities: BTreeMap<Key, Entity>,
    /// Sequence of the last commit that wrote each key, deletes included
    last_write: HashMap<Key, u64>,
    sequence: u64,
    transactions: HashMap<u64, TxState>,
    next_transaction: u64,
    next_id: i64,
    used_ids: BTreeSet<i64>,
    failures: HashMap<RpcKind, VecDeque<RemoteError>>,
    stats: RpcStats,
}

impl State {
    fn enter(&mut self, rpc: RpcKind) -> RemoteResult<()> {
        self.stats.record(rpc);
        match self.failures.get_mut(&rpc).and_then(VecDeque::pop_front) {
            Some(err) => {
                debug!(?rpc, %err, "Injected failure");
                Err(err)
            }
            None => Ok(()),
        }
    }

    fn allocate_id(&mut self) -> i64 {
        loop {
            self.next_id += 1;
            if self.used_ids.insert(self.next_id) {
                return self.next_id;
            }
        }
    }

    fn mark_used(&mut self, key: &Key) {
        if let Some(id) = key.id().and_then(|id| id.as_int()) {
            self.used_ids.insert(id);
        }
    }

    fn transaction(&mut self, id: TransactionId) -> RemoteResult<&mut TxState> {
        self.transactions.get_mut(&id.0).ok_or_else(|| {
            RemoteError::InvalidArgument(format!("unknown or expired transaction {}", id.0))
        })
    }

    fn record_reads<'a>(
        &mut self,
        transaction: Option<TransactionId>,
        keys: impl Iterator<Item = &'a Key>,
    ) -> RemoteResult<()> {
        if let Some(id) = transaction {
            let tx = self.transaction(id)?;
            tx.read_set.extend(keys.cloned());
        }
        Ok(())
    }

    /// Reject the whole batch before anything is written
    fn validate(mutations: &[Mutation]) -> RemoteResult<()> {
        for mutation in mutations {
            match mutation {
                Mutation::Upsert(entity) => {
                    let key = entity.key();
                    if key.parent().map_or(false, |parent| parent.is_partial()) {
                        return Err(RemoteError::InvalidArgument(format!(
                            "incomplete ancestor in key {}",
                            key
                        )));
                    }
                }
                Mutation::Delete(key) => {
                    if key.is_partial() {
                        return Err(RemoteError::InvalidArgument(format!(
                            "cannot delete partial key {}",
                            key
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Apply `mutations` in order, all or nothing
    fn apply(&mut self, mutations: Vec<Mutation>) -> RemoteResult<CommitResponse> {
        Self::validate(&mutations)?;

        self.sequence += 1;
        let sequence = self.sequence;
        let mutation_count = mutations.len();
        let mut keys = Vec::with_capacity(mutation_count);

        for mutation in mutations {
            match mutation {
                Mutation::Upsert(mut entity) => {
                    if entity.key().is_partial() {
                        let id = self.allocate_id();
                        if let Some(completed) = entity.key().completed(id) {
                            entity.set_key(completed);
                        }
                    }
                    let key = entity.key().clone();
                    self.mark_used(&key);
                    self.last_write.insert(key.clone(), sequence);
                    self.entities.insert(key.clone(), entity);
                    keys.push(key);
                }
                Mutation::Delete(key) => {
                    self.entities.remove(&key);
                    self.last_write.insert(key.clone(), sequence);
                    keys.push(key);
                }
            }
        }

        Ok(CommitResponse {
            keys,
            mutation_count,
        })
    }
}

/// Thread-safe in-process datastore
#[derive(Default)]
pub struct MemoryDatastore {
    state: Mutex<State>,
}

impl MemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next call of `rpc` with `err`. Queued failures are consumed
    /// in order, one per call.
    pub fn inject_failure(&self, rpc: RpcKind, err: RemoteError) {
        self.state
            .lock()
            .failures
            .entry(rpc)
            .or_default()
            .push_back(err);
    }

    pub fn stats(&self) -> RpcStats {
        self.state.lock().stats.clone()
    }

    pub fn reset_stats(&self) {
        self.state.lock().stats = RpcStats::default();
    }

    /// Committed entity under `key`, bypassing transactions and counters
    pub fn get_raw(&self, key: &Key) -> Option<Entity> {
        self.state.lock().entities.get(key).cloned()
    }

    /// Number of committed entities of `kind` across all namespaces
    pub fn count_kind(&self, kind: &str) -> usize {
        self.state
            .lock()
            .entities
            .keys()
            .filter(|key| key.kind() == kind)
            .count()
    }

    pub fn open_transactions(&self) -> usize {
        self.state.lock().transactions.len()
    }
}

impl DatastoreClient for MemoryDatastore {
    fn begin_transaction(&self, read_only: bool) -> RemoteResult<TransactionId> {
        let mut state = self.state.lock();
        state.enter(RpcKind::BeginTransaction)?;

        state.next_transaction += 1;
        let id = state.next_transaction;
        let start_sequence = state.sequence;
        state.transactions.insert(
            id,
            TxState {
                read_only,
                start_sequence,
                read_set: HashSet::new(),
            },
        );
        debug!(transaction = id, read_only, "Began transaction");
        Ok(TransactionId(id))
    }

    fn commit(
        &self,
        transaction: Option<TransactionId>,
        mutations: Vec<Mutation>,
    ) -> RemoteResult<CommitResponse> {
        let mut state = self.state.lock();
        if let Err(err) = state.enter(RpcKind::Commit) {
            // A failed commit ends the transaction either way
            if let Some(id) = transaction {
                state.transactions.remove(&id.0);
            }
            return Err(err);
        }

        let Some(id) = transaction else {
            return state.apply(mutations);
        };

        let tx = state.transactions.remove(&id.0).ok_or_else(|| {
            RemoteError::InvalidArgument(format!("unknown or expired transaction {}", id.0))
        })?;

        if tx.read_only {
            if !mutations.is_empty() {
                return Err(RemoteError::InvalidArgument(
                    "read-only transaction cannot commit mutations".to_string(),
                ));
            }
            return Ok(CommitResponse::default());
        }

        let contended = tx
            .read_set
            .iter()
            .chain(mutations.iter().map(Mutation::key))
            .find(|key| {
                state
                    .last_write
                    .get(*key)
                    .map_or(false, |&written| written > tx.start_sequence)
            });
        if let Some(key) = contended {
            let message = format!("{} was modified concurrently", key);
            state.stats.conflicts += 1;
            debug!(transaction = id.0, %key, "Commit conflict");
            return Err(RemoteError::Conflict(message));
        }

        let response = state.apply(mutations)?;
        debug!(
            transaction = id.0,
            mutations = response.mutation_count,
            "Committed transaction"
        );
        Ok(response)
    }

    fn rollback(&self, transaction: TransactionId) -> RemoteResult<()> {
        let mut state = self.state.lock();
        state.enter(RpcKind::Rollback)?;
        state
            .transactions
            .remove(&transaction.0)
            .map(|_| ())
            .ok_or_else(|| {
                RemoteError::InvalidArgument(format!(
                    "unknown or expired transaction {}",
                    transaction.0
                ))
            })
    }

    fn lookup(
        &self,
        keys: &[Key],
        transaction: Option<TransactionId>,
    ) -> RemoteResult<Vec<Option<Entity>>> {
        let mut state = self.state.lock();
        state.enter(RpcKind::Lookup)?;

        if let Some(key) = keys.iter().find(|key| key.is_partial()) {
            return Err(RemoteError::InvalidArgument(format!(
                "cannot look up partial key {}",
                key
            )));
        }
        state.record_reads(transaction, keys.iter())?;

        Ok(keys
            .iter()
            .map(|key| state.entities.get(key).cloned())
            .collect())
    }

    fn run_query(
        &self,
        query: &NativeQuery,
        cursor: Option<&Cursor>,
        batch_size: usize,
        transaction: Option<TransactionId>,
    ) -> RemoteResult<QueryBatch> {
        let mut state = self.state.lock();
        state.enter(RpcKind::RunQuery)?;

        let position = cursor.map(Cursor::position).transpose()?.unwrap_or(0);

        let mut matched: Vec<&Entity> = state
            .entities
            .values()
            .filter(|entity| query.matches(entity))
            .collect();
        matched.sort_by(|a, b| eval::compare_entities(&query.orders, a, b));

        let window_end = match query.limit {
            Some(limit) => matched.len().min(query.offset.saturating_add(limit)),
            None => matched.len(),
        };
        let start = query.offset.saturating_add(position).min(window_end);
        let end = start.saturating_add(batch_size.max(1)).min(window_end);

        let results: Vec<Entity> = matched[start..end]
            .iter()
            .map(|entity| {
                if query.keys_only {
                    entity.key_only()
                } else if !query.projection.is_empty() {
                    let mut projected = (*entity).clone();
                    projected.retain_properties(&query.projection);
                    projected
                } else {
                    (*entity).clone()
                }
            })
            .collect();

        let consumed = end.saturating_sub(query.offset);
        let more_results = end < window_end;

        let read_keys: Vec<Key> = results.iter().map(|entity| entity.key().clone()).collect();
        state.record_reads(transaction, read_keys.iter())?;

        Ok(QueryBatch {
            results,
            end_cursor: Some(Cursor::at(consumed)?),
            more_results,
        })
    }

    fn allocate_ids(&self, key: &Key, count: usize) -> RemoteResult<Vec<Key>> {
        let mut state = self.state.lock();
        state.enter(RpcKind::AllocateIds)?;

        (0..count)
            .map(|_| {
                let id = state.allocate_id();
                key.completed(id).ok_or_else(|| {
                    RemoteError::InvalidArgument(format!("{} is already complete", key))
                })
            })
            .collect()
    }

    fn reserve_ids(&self, keys: &[Key]) -> RemoteResult<()> {
        let mut state = self.state.lock();
        state.enter(RpcKind::ReserveIds)?;
        for key in keys {
            state.mark_used(key);
        }
        Ok(())
    }
}
