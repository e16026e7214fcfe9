//! Lazy query results
//!
//! [`Rows`] walks a [`QueryPlan`] page by page. Each native branch is read
//! through hidden cursors; branches are merged by the plan's ordering with
//! key de-duplication, residual filters and exclusions are applied, and the
//! client-side window is enforced before decoding.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use tracing::trace;

use crate::client::{Cursor, DatastoreClient, TransactionId};
use crate::codec::EntityCodec;
use crate::entity::{Entity, Key};
use crate::error::Result;
use crate::model::{ModelInstance, ModelMeta};
use crate::transaction::RetryPolicy;

use super::eval;
use super::plan::{BranchPlan, QueryPlan, Strategy};

/// Paged reader over one native branch
struct BranchStream {
    buffer: VecDeque<Entity>,
    cursor: Option<Cursor>,
    exhausted: bool,
}

impl BranchStream {
    fn new() -> Self {
        Self {
            buffer: VecDeque::new(),
            cursor: None,
            exhausted: false,
        }
    }
}

enum State {
    Pending,
    Streaming(Vec<BranchStream>),
    Buffered(VecDeque<Entity>),
    Done,
}

/// Restartable, finite, lazily fetched sequence of decoded rows
pub struct Rows {
    client: Arc<dyn DatastoreClient>,
    transaction: Option<TransactionId>,
    model: ModelMeta,
    codec: EntityCodec,
    plan: QueryPlan,
    batch_size: usize,
    retry: RetryPolicy,
    state: State,
    seen: HashSet<Key>,
    skipped: usize,
    yielded: usize,
}

impl Rows {
    pub(crate) fn new(
        client: Arc<dyn DatastoreClient>,
        transaction: Option<TransactionId>,
        model: ModelMeta,
        codec: EntityCodec,
        plan: QueryPlan,
        batch_size: usize,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            transaction,
            model,
            codec,
            plan,
            batch_size,
            retry,
            state: State::Pending,
            seen: HashSet::new(),
            skipped: 0,
            yielded: 0,
        }
    }

    pub fn plan(&self) -> &QueryPlan {
        &self.plan
    }

    /// Start over from the first result; the next item re-queries the
    /// backend.
    pub fn restart(&mut self) {
        self.state = State::Pending;
        self.seen.clear();
        self.skipped = 0;
        self.yielded = 0;
    }

    /// Next matching raw entity, shaped but not decoded
    pub(crate) fn next_entity(&mut self) -> Option<Result<Entity>> {
        match self.advance() {
            Ok(Some(entity)) => Some(Ok(entity)),
            Ok(None) => {
                self.state = State::Done;
                None
            }
            Err(err) => {
                self.state = State::Done;
                Some(Err(err))
            }
        }
    }

    fn advance(&mut self) -> Result<Option<Entity>> {
        if let State::Pending = self.state {
            self.state = self.start()?;
        }

        loop {
            if self.plan.limit.map_or(false, |limit| self.yielded >= limit) {
                return Ok(None);
            }

            let candidate = match &mut self.state {
                State::Buffered(buffer) => buffer.pop_front(),
                State::Streaming(_) => None,
                State::Pending | State::Done => return Ok(None),
            };
            let candidate = match candidate {
                Some(entity) => Some(entity),
                None if matches!(self.state, State::Streaming(_)) => self.next_merged()?,
                None => None,
            };
            let Some(candidate) = candidate else {
                return Ok(None);
            };

            if self.plan.exclude.contains(candidate.key()) {
                continue;
            }
            if self.skipped < self.plan.offset {
                self.skipped += 1;
                continue;
            }
            self.yielded += 1;
            return Ok(Some(self.shape(candidate)));
        }
    }

    fn start(&self) -> Result<State> {
        match &self.plan.strategy {
            Strategy::NoOp => Ok(State::Done),
            Strategy::Native(branches) => Ok(State::Streaming(
                branches.iter().map(|_| BranchStream::new()).collect(),
            )),
            Strategy::KeyLookup { keys, branches } => {
                let client = &self.client;
                let transaction = self.transaction;
                let found = self
                    .retry
                    .read("lookup", || client.lookup(keys, transaction))?;
                let mut matched: Vec<Entity> = found
                    .into_iter()
                    .flatten()
                    .filter(|entity| branches.iter().any(|branch| branch.matches(entity)))
                    .collect();
                matched.sort_by(|a, b| eval::compare_entities(&self.plan.orders, a, b));
                Ok(State::Buffered(matched.into()))
            }
        }
    }

    /// Smallest head across branches that passes its branch's residual
    /// filters and has not been returned yet
    fn next_merged(&mut self) -> Result<Option<Entity>> {
        let branches = match &self.plan.strategy {
            Strategy::Native(branches) => branches,
            _ => return Ok(None),
        };
        let streams = match &mut self.state {
            State::Streaming(streams) => streams,
            _ => return Ok(None),
        };

        loop {
            for (stream, branch) in streams.iter_mut().zip(branches) {
                fill(
                    stream,
                    branch,
                    &self.client,
                    self.transaction,
                    self.batch_size,
                    &self.retry,
                )?;
            }

            let mut best: Option<usize> = None;
            for (index, stream) in streams.iter().enumerate() {
                let Some(head) = stream.buffer.front() else {
                    continue;
                };
                let better = match best.and_then(|b| streams[b].buffer.front()) {
                    Some(current) => eval::compare_entities(&self.plan.orders, head, current).is_lt(),
                    None => true,
                };
                if better {
                    best = Some(index);
                }
            }

            let Some(index) = best else {
                return Ok(None);
            };
            let Some(entity) = streams[index].buffer.pop_front() else {
                return Ok(None);
            };

            if !branches[index].residual.iter().all(|f| f.matches(&entity)) {
                continue;
            }
            if !self.seen.insert(entity.key().clone()) {
                continue;
            }
            return Ok(Some(entity));
        }
    }

    /// Apply keys-only and projection to a fully fetched entity
    fn shape(&self, mut entity: Entity) -> Entity {
        if self.plan.keys_only {
            return entity.key_only();
        }
        if !self.plan.projection.is_empty() {
            entity.retain_properties(&self.plan.projection);
        }
        entity
    }

    fn decode(&self, entity: &Entity) -> Result<ModelInstance> {
        if self.plan.is_partial() {
            self.codec.decode_partial(&self.model, entity)
        } else {
            self.codec.decode(&self.model, entity)
        }
    }
}

fn fill(
    stream: &mut BranchStream,
    branch: &BranchPlan,
    client: &Arc<dyn DatastoreClient>,
    transaction: Option<TransactionId>,
    batch_size: usize,
    retry: &RetryPolicy,
) -> Result<()> {
    if !stream.buffer.is_empty() || stream.exhausted {
        return Ok(());
    }
    let cursor = stream.cursor.clone();
    let batch = retry.read("run_query", || {
        client.run_query(&branch.query, cursor.as_ref(), batch_size, transaction)
    })?;
    trace!(
        kind = %branch.query.kind,
        fetched = batch.results.len(),
        more = batch.more_results,
        "Fetched query page"
    );
    stream.exhausted = !batch.more_results || batch.results.is_empty();
    stream.cursor = batch.end_cursor;
    stream.buffer.extend(batch.results);
    Ok(())
}

impl Iterator for Rows {
    type Item = Result<ModelInstance>;

    fn next(&mut self) -> Option<Self::Item> {
        let entity = match self.next_entity()? {
            Ok(entity) => entity,
            Err(err) => return Some(Err(err)),
        };
        let decoded = self.decode(&entity);
        if decoded.is_err() {
            self.state = State::Done;
        }
        Some(decoded)
    }
}
