//! Transaction/RPC coordinator
//!
//! `atomic` scopes and the get/put/delete/query primitives, implemented on
//! [`Connection`].

use tracing::{debug, warn};

use crate::client::{Mutation, RemoteError};
use crate::connection::{Connection, Frame};
use crate::entity::{Entity, Key};
use crate::error::{AdapterError, Result};
use crate::model::{ModelInstance, ModelMeta};
use crate::query::{QueryPlan, QuerySpec, QueryTranslator, Rows};

use super::{AttemptError, Propagation, TransactionContext, TransactionOptions};

/// Outcome of [`Connection::refresh_if_unread`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    /// Already read in this transaction; left untouched
    AlreadyRead,
    Refreshed,
    /// No stored entity under the instance's key
    Missing,
}

impl Connection {
    // =========================================================================
    // Transaction Demarcation
    // =========================================================================

    /// Run `body` inside a transaction.
    ///
    /// A nested scope joins the enclosing transaction; commit happens once
    /// at the outermost scope. When this scope owns the transaction, `body`
    /// is replayed after commit conflicts up to `max_transaction_attempts`.
    pub fn atomic<T, F>(&mut self, options: TransactionOptions, mut body: F) -> Result<T>
    where
        F: FnMut(&mut Connection) -> Result<T>,
    {
        if options.mandatory && !self.in_atomic_block() {
            return Err(AdapterError::TransactionFailed(
                "a mandatory transaction requires an enclosing atomic block".to_string(),
            ));
        }

        if options.propagation == Propagation::Nested && self.in_atomic_block() {
            self.stack.push(Frame::Joined);
            let result = body(self);
            self.stack.pop();
            return result;
        }

        let retry = self.retry_policy().clone();
        retry.run(|attempt| self.run_attempt(options, attempt, &mut body))
    }

    /// `atomic` with only a propagation choice
    pub fn run_in_transaction<T, F>(&mut self, propagation: Propagation, body: F) -> Result<T>
    where
        F: FnMut(&mut Connection) -> Result<T>,
    {
        self.atomic(TransactionOptions::new().with_propagation(propagation), body)
    }

    /// Run `body` with any enclosing transaction suspended
    pub fn non_atomic<T, F>(&mut self, body: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        self.stack.push(Frame::Suspended);
        let result = body(self);
        self.stack.pop();
        result
    }

    fn run_attempt<T, F>(
        &mut self,
        options: TransactionOptions,
        attempt: u32,
        body: &mut F,
    ) -> std::result::Result<T, AttemptError>
    where
        F: FnMut(&mut Connection) -> Result<T>,
    {
        let id = self
            .client()
            .begin_transaction(options.read_only)
            .map_err(AdapterError::from)?;
        debug!(transaction = id.0, attempt, read_only = options.read_only, "Transaction started");

        let max_mutations = self.config().max_mutations_per_commit;
        self.stack.push(Frame::Transaction(TransactionContext::new(
            id,
            options.read_only,
            max_mutations,
        )));
        let outcome = body(self);

        let context = match self.stack.pop() {
            Some(Frame::Transaction(context)) => context,
            _ => {
                return Err(AttemptError::Failed(AdapterError::TransactionFailed(
                    "transaction stack out of balance".to_string(),
                )))
            }
        };

        match outcome {
            Ok(value) => {
                self.commit_context(context)?;
                Ok(value)
            }
            Err(err) => {
                self.rollback_quietly(context);
                Err(err.into())
            }
        }
    }

    fn commit_context(&self, context: TransactionContext) -> std::result::Result<(), AttemptError> {
        let id = context.id();
        let mutations = context.into_mutations();
        let count = mutations.len();

        match self.client().commit(Some(id), mutations) {
            Ok(_) => {
                debug!(transaction = id.0, mutations = count, "Transaction committed");
                Ok(())
            }
            Err(RemoteError::Conflict(reason)) => Err(AttemptError::Conflict(reason)),
            Err(err) => {
                // Outcome unknown; surfaced, never replayed
                warn!(transaction = id.0, %err, "Commit failed");
                if let Err(rollback_err) = self.client().rollback(id) {
                    debug!(transaction = id.0, %rollback_err, "Rollback after failed commit");
                }
                Err(AttemptError::Failed(err.into()))
            }
        }
    }

    fn rollback_quietly(&self, context: TransactionContext) {
        let id = context.id();
        match self.client().rollback(id) {
            Ok(()) => debug!(transaction = id.0, "Transaction rolled back"),
            Err(err) => warn!(transaction = id.0, %err, "Rollback failed"),
        }
    }

    // =========================================================================
    // Primitives
    // =========================================================================

    /// Fetch entities by key, aligned with `keys`.
    ///
    /// Inside a transaction, writes staged by that transaction are returned
    /// instead of the stored state.
    pub fn get(&mut self, keys: &[Key]) -> Result<Vec<Option<Entity>>> {
        if let Some(key) = keys.iter().find(|key| key.is_partial()) {
            return Err(AdapterError::InvalidKey(format!(
                "cannot read partial key {}",
                key
            )));
        }

        let mut results: Vec<Option<Entity>> = vec![None; keys.len()];
        let mut remote: Vec<(usize, Key)> = Vec::new();
        match self.current() {
            Some(context) => {
                for (index, key) in keys.iter().enumerate() {
                    match context.staged(key) {
                        Some(staged) => results[index] = staged.cloned(),
                        None => remote.push((index, key.clone())),
                    }
                }
            }
            None => remote.extend(keys.iter().cloned().enumerate()),
        }

        if !remote.is_empty() {
            let transaction = self.current_transaction();
            let remote_keys: Vec<Key> = remote.iter().map(|(_, key)| key.clone()).collect();
            let client = self.client();
            let found = self
                .retry_policy()
                .read("lookup", || client.lookup(&remote_keys, transaction))?;
            for ((index, _), entity) in remote.into_iter().zip(found) {
                results[index] = entity;
            }
        }

        if let Some(context) = self.current_mut() {
            context.mark_seen(keys);
        }
        Ok(results)
    }

    pub fn get_one(&mut self, key: &Key) -> Result<Option<Entity>> {
        Ok(self.get(std::slice::from_ref(key))?.pop().flatten())
    }

    /// Write entities, completing partial keys first.
    ///
    /// Inside a transaction the writes are staged until commit; otherwise
    /// they are committed immediately.
    pub fn put(&mut self, entities: Vec<Entity>) -> Result<Vec<Key>> {
        let mut completed = Vec::with_capacity(entities.len());
        for mut entity in entities {
            if entity.key().is_partial() {
                let key = self
                    .allocate_ids(entity.key(), 1)?
                    .pop()
                    .ok_or_else(|| AdapterError::InvalidKey("no id allocated".to_string()))?;
                entity.set_key(key);
            }
            completed.push(entity);
        }
        let keys: Vec<Key> = completed.iter().map(|e| e.key().clone()).collect();

        match self.current_mut() {
            Some(context) => {
                for entity in completed {
                    context.stage_put(entity)?;
                }
            }
            None => {
                self.commit_now(completed.into_iter().map(Mutation::Upsert).collect())?;
            }
        }
        Ok(keys)
    }

    pub fn delete(&mut self, keys: Vec<Key>) -> Result<()> {
        if let Some(key) = keys.iter().find(|key| key.is_partial()) {
            return Err(AdapterError::InvalidKey(format!(
                "cannot delete partial key {}",
                key
            )));
        }
        match self.current_mut() {
            Some(context) => {
                for key in keys {
                    context.stage_delete(key)?;
                }
                Ok(())
            }
            None => self.commit_now(keys.into_iter().map(Mutation::Delete).collect()),
        }
    }

    /// Non-transactional commit, chunked by the per-commit mutation cap
    fn commit_now(&self, mutations: Vec<Mutation>) -> Result<()> {
        let cap = self.config().max_mutations_per_commit;
        let mut remaining = mutations;
        while !remaining.is_empty() {
            let rest = remaining.split_off(remaining.len().min(cap));
            let count = remaining.len();
            self.client().commit(None, remaining)?;
            debug!(mutations = count, "Committed outside a transaction");
            remaining = rest;
        }
        Ok(())
    }

    /// Complete `count` copies of a partial key. Runs outside any
    /// transaction and takes effect immediately.
    pub fn allocate_ids(&self, key: &Key, count: usize) -> Result<Vec<Key>> {
        let client = self.client();
        self.retry_policy()
            .read("allocate_ids", || client.allocate_ids(key, count))
    }

    /// Keep caller-chosen numeric ids out of future allocations
    pub fn reserve_ids(&self, keys: &[Key]) -> Result<()> {
        let client = self.client();
        self.retry_policy()
            .read("reserve_ids", || client.reserve_ids(keys))
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn translate(&self, model: &ModelMeta, spec: &QuerySpec) -> Result<QueryPlan> {
        QueryTranslator::new(self.codec(), self.config()).translate(model, spec)
    }

    /// Lazily executed query, bound to the current transaction if any
    pub fn query(&self, model: &ModelMeta, spec: &QuerySpec) -> Result<Rows> {
        let plan = self.translate(model, spec)?;
        Ok(self.run_plan(model, plan))
    }

    pub fn run_plan(&self, model: &ModelMeta, plan: QueryPlan) -> Rows {
        Rows::new(
            self.client().clone(),
            self.current_transaction(),
            model.clone(),
            self.codec().clone(),
            plan,
            self.config().query_batch_size,
            self.retry_policy().clone(),
        )
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Whether `key` was fetched with `get` in the current transaction
    pub fn has_already_been_read(&self, key: &Key) -> bool {
        self.current().map_or(false, |context| context.has_seen(key))
    }

    /// Reload `instance` unless the current transaction already read it
    pub fn refresh_if_unread(
        &mut self,
        model: &ModelMeta,
        instance: &mut ModelInstance,
    ) -> Result<Refresh> {
        let id = instance.pk().cloned().ok_or_else(|| {
            AdapterError::InvalidKey(format!("{} instance has no primary key", model.kind()))
        })?;
        let key = self.codec().derive_key(model, Some(id));
        if self.has_already_been_read(&key) {
            return Ok(Refresh::AlreadyRead);
        }
        match self.get_one(&key)? {
            Some(entity) => {
                *instance = self.codec().decode(model, &entity)?;
                Ok(Refresh::Refreshed)
            }
            None => Ok(Refresh::Missing),
        }
    }
}
