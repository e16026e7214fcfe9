//! Transaction context
//!
//! Write buffer and read bookkeeping for one open backend transaction.

use std::collections::{HashMap, HashSet};

use tracing::trace;

use crate::client::{Mutation, TransactionId};
use crate::entity::{Entity, Key};
use crate::error::{AdapterError, Result};

/// State of one remote transaction while it is open
#[derive(Debug)]
pub struct TransactionContext {
    id: TransactionId,
    read_only: bool,
    max_mutations: usize,
    /// Every staged write, in staging order
    log: Vec<Mutation>,
    /// Latest staged state per key; `None` means deleted
    staged: HashMap<Key, Option<Entity>>,
    seen_keys: HashSet<Key>,
}

impl TransactionContext {
    pub fn new(id: TransactionId, read_only: bool, max_mutations: usize) -> Self {
        Self {
            id,
            read_only,
            max_mutations,
            log: Vec::new(),
            staged: HashMap::new(),
            seen_keys: HashSet::new(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn stage_put(&mut self, entity: Entity) -> Result<()> {
        self.check_writable(entity.key())?;
        trace!(transaction = self.id.0, key = %entity.key(), "Staged put");
        self.staged
            .insert(entity.key().clone(), Some(entity.clone()));
        self.log.push(Mutation::Upsert(entity));
        Ok(())
    }

    pub fn stage_delete(&mut self, key: Key) -> Result<()> {
        self.check_writable(&key)?;
        trace!(transaction = self.id.0, %key, "Staged delete");
        self.staged.insert(key.clone(), None);
        self.log.push(Mutation::Delete(key));
        Ok(())
    }

    fn check_writable(&self, key: &Key) -> Result<()> {
        if self.read_only {
            return Err(AdapterError::TransactionFailed(format!(
                "cannot write {} in a read-only transaction",
                key
            )));
        }
        if key.is_partial() {
            return Err(AdapterError::InvalidKey(format!(
                "cannot stage a write for partial key {}",
                key
            )));
        }
        if !self.staged.contains_key(key) && self.staged.len() >= self.max_mutations {
            return Err(AdapterError::TransactionFailed(format!(
                "transaction exceeds {} mutations",
                self.max_mutations
            )));
        }
        Ok(())
    }

    /// Staged state of `key`: `Some(Some(_))` put, `Some(None)` deleted,
    /// `None` untouched by this transaction
    pub fn staged(&self, key: &Key) -> Option<Option<&Entity>> {
        self.staged.get(key).map(Option::as_ref)
    }

    pub fn mark_seen<'a>(&mut self, keys: impl IntoIterator<Item = &'a Key>) {
        self.seen_keys.extend(keys.into_iter().cloned());
    }

    pub fn has_seen(&self, key: &Key) -> bool {
        self.seen_keys.contains(key)
    }

    /// Number of distinct keys written
    pub fn mutation_count(&self) -> usize {
        self.staged.len()
    }

    /// Mutations to commit: the final write of every key, ordered by when
    /// that final write was staged
    pub fn into_mutations(self) -> Vec<Mutation> {
        let mut last: HashMap<&Key, usize> = HashMap::with_capacity(self.staged.len());
        for (index, mutation) in self.log.iter().enumerate() {
            last.insert(mutation.key(), index);
        }
        let keep: HashSet<usize> = last.into_values().collect();

        self.log
            .into_iter()
            .enumerate()
            .filter(|(index, _)| keep.contains(index))
            .map(|(_, mutation)| mutation)
            .collect()
    }
}
