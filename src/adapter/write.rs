//! Insert, update and delete

use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use crate::connection::Connection;
use crate::constraints::UniqueMarkerManager;
use crate::entity::{Entity, Id, Key};
use crate::error::{AdapterError, Result};
use crate::model::{FieldValue, ModelInstance, ModelMeta};
use crate::query::{NativeQuery, QueryPlan, QuerySpec};
use crate::transaction::TransactionOptions;

impl Connection {
    // =========================================================================
    // Insert
    // =========================================================================

    /// Insert new rows, returning them with their primary keys assigned.
    ///
    /// The whole batch commits atomically: entities, unique markers and
    /// existence checks share one transaction.
    pub fn insert(
        &mut self,
        model: &ModelMeta,
        instances: Vec<ModelInstance>,
    ) -> Result<Vec<ModelInstance>> {
        if instances.is_empty() {
            return Ok(instances);
        }

        let mut entities = Vec::with_capacity(instances.len());
        let mut provided = Vec::new();
        for instance in &instances {
            if let Some(id) = instance.pk() {
                validate_pk(id)?;
            }
            let entity = self.codec().encode(model, instance)?;
            if entity.key().is_complete() {
                provided.push(entity.key().clone());
            }
            entities.push(entity);
        }

        let mut distinct = HashSet::new();
        if let Some(duplicate) = provided.iter().find(|key| !distinct.insert(*key)) {
            return Err(AdapterError::Integrity(format!(
                "Tried to INSERT {} twice in one batch",
                duplicate
            )));
        }

        let markers = UniqueMarkerManager::new(model, self.config());
        markers.check_in_memory(&entities)?;

        self.complete_keys(model, &mut entities)?;
        let reservable: Vec<Key> = provided
            .iter()
            .filter(|key| key.id().and_then(Id::as_int).is_some())
            .cloned()
            .collect();
        if !reservable.is_empty() {
            self.reserve_ids(&reservable)?;
        }

        let provided: HashSet<Key> = provided.into_iter().collect();
        self.atomic(TransactionOptions::new(), |conn| {
            let keys: Vec<Key> = entities.iter().map(|e| e.key().clone()).collect();
            let existing = conn.get(&keys)?;
            if let Some((key, _)) = keys
                .iter()
                .zip(&existing)
                .find(|(key, stored)| stored.is_some() && provided.contains(*key))
            {
                debug!(%key, "Insert over an existing key");
                return Err(AdapterError::Integrity(
                    "Tried to INSERT with existing key".to_string(),
                ));
            }

            for entity in &entities {
                markers.acquire_for(conn, entity)?;
            }
            conn.put(entities.clone())?;
            Ok(())
        })?;

        debug!(kind = model.kind(), rows = entities.len(), "Inserted rows");
        Ok(instances
            .into_iter()
            .zip(&entities)
            .map(|(mut instance, entity)| {
                instance.set_pk(entity.key().id().cloned());
                instance
            })
            .collect())
    }

    /// Allocate ids for every partial key in one backend call
    fn complete_keys(&self, model: &ModelMeta, entities: &mut [Entity]) -> Result<()> {
        let partial = entities.iter().filter(|e| e.key().is_partial()).count();
        if partial == 0 {
            return Ok(());
        }
        let template = self.codec().derive_key(model, None);
        let mut allocated = self.allocate_ids(&template, partial)?.into_iter();
        for entity in entities.iter_mut().filter(|e| e.key().is_partial()) {
            let key = allocated.next().ok_or_else(|| {
                AdapterError::InvalidKey(format!("backend allocated too few ids for {}", model.kind()))
            })?;
            entity.set_key(key);
        }
        Ok(())
    }

    // =========================================================================
    // Update
    // =========================================================================

    /// Write the values set on `instance` over the stored row.
    ///
    /// Returns `false` when no row exists under the instance's key.
    pub fn update(&mut self, model: &ModelMeta, instance: &ModelInstance) -> Result<bool> {
        let id = instance.pk().cloned().ok_or_else(|| {
            AdapterError::InvalidKey(format!("cannot update {} without a primary key", model.kind()))
        })?;
        let key = self.codec().derive_key(model, Some(id));
        let markers = UniqueMarkerManager::new(model, self.config());

        self.atomic(TransactionOptions::new(), |conn| {
            let Some(stored) = conn.get_one(&key)? else {
                return Ok(false);
            };
            let updated = conn.apply_values(model, &stored, instance.values())?;
            markers.swap(conn, &stored, &updated)?;
            conn.put(vec![updated])?;
            Ok(true)
        })
    }

    /// Set `values` on every row matching `spec`, returning the number of
    /// rows updated.
    ///
    /// Runs in a single transaction: a constraint violation on any row
    /// leaves every row unchanged. Each row is re-read and skipped if it no
    /// longer matches the query.
    pub fn update_where(
        &mut self,
        model: &ModelMeta,
        spec: &QuerySpec,
        values: &BTreeMap<String, FieldValue>,
    ) -> Result<usize> {
        let plan = self.translate(model, spec)?;
        let markers = UniqueMarkerManager::new(model, self.config());

        self.atomic(TransactionOptions::new(), |conn| {
            let keys = conn.matching_keys(model, spec)?;
            let mut updated_rows = 0;
            for key in &keys {
                let Some(stored) = conn.get_one(key)? else {
                    continue;
                };
                if !plan.matches(&stored) {
                    debug!(%key, "Row no longer matches the update query, skipped");
                    continue;
                }
                let updated = conn.apply_values(model, &stored, values)?;
                markers.swap(conn, &stored, &updated)?;
                conn.put(vec![updated])?;
                updated_rows += 1;
            }
            Ok(updated_rows)
        })
    }

    fn apply_values(
        &self,
        model: &ModelMeta,
        stored: &Entity,
        values: &BTreeMap<String, FieldValue>,
    ) -> Result<Entity> {
        let mut updated = stored.clone();
        for (name, value) in values {
            let field = model.get_field(name).ok_or_else(|| {
                AdapterError::Codec(format!("{} has no field named {}", model.kind(), name))
            })?;
            updated.set(field.column.clone(), self.codec().encode_field(field, value)?);
        }
        Ok(updated)
    }

    // =========================================================================
    // Delete
    // =========================================================================

    /// Delete rows by primary key, releasing their unique markers.
    /// Returns the number of rows that existed.
    pub fn delete_rows(&mut self, model: &ModelMeta, ids: Vec<Id>) -> Result<usize> {
        let keys: Vec<Key> = ids
            .into_iter()
            .map(|id| self.codec().derive_key(model, Some(id)))
            .collect();
        self.delete_keys(model, &keys, None)
    }

    /// Delete every row matching `spec`. Rows are re-checked against the
    /// query inside each delete transaction.
    pub fn delete_where(&mut self, model: &ModelMeta, spec: &QuerySpec) -> Result<usize> {
        let plan = self.translate(model, spec)?;
        let keys = self.matching_keys(model, spec)?;
        self.delete_keys(model, &keys, Some(&plan))
    }

    /// Deletes in transactions of `delete_batch_size` entities
    fn delete_keys(
        &mut self,
        model: &ModelMeta,
        keys: &[Key],
        recheck: Option<&QueryPlan>,
    ) -> Result<usize> {
        let markers = UniqueMarkerManager::new(model, self.config());
        let batch_size = self.config().delete_batch_size;
        let mut deleted = 0;

        for batch in keys.chunks(batch_size) {
            deleted += self.atomic(TransactionOptions::new(), |conn| {
                let stored = conn.get(batch)?;
                let mut doomed = Vec::new();
                for entity in stored.into_iter().flatten() {
                    if recheck.map_or(false, |plan| !plan.matches(&entity)) {
                        continue;
                    }
                    markers.release_for(conn, &entity)?;
                    doomed.push(entity.key().clone());
                }
                let count = doomed.len();
                conn.delete(doomed)?;
                Ok(count)
            })?;
        }

        debug!(kind = model.kind(), rows = deleted, "Deleted rows");
        Ok(deleted)
    }

    /// Keys of the rows matching `spec`, in query order
    fn matching_keys(&self, model: &ModelMeta, spec: &QuerySpec) -> Result<Vec<Key>> {
        let mut rows = self.query(model, &spec.clone().keys_only())?;
        let mut keys = Vec::new();
        while let Some(entity) = rows.next_entity() {
            keys.push(entity?.key().clone());
        }
        Ok(keys)
    }

    /// Delete every entity of `kind` in this connection's namespace,
    /// markers included if `kind` is the marker kind. Bypasses unique
    /// constraint bookkeeping.
    pub fn flush_kind(&mut self, kind: &str) -> Result<usize> {
        let mut query = NativeQuery::new(self.namespace(), kind);
        query.keys_only = true;

        let client = self.client().clone();
        let batch_size = self.config().query_batch_size;
        let mut keys = Vec::new();
        let mut cursor = None;
        loop {
            let batch = self.retry_policy().read("run_query", || {
                client.run_query(&query, cursor.as_ref(), batch_size, None)
            })?;
            keys.extend(batch.results.iter().map(|e| e.key().clone()));
            if !batch.more_results || batch.results.is_empty() {
                break;
            }
            cursor = batch.end_cursor;
        }

        let count = keys.len();
        for batch in keys.chunks(self.config().delete_batch_size) {
            self.non_atomic(|conn| conn.delete(batch.to_vec()))?;
        }
        debug!(kind, entities = count, "Flushed kind");
        Ok(count)
    }
}

fn validate_pk(id: &Id) -> Result<()> {
    match id {
        Id::Int(0) => Err(AdapterError::Integrity(
            "The datastore doesn't support 0 as a key value".to_string(),
        )),
        Id::Name(name) if name.starts_with("__") => Err(AdapterError::NotSupported(format!(
            "Datastore ids cannot start with __. Id was {}",
            name
        ))),
        Id::Name(name) if name.is_empty() => {
            Err(AdapterError::InvalidKey("key names cannot be empty".to_string()))
        }
        _ => Ok(()),
    }
}
