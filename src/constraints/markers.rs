//! Marker reservation and release
//!
//! All marker writes are staged in the caller's open transaction, so a
//! marker is committed or discarded together with the entity it guards.
//! Two transactions racing for the same marker both read it; the backend
//! rejects the second commit as a conflict and the retry loop replays it,
//! at which point the marker is seen as taken.

use std::collections::HashSet;

use chrono::Utc;
use tracing::{trace, warn};

use crate::config::Config;
use crate::connection::Connection;
use crate::entity::{Entity, Key, Value};
use crate::error::{AdapterError, Result};
use crate::model::ModelMeta;

use super::identifiers::{
    self, MarkerIdentifier, MARKER_INSTANCE, MARKER_UPDATED_AT,
};

/// Owner recorded on a stored marker
enum Owner {
    Itself,
    Other(Key),
    /// Owner property missing or NULL
    Nobody,
}

/// Maintains the markers of one model
#[derive(Debug, Clone, Copy)]
pub struct UniqueMarkerManager<'a> {
    model: &'a ModelMeta,
    enabled: bool,
}

impl<'a> UniqueMarkerManager<'a> {
    pub fn new(model: &'a ModelMeta, config: &Config) -> Self {
        Self {
            model,
            enabled: model.constraints_enabled(config.enforce_constraint_checks),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Identifiers `entity` claims; empty when checks are disabled
    pub fn identifiers(&self, entity: &Entity) -> Result<Vec<MarkerIdentifier>> {
        if !self.enabled {
            return Ok(Vec::new());
        }
        identifiers::unique_identifiers(self.model, entity)
    }

    pub fn check_in_memory(&self, entities: &[Entity]) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        identifiers::check_in_memory(self.model, entities)
    }

    /// Claim `identifiers` for `owner` inside the current transaction.
    ///
    /// Fails with `UniqueConstraintViolation` when a marker belongs to
    /// another live entity. Markers whose owner is gone are reclaimed.
    pub fn reserve(
        &self,
        conn: &mut Connection,
        owner: &Key,
        identifiers: &[MarkerIdentifier],
    ) -> Result<()> {
        if identifiers.is_empty() {
            return Ok(());
        }
        require_transaction(conn)?;

        let keys: Vec<Key> = identifiers
            .iter()
            .map(|identifier| identifier.key(conn.namespace()))
            .collect();
        let stored = conn.get(&keys)?;

        let mut claims = Vec::new();
        for ((identifier, key), marker) in identifiers.iter().zip(keys).zip(stored) {
            let Some(marker) = marker else {
                claims.push(new_marker(key, owner));
                continue;
            };
            match owner_of(&marker, owner) {
                Owner::Itself => {}
                Owner::Nobody => {
                    warn!(marker = %key, "Reclaiming marker without an owner");
                    claims.push(new_marker(key, owner));
                }
                Owner::Other(other) => {
                    if conn.get_one(&other)?.is_some() {
                        return Err(identifier.violation(self.model));
                    }
                    warn!(marker = %key, stale_owner = %other, "Reclaiming stale marker");
                    claims.push(new_marker(key, owner));
                }
            }
        }

        trace!(owner = %owner, markers = claims.len(), "Reserving unique markers");
        conn.put(claims)?;
        Ok(())
    }

    /// Delete the markers in `identifiers` that `owner` holds (or that no
    /// live entity holds)
    pub fn release(
        &self,
        conn: &mut Connection,
        owner: &Key,
        identifiers: &[MarkerIdentifier],
    ) -> Result<()> {
        if identifiers.is_empty() {
            return Ok(());
        }
        require_transaction(conn)?;

        let keys: Vec<Key> = identifiers
            .iter()
            .map(|identifier| identifier.key(conn.namespace()))
            .collect();
        let stored = conn.get(&keys)?;

        let mut released = Vec::new();
        for (key, marker) in keys.into_iter().zip(stored) {
            let Some(marker) = marker else {
                continue;
            };
            match owner_of(&marker, owner) {
                Owner::Itself | Owner::Nobody => released.push(key),
                Owner::Other(other) => {
                    trace!(marker = %key, holder = %other, "Marker held by another entity, kept");
                }
            }
        }

        trace!(owner = %owner, markers = released.len(), "Releasing unique markers");
        conn.delete(released)
    }

    /// Claim every marker of a newly written entity
    pub fn acquire_for(&self, conn: &mut Connection, entity: &Entity) -> Result<()> {
        let identifiers = self.identifiers(entity)?;
        self.reserve(conn, entity.key(), &identifiers)
    }

    /// Release every marker of a deleted entity
    pub fn release_for(&self, conn: &mut Connection, entity: &Entity) -> Result<()> {
        let identifiers = self.identifiers(entity)?;
        self.release(conn, entity.key(), &identifiers)
    }

    /// Move markers from `previous` to `updated` (same key): claim the new
    /// combinations first, then drop the ones no longer used
    pub fn swap(&self, conn: &mut Connection, previous: &Entity, updated: &Entity) -> Result<()> {
        let old = self.identifiers(previous)?;
        let new = self.identifiers(updated)?;

        let old_names: HashSet<&str> = old.iter().map(|i| i.name.as_str()).collect();
        let new_names: HashSet<&str> = new.iter().map(|i| i.name.as_str()).collect();

        let added: Vec<MarkerIdentifier> = new
            .iter()
            .filter(|i| !old_names.contains(i.name.as_str()))
            .cloned()
            .collect();
        let removed: Vec<MarkerIdentifier> = old
            .iter()
            .filter(|i| !new_names.contains(i.name.as_str()))
            .cloned()
            .collect();

        self.reserve(conn, updated.key(), &added)?;
        self.release(conn, previous.key(), &removed)
    }
}

fn require_transaction(conn: &Connection) -> Result<()> {
    if conn.in_atomic_block() {
        Ok(())
    } else {
        Err(AdapterError::TransactionFailed(
            "unique markers can only change inside a transaction".to_string(),
        ))
    }
}

fn owner_of(marker: &Entity, owner: &Key) -> Owner {
    match marker.get(MARKER_INSTANCE) {
        Some(Value::Key(holder)) if holder == owner => Owner::Itself,
        Some(Value::Key(holder)) => Owner::Other(holder.clone()),
        _ => Owner::Nobody,
    }
}

fn new_marker(key: Key, owner: &Key) -> Entity {
    Entity::new(key)
        .with(MARKER_INSTANCE, Value::Key(owner.clone()))
        .with(MARKER_UPDATED_AT, Value::Timestamp(Utc::now()))
}
