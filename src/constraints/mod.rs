//! Constraints Module
//!
//! Emulates unique constraints with marker entities.
//!
//! ## Responsibilities
//! - Derive a deterministic marker key per unique value combination
//! - Reserve markers in the writer's transaction, failing on values held
//!   by another live entity
//! - Swap markers on update and release them on delete
//!
//! ## Marker Lifecycle
//! ```text
//! insert email=a@x   ──► marker user|email:<h(a@x)> { instance: user(1) }
//! insert email=a@x   ──► marker exists, owner user(1) live ──► violation
//! delete user(1)     ──► marker deleted in the same commit
//! insert email=a@x   ──► marker free ──► claimed by the new entity
//! ```
//!
//! Deleting an entity with the raw `Connection::delete` primitive bypasses
//! this module and leaves its markers behind. Such markers are reclaimed
//! the next time their value is claimed, once their owner is found missing.

mod identifiers;
mod markers;

pub use identifiers::{
    check_in_memory, format_identifier_value, marker_key, unique_identifiers, MarkerIdentifier,
    MARKER_INSTANCE, MARKER_UPDATED_AT, UNIQUE_MARKER_KIND,
};
pub use markers::UniqueMarkerManager;
