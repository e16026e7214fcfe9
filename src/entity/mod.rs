//! Entity Module
//!
//! The store's native data model.
//!
//! ## Responsibilities
//! - Keys: hierarchical `(kind, id)` paths, partial until the store assigns an id
//! - Values: tagged union of scalars, references, embedded maps and arrays
//! - Entities: a key plus a property bag, no fixed schema
//!
//! ## Ordering
//! Values order by type rank first, then by value:
//! ```text
//! null < integer < timestamp < boolean < blob < text < float < key < embedded
//! ```

mod key;
mod record;
mod value;

pub use key::{Id, Key, PathElement};
pub use record::Entity;
pub use value::Value;
