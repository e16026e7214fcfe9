//! Adapter Module
//!
//! Row-level operations an ORM issues against a [`Connection`].
//!
//! ## Responsibilities
//! - Insert rows atomically with their unique markers and key allocation
//! - Update rows by key or by query, swapping markers as values change
//! - Delete rows by key or by query in bounded transactions
//! - Fetch, select, count and aggregate through the query translator
//!
//! ## Write Path
//! ```text
//! insert(rows)
//!    │
//!    ├─► encode ─► in-batch unique check ─► allocate / reserve ids
//!    │
//!    └─► atomic ┬─► existing-key check
//!               ├─► reserve markers      (staged)
//!               └─► put entities         (staged) ─► commit
//! ```
//!
//! [`Connection`]: crate::connection::Connection

mod read;
mod write;
