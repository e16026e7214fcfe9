//! Transaction Module
//!
//! Transaction demarcation, write buffering and the RPC primitives every
//! higher layer calls through.
//!
//! ## Responsibilities
//! - Open, join, suspend, commit and roll back backend transactions
//! - Buffer writes per transaction and flush them in one commit
//! - Replay the transaction body on commit conflicts (bounded, with backoff)
//! - Retry idempotent reads on transient failures; never retry writes
//! - Serve reads from the write buffer before going remote
//!
//! ## Transaction Stack
//! ```text
//! atomic()                  push Transaction(ctx A)     ── begin A
//! └─ atomic()               push Joined                 ── reuses A
//!    └─ atomic(independent) push Transaction(ctx B)     ── begin B, commit B
//!    └─ non_atomic()        push Suspended              ── no transaction
//!                           pop ... commit A once at the outermost scope
//! ```

mod context;
mod coordinator;
mod retry;

pub use context::TransactionContext;
pub use coordinator::Refresh;
pub use retry::{AttemptError, RetryPolicy};

/// How an `atomic` scope relates to an enclosing transaction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Propagation {
    /// Join the enclosing transaction, or open one if there is none
    #[default]
    Nested,
    /// Always open and commit a separate remote transaction
    Independent,
}

/// Options of an `atomic` scope
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionOptions {
    pub propagation: Propagation,
    /// Fail unless a transaction is already open
    pub mandatory: bool,
    /// Open a read-only remote transaction; staging writes fails
    pub read_only: bool,
}

impl TransactionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn independent() -> Self {
        Self {
            propagation: Propagation::Independent,
            ..Self::default()
        }
    }

    pub fn mandatory() -> Self {
        Self {
            mandatory: true,
            ..Self::default()
        }
    }

    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Self::default()
        }
    }

    pub fn with_propagation(mut self, propagation: Propagation) -> Self {
        self.propagation = propagation;
        self
    }
}
