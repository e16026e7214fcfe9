//! Query Module
//!
//! Translates ORM query specifications into native queries and executes
//! the resulting plans lazily.
//!
//! ## Responsibilities
//! - Expand OR/IN into branches and split each branch's filters into what
//!   the backend runs natively and what is evaluated client-side
//! - Disclose every client-side fallback on the plan
//! - Stream decoded rows page by page through hidden cursors
//!
//! ## Plan Execution
//! ```text
//! QuerySpec ──► QueryTranslator ──► QueryPlan ──► Rows (Iterator)
//!                                                   │
//!                  branch 1: run_query ─► page ─┐   │
//!                  branch 2: run_query ─► page ─┼─► merge ─► residual ─► window ─► decode
//!                  branch N: run_query ─► page ─┘
//! ```
//!
//! Queries observe committed data only: writes staged in an open
//! transaction are not visible to queries until commit.

pub(crate) mod eval;
mod native;
mod plan;
mod results;
mod spec;

pub use native::{Direction, NativeQuery, Operator, PropertyFilter, PropertyOrder, KEY_PROPERTY};
pub use plan::{BranchPlan, Fallback, QueryPlan, QueryTranslator, Strategy};
pub use results::Rows;
pub use spec::{Aggregate, Condition, Filter, QuerySpec, PK_FIELD};
