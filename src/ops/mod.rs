//! Client operations for aerocursor
//!
//! Glue between requests and the cursor machinery: parsing find requests,
//! turning query cursors into result batches, saving client cursors for
//! getMore, and keeping plans and cursors consistent across writes.
//!
//! # Batch strategies
//!
//! - ordered: no sort, or every candidate supplies it
//! - reorder: no candidate supplies the sort; results are buffered and sorted
//! - hybrid: one in-order candidate races out-of-order ones
//!
//! # Invariants
//!
//! - A find that hits the scan-and-order memory limit because of a cached
//!   plan is retried exactly once
//! - getMore verifies the cursor's namespace before reading anything
//! - A cursor whose batch fails, or that has nothing left, is erased

mod batch;
mod current_op;
mod engine;
mod errors;
mod parsed;
mod principal;
mod query;
mod strategy;

pub use batch::{Batch, BatchLimits};
pub use current_op::{CurrentOp, CurrentOpRegistry, OpGuard, OpKind};
pub use engine::QueryEngine;
pub use errors::{OpsError, OpsResult};
pub use parsed::ParsedQuery;
pub use principal::Principal;
pub use query::{get_more, kill_cursors, run_query, QueryResponse};
pub use strategy::{BatchOutcome, Remainder, ResponseBuildStrategy, ResultShape};
