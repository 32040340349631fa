//! Query execution for aerocursor
//!
//! Turns a parsed query into a `QueryCursor` and supplies the pieces result
//! builders need around it.
//!
//! # Cursor kinds
//!
//! - `ScanCursor`: one plan, or the winner of a race continuing alone
//! - `InterleavingCursor`: several candidate plans advanced in turn
//! - `OrClauseSequencer`: one cursor per `$or` clause, run in sequence
//!
//! # Invariants
//!
//! - A document present for the whole query is returned exactly once
//!   after `getsetdup` filtering
//! - Only a plan that has produced the threshold number of matches, or
//!   has run out of entries, is recorded as the winner
//! - A raised interrupt fails the next `advance()` and every one after it

mod chunk_filter;
mod config;
mod cursor;
mod dedup;
mod errors;
mod generator;
mod interleaving;
mod interrupt;
mod matcher;
mod multi_plan;
mod or_sequencer;
mod projection;
mod runner;
mod scan_and_order;

pub use chunk_filter::ChunkFilter;
pub use config::ExecutorConfig;
pub use cursor::{QueryCursor, ScanCursor, TakeoverHistory};
pub use dedup::DupSet;
pub use errors::{ExecutorError, ExecutorErrorCode, ExecutorResult, Severity};
pub use generator::{clause_cursor, new_query_cursor, CursorContext, CursorRequest};
pub use interleaving::InterleavingCursor;
pub use interrupt::Interrupt;
pub use matcher::{Matcher, PredicateMatcher};
pub use multi_plan::{MultiPlanScanner, StepOutcome};
pub use or_sequencer::OrClauseSequencer;
pub use projection::Projection;
pub use runner::PlanRunner;
pub use scan_and_order::ScanAndOrderBuffer;
