//! aerocursor - multi-plan query cursors for a document store
//!
//! Queries are answered by racing candidate plans over an in-memory
//! collection, one index scan per plan, until one plan proves itself.
//! Results are returned in batches; the rest of a query waits in a client
//! cursor until the client asks for more.

pub mod api;
pub mod cli;
pub mod cursor;
pub mod executor;
pub mod index;
pub mod observability;
pub mod ops;
pub mod planner;
pub mod storage;
