//! Index primitives for aerocursor
//!
//! Indexes are in-memory `BTreeSet`s of compound keys, one per key pattern.
//!
//! # Design Principles
//!
//! - One total order over every JSON value
//! - Compound keys honour per-field direction
//! - Duplicate keys are ordered by primary key
//! - Scans are consumed through the `IndexScan` trait only

mod bounds;
mod btree;
mod errors;
mod scan;

pub use bounds::{IndexBounds, Interval, IntervalSet};
pub use btree::{lookup_path, Direction, IndexEntry, IndexKey, IndexTree, KeyPart, KeyPattern};
pub use errors::{IndexError, IndexErrorCode, IndexResult};
pub use scan::{IndexScan, ScanDirection};
