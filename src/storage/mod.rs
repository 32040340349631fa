//! In-memory storage for aerocursor
//!
//! Provides the collections, the namespace catalog, and the concrete scans
//! that query cursors consume through `index::IndexScan`.
//!
//! # Locking
//!
//! - Each collection has its own `RwLock` (the per-call read/write scope)
//! - The catalog lock is the database-wide scope
//! - No lock is held between two scan steps

mod catalog;
mod collection;
mod errors;
mod scan;

pub use catalog::{
    read_collection, split_namespace, write_collection, Catalog, CatalogScope, CollectionHandle,
};
pub use collection::{Collection, ID_INDEX_NAME};
pub use errors::{StorageError, StorageErrorCode, StorageResult};
pub use scan::{BTreeIndexScan, TableScan};
