//! Namespace catalog
//!
//! Maps `db.collection` namespaces to shared collection handles. Each
//! collection sits behind its own `RwLock`, which is the read/write scope
//! held for the duration of a single scan step or write. The catalog's own
//! lock is the broader, database-wide scope.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::collection::Collection;
use super::errors::{StorageError, StorageResult};

/// Shared handle to one collection
pub type CollectionHandle = Arc<RwLock<Collection>>;

/// Guard over the whole catalog, held while tearing down cursors in bulk
pub type CatalogScope<'a> = RwLockReadGuard<'a, BTreeMap<String, CollectionHandle>>;

/// Splits `db.collection` into its parts
pub fn split_namespace(ns: &str) -> Option<(&str, &str)> {
    let (db, coll) = ns.split_once('.')?;
    if db.is_empty() || coll.is_empty() {
        return None;
    }
    Some((db, coll))
}

/// Read access to a collection, recovering from poisoning
pub fn read_collection(handle: &CollectionHandle) -> RwLockReadGuard<'_, Collection> {
    handle.read().unwrap_or_else(PoisonError::into_inner)
}

/// Write access to a collection, recovering from poisoning
pub fn write_collection(handle: &CollectionHandle) -> RwLockWriteGuard<'_, Collection> {
    handle.write().unwrap_or_else(PoisonError::into_inner)
}

/// All collections known to the process
#[derive(Debug, Default)]
pub struct Catalog {
    collections: RwLock<BTreeMap<String, CollectionHandle>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Database-wide read scope
    pub fn read_scope(&self) -> CatalogScope<'_> {
        self.collections.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_scope(&self) -> RwLockWriteGuard<'_, BTreeMap<String, CollectionHandle>> {
        self.collections.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, ns: &str) -> Option<CollectionHandle> {
        self.read_scope().get(ns).cloned()
    }

    /// Returns the collection, creating it on first use
    pub fn get_or_create(&self, ns: &str) -> StorageResult<CollectionHandle> {
        if split_namespace(ns).is_none() {
            return Err(StorageError::invalid_namespace(ns));
        }
        if let Some(handle) = self.get(ns) {
            return Ok(handle);
        }
        let mut collections = self.write_scope();
        let handle = collections
            .entry(ns.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(Collection::new(ns))));
        Ok(Arc::clone(handle))
    }

    /// Removes one collection; returns whether it existed
    pub fn drop_collection(&self, ns: &str) -> bool {
        self.write_scope().remove(ns).is_some()
    }

    /// Removes every collection of a database; returns the dropped namespaces
    pub fn drop_database(&self, db: &str) -> Vec<String> {
        let prefix = format!("{}.", db);
        let mut collections = self.write_scope();
        let dropped: Vec<String> = collections
            .keys()
            .filter(|ns| ns.starts_with(&prefix))
            .cloned()
            .collect();
        for ns in &dropped {
            collections.remove(ns);
        }
        dropped
    }

    pub fn namespaces(&self) -> Vec<String> {
        self.read_scope().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_split_namespace() {
        assert_eq!(split_namespace("db.c"), Some(("db", "c")));
        assert_eq!(split_namespace("db.c.sub"), Some(("db", "c.sub")));
        assert_eq!(split_namespace("db."), None);
        assert_eq!(split_namespace("nodot"), None);
    }

    #[test]
    fn test_get_or_create_shares_handle() {
        let catalog = Catalog::new();
        let a = catalog.get_or_create("db.c").unwrap();
        write_collection(&a).insert(json!({"_id": 1})).unwrap();
        let b = catalog.get_or_create("db.c").unwrap();
        assert_eq!(read_collection(&b).len(), 1);
        assert!(catalog.get_or_create("bad").is_err());
    }

    #[test]
    fn test_drop_database_only_matches_prefix() {
        let catalog = Catalog::new();
        catalog.get_or_create("db.a").unwrap();
        catalog.get_or_create("db.b").unwrap();
        catalog.get_or_create("dbx.a").unwrap();

        let mut dropped = catalog.drop_database("db");
        dropped.sort();
        assert_eq!(dropped, vec!["db.a".to_string(), "db.b".to_string()]);
        assert_eq!(catalog.namespaces(), vec!["dbx.a".to_string()]);
        assert!(!catalog.drop_collection("db.a"));
    }
}
