//! In-memory collections
//!
//! Documents are kept in primary key (`_id`) order, which is also the
//! natural order seen by table scans. Every collection owns an `_id_` index
//! plus any secondary indexes; all indexes are updated synchronously with
//! each write.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::index::{IndexKey, IndexTree, KeyPattern};

use super::errors::{StorageError, StorageResult};

/// Name of the primary key index
pub const ID_INDEX_NAME: &str = "_id_";

/// One namespace's documents and indexes
#[derive(Debug)]
pub struct Collection {
    ns: String,
    documents: BTreeMap<IndexKey, Value>,
    indexes: Vec<IndexTree>,
}

impl Collection {
    /// Creates an empty collection with its `_id_` index
    pub fn new(ns: impl Into<String>) -> Self {
        Self {
            ns: ns.into(),
            documents: BTreeMap::new(),
            indexes: vec![IndexTree::new(ID_INDEX_NAME, KeyPattern::id())],
        }
    }

    pub fn ns(&self) -> &str {
        &self.ns
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn documents(&self) -> &BTreeMap<IndexKey, Value> {
        &self.documents
    }

    pub fn get(&self, pk: &IndexKey) -> Option<&Value> {
        self.documents.get(pk)
    }

    pub fn indexes(&self) -> &[IndexTree] {
        &self.indexes
    }

    pub fn index(&self, name: &str) -> Option<&IndexTree> {
        self.indexes.iter().find(|i| i.name() == name)
    }

    pub fn index_by_pattern(&self, pattern: &KeyPattern) -> Option<&IndexTree> {
        self.indexes.iter().find(|i| i.pattern() == pattern)
    }

    fn primary_key(&self, document: &Value) -> StorageResult<IndexKey> {
        if !document.is_object() {
            return Err(StorageError::invalid_document(format!(
                "documents for '{}' must be JSON objects",
                self.ns
            )));
        }
        document
            .get("_id")
            .map(IndexKey::from_json)
            .ok_or_else(|| StorageError::missing_id(&self.ns))
    }

    /// Inserts a new document; `_id` must be unique
    pub fn insert(&mut self, document: Value) -> StorageResult<IndexKey> {
        let pk = self.primary_key(&document)?;
        if self.documents.contains_key(&pk) {
            return Err(StorageError::duplicate_key(&self.ns, &pk.to_json()));
        }
        for index in &mut self.indexes {
            index.insert(&document, &pk);
        }
        self.documents.insert(pk.clone(), document);
        Ok(pk)
    }

    /// Inserts or replaces the document with the same `_id`.
    ///
    /// Returns the replaced document, if any.
    pub fn save(&mut self, document: Value) -> StorageResult<Option<Value>> {
        let pk = self.primary_key(&document)?;
        let previous = self.remove(&pk);
        for index in &mut self.indexes {
            index.insert(&document, &pk);
        }
        self.documents.insert(pk, document);
        Ok(previous)
    }

    /// Removes a document by primary key
    pub fn remove(&mut self, pk: &IndexKey) -> Option<Value> {
        let document = self.documents.remove(pk)?;
        for index in &mut self.indexes {
            index.remove(&document, pk);
        }
        Some(document)
    }

    /// Builds a new index over the current documents; returns its name
    pub fn create_index(&mut self, pattern: KeyPattern, name: Option<String>) -> StorageResult<String> {
        let name = name.unwrap_or_else(|| pattern.default_name());
        if self.index(&name).is_some() || self.index_by_pattern(&pattern).is_some() {
            return Err(StorageError::index_exists(&name));
        }
        let mut tree = IndexTree::new(name.clone(), pattern);
        for (pk, document) in &self.documents {
            tree.insert(document, pk);
        }
        self.indexes.push(tree);
        Ok(name)
    }

    /// Drops a secondary index
    pub fn drop_index(&mut self, name: &str) -> StorageResult<()> {
        if name == ID_INDEX_NAME {
            return Err(StorageError::id_index_required());
        }
        let position = self
            .indexes
            .iter()
            .position(|i| i.name() == name)
            .ok_or_else(|| StorageError::index_not_found(name))?;
        self.indexes.remove(position);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_collection_has_id_index() {
        let c = Collection::new("db.c");
        assert_eq!(c.indexes().len(), 1);
        assert_eq!(c.indexes()[0].name(), ID_INDEX_NAME);
    }

    #[test]
    fn test_insert_requires_unique_id() {
        let mut c = Collection::new("db.c");
        c.insert(json!({"_id": 1, "a": 1})).unwrap();
        assert!(c.insert(json!({"_id": 1, "a": 2})).is_err());
        assert!(c.insert(json!({"a": 2})).is_err());
        assert!(c.insert(json!(5)).is_err());
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn test_save_reindexes() {
        let mut c = Collection::new("db.c");
        c.create_index(KeyPattern::single("a"), None).unwrap();
        c.insert(json!({"_id": 1, "a": 1})).unwrap();
        let previous = c.save(json!({"_id": 1, "a": 9})).unwrap();
        assert_eq!(previous, Some(json!({"_id": 1, "a": 1})));

        let index = c.index("a_1").unwrap();
        assert_eq!(index.len(), 1);
        let (key, _) = index.entries().iter().next().unwrap();
        assert_eq!(key[0].key(), Some(&IndexKey::from_json(&json!(9))));
    }

    #[test]
    fn test_create_index_backfills() {
        let mut c = Collection::new("db.c");
        for i in 0..5 {
            c.insert(json!({"_id": i, "a": i % 2})).unwrap();
        }
        let name = c.create_index(KeyPattern::single("a"), None).unwrap();
        assert_eq!(c.index(&name).unwrap().len(), 5);
        assert!(c.create_index(KeyPattern::single("a"), None).is_err());
    }

    #[test]
    fn test_drop_index() {
        let mut c = Collection::new("db.c");
        c.create_index(KeyPattern::single("a"), None).unwrap();
        assert!(c.drop_index(ID_INDEX_NAME).is_err());
        assert!(c.drop_index("missing").is_err());
        c.drop_index("a_1").unwrap();
        assert_eq!(c.indexes().len(), 1);
    }
}
