//! Result batches
//!
//! A batch stops at a document count, a byte size, or both. The byte cap
//! is checked before each document is added, so a batch may run over by
//! the size of its last document but never splits one.

use serde_json::Value;

use crate::executor::{ExecutorConfig, Projection};

use super::parsed::ParsedQuery;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    pub max_docs: Option<usize>,
    pub max_bytes: usize,
}

impl BatchLimits {
    /// The batch a find returns
    ///
    /// With neither batch size nor limit the first batch is kept small
    /// (documents and bytes) so the client sees results quickly.
    pub fn first_batch(parsed: &ParsedQuery, config: &ExecutorConfig) -> Self {
        match parsed.batch_size.or(parsed.limit()) {
            Some(n) => Self {
                max_docs: Some(n),
                max_bytes: config.batch_max_bytes,
            },
            None => Self {
                max_docs: Some(config.first_batch_default_docs),
                max_bytes: config.first_batch_default_bytes,
            },
        }
    }

    /// A getMore batch; `batch_size == 0` is bounded by bytes alone
    pub fn get_more(batch_size: usize, config: &ExecutorConfig) -> Self {
        Self {
            max_docs: (batch_size > 0).then_some(batch_size),
            max_bytes: config.batch_max_bytes,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Batch {
    docs: Vec<Value>,
    bytes: usize,
    last_ts: Option<Value>,
    limits: BatchLimits,
}

impl Batch {
    pub fn new(limits: BatchLimits) -> Self {
        Self {
            docs: Vec::new(),
            bytes: 0,
            last_ts: None,
            limits,
        }
    }

    /// Appends `document` as the client will see it
    pub fn push(&mut self, document: &Value, projection: Option<&Projection>) {
        let shaped = match projection {
            Some(projection) => projection.apply(document),
            None => document.clone(),
        };
        self.bytes += serde_json::to_vec(&shaped).map(|b| b.len()).unwrap_or(0);
        self.last_ts = document.get("ts").cloned();
        self.docs.push(shaped);
    }

    pub fn is_full(&self) -> bool {
        self.limits.max_docs.is_some_and(|max| self.docs.len() >= max) || self.bytes >= self.limits.max_bytes
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }

    /// `ts` of the last document pushed, before projection
    pub fn last_ts(&self) -> Option<&Value> {
        self.last_ts.as_ref()
    }

    pub fn into_docs(self) -> Vec<Value> {
        self.docs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_doc_cap() {
        let mut batch = Batch::new(BatchLimits {
            max_docs: Some(2),
            max_bytes: usize::MAX,
        });
        batch.push(&json!({"_id": 1}), None);
        assert!(!batch.is_full());
        batch.push(&json!({"_id": 2}), None);
        assert!(batch.is_full());
    }

    #[test]
    fn test_byte_cap_never_splits_a_document() {
        let mut batch = Batch::new(BatchLimits {
            max_docs: None,
            max_bytes: 10,
        });
        batch.push(&json!({"_id": 1, "pad": "xxxxxxxxxxxxxxxx"}), None);
        assert_eq!(batch.len(), 1);
        assert!(batch.bytes() > 10);
        assert!(batch.is_full());
    }

    #[test]
    fn test_projection_and_ts() {
        let projection = Projection::parse(&json!({"a": 1})).unwrap().unwrap();
        let mut batch = Batch::new(BatchLimits::get_more(0, &ExecutorConfig::default()));
        batch.push(&json!({"_id": 1, "a": 2, "b": 3, "ts": 9}), Some(&projection));
        assert_eq!(batch.last_ts(), Some(&json!(9)));
        assert_eq!(batch.into_docs(), vec![json!({"_id": 1, "a": 2})]);
    }

    #[test]
    fn test_first_batch_defaults() {
        let config = ExecutorConfig::default();
        let parsed = ParsedQuery::parse(&json!({"ns": "db.c"})).unwrap();
        let limits = BatchLimits::first_batch(&parsed, &config);
        assert_eq!(limits.max_docs, Some(101));
        assert_eq!(limits.max_bytes, 1024 * 1024);

        let parsed = ParsedQuery::parse(&json!({"ns": "db.c", "batchSize": 7})).unwrap();
        let limits = BatchLimits::first_batch(&parsed, &config);
        assert_eq!(limits.max_docs, Some(7));
        assert_eq!(limits.max_bytes, 4 * 1024 * 1024);
    }
}
