//! In-memory sort for plans that cannot produce the requested order
//!
//! Documents are kept in a map keyed by (sort key, arrival sequence), so
//! equal keys stay in arrival order. With a limit only the best
//! `skip + limit` documents are retained. Retained bytes are capped.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::index::{KeyPart, KeyPattern};

use super::errors::{ExecutorError, ExecutorResult};

type SortKey = (Vec<KeyPart>, u64);

#[derive(Debug)]
pub struct ScanAndOrderBuffer {
    ns: String,
    sort: KeyPattern,
    entries: BTreeMap<SortKey, (Value, usize)>,
    capacity: Option<usize>,
    sequence: u64,
    approx_bytes: usize,
    max_bytes: usize,
}

impl ScanAndOrderBuffer {
    /// `limit == 0` means unlimited
    pub fn new(ns: impl Into<String>, sort: KeyPattern, skip: usize, limit: usize, max_bytes: usize) -> Self {
        Self {
            ns: ns.into(),
            sort,
            entries: BTreeMap::new(),
            capacity: (limit > 0).then(|| skip.saturating_add(limit)),
            sequence: 0,
            approx_bytes: 0,
            max_bytes,
        }
    }

    /// Adds a document, evicting the worst one when at capacity.
    ///
    /// Fails once retained documents would exceed the byte cap.
    pub fn add(&mut self, document: Value) -> ExecutorResult<()> {
        let key: SortKey = (self.sort.extract_key(&document), self.sequence);

        if let Some(capacity) = self.capacity {
            if self.entries.len() >= capacity {
                let Some(worst) = self.entries.keys().next_back() else {
                    return Ok(());
                };
                if key >= *worst {
                    return Ok(());
                }
                if let Some((_, (_, size))) = self.entries.pop_last() {
                    self.approx_bytes -= size;
                }
            }
        }

        let size = serde_json::to_vec(&document).map(|b| b.len()).unwrap_or(0);
        if self.approx_bytes + size > self.max_bytes {
            return Err(ExecutorError::memory_limit(&self.ns, self.max_bytes));
        }
        self.approx_bytes += size;
        self.sequence += 1;
        self.entries.insert(key, (document, size));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn approx_bytes(&self) -> usize {
        self.approx_bytes
    }

    /// Final ordered output with skip and limit applied
    pub fn fill(self, skip: usize, limit: usize) -> Vec<Value> {
        let take = if limit == 0 { usize::MAX } else { limit };
        self.entries
            .into_values()
            .map(|(document, _)| document)
            .skip(skip)
            .take(take)
            .collect()
    }
}
