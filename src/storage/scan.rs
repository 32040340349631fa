//! Concrete scans over in-memory collections
//!
//! Scans never hold a collection lock between calls. Each `advance()` takes
//! the collection's read scope, re-seeks strictly past the last examined
//! entry, and copies out the next document. Concurrent writes are therefore
//! tolerated: removed entries are simply not seen, and entries that move
//! behind the scan position are skipped.

use std::ops::Bound;
use std::sync::Arc;

use serde_json::Value;

use crate::index::{
    IndexBounds, IndexEntry, IndexKey, IndexScan, KeyPart, KeyPattern, ScanDirection,
};

use super::catalog::{read_collection, CollectionHandle};

/// Natural-order scan over every document (primary key order)
pub struct TableScan {
    handle: CollectionHandle,
    direction: ScanDirection,
    pattern: KeyPattern,
    position: Option<IndexKey>,
    current: Option<(IndexKey, Value)>,
    nscanned: u64,
}

impl TableScan {
    pub fn new(handle: CollectionHandle, direction: ScanDirection) -> Self {
        let mut scan = Self {
            handle,
            direction,
            pattern: KeyPattern::empty(),
            position: None,
            current: None,
            nscanned: 0,
        };
        scan.seek_next();
        scan
    }

    fn seek_next(&mut self) {
        let handle = Arc::clone(&self.handle);
        let collection = read_collection(&handle);
        let documents = collection.documents();

        let next = match (self.direction, &self.position) {
            (ScanDirection::Forward, None) => documents.iter().next(),
            (ScanDirection::Forward, Some(p)) => documents
                .range::<IndexKey, _>((Bound::Excluded(p), Bound::Unbounded))
                .next(),
            (ScanDirection::Backward, None) => documents.iter().next_back(),
            (ScanDirection::Backward, Some(p)) => documents
                .range::<IndexKey, _>((Bound::Unbounded, Bound::Excluded(p)))
                .next_back(),
        };

        match next {
            Some((pk, document)) => {
                self.nscanned += 1;
                self.position = Some(pk.clone());
                self.current = Some((pk.clone(), document.clone()));
            }
            None => self.current = None,
        }
    }
}

impl IndexScan for TableScan {
    fn ok(&self) -> bool {
        self.current.is_some()
    }

    fn advance(&mut self) -> bool {
        if self.current.is_some() {
            self.seek_next();
        }
        self.ok()
    }

    fn current(&self) -> Option<&Value> {
        self.current.as_ref().map(|(_, doc)| doc)
    }

    fn curr_key(&self) -> Option<&[KeyPart]> {
        self.current.as_ref().map(|_| &[] as &[KeyPart])
    }

    fn curr_pk(&self) -> Option<&IndexKey> {
        self.current.as_ref().map(|(pk, _)| pk)
    }

    fn key_pattern(&self) -> &KeyPattern {
        &self.pattern
    }

    fn bounds(&self) -> Option<&IndexBounds> {
        None
    }

    fn nscanned(&self) -> u64 {
        self.nscanned
    }

    fn nscanned_objects(&self) -> u64 {
        self.nscanned
    }

    fn describe(&self) -> String {
        match self.direction {
            ScanDirection::Forward => "BasicCursor".to_string(),
            ScanDirection::Backward => "ReverseCursor".to_string(),
        }
    }
}

/// Bounded scan over one secondary (or `_id`) index
pub struct BTreeIndexScan {
    handle: CollectionHandle,
    index_name: String,
    pattern: KeyPattern,
    bounds: IndexBounds,
    direction: ScanDirection,
    ranges: Vec<(Bound<KeyPart>, Bound<KeyPart>)>,
    range_idx: usize,
    position: Option<IndexEntry>,
    current: Option<(IndexEntry, Value)>,
    nscanned: u64,
    nscanned_objects: u64,
}

impl BTreeIndexScan {
    pub fn new(
        handle: CollectionHandle,
        index_name: impl Into<String>,
        pattern: KeyPattern,
        bounds: IndexBounds,
        direction: ScanDirection,
    ) -> Self {
        let leading = pattern
            .fields()
            .first()
            .map(|(_, d)| *d)
            .unwrap_or(crate::index::Direction::Ascending);
        let mut ranges = bounds.leading_ranges(leading);
        if direction == ScanDirection::Backward {
            ranges.reverse();
        }
        let mut scan = Self {
            handle,
            index_name: index_name.into(),
            pattern,
            bounds,
            direction,
            ranges,
            range_idx: 0,
            position: None,
            current: None,
            nscanned: 0,
            nscanned_objects: 0,
        };
        scan.seek_next();
        scan
    }

    fn seek_next(&mut self) {
        let handle = Arc::clone(&self.handle);
        let collection = read_collection(&handle);
        let Some(index) = collection.index(&self.index_name) else {
            // Index dropped underneath the scan
            self.current = None;
            self.range_idx = self.ranges.len();
            return;
        };

        loop {
            let Some((lo, hi)) = self.ranges.get(self.range_idx) else {
                self.current = None;
                return;
            };
            let next = match self.direction {
                ScanDirection::Forward => next_forward(index.entries(), &self.position, lo, hi),
                ScanDirection::Backward => next_backward(index.entries(), &self.position, lo, hi),
            };
            let Some(entry) = next else {
                self.range_idx += 1;
                self.position = None;
                continue;
            };

            self.nscanned += 1;
            self.position = Some(entry.clone());
            if !self.bounds.matches_trailing(&entry.0) {
                continue;
            }
            if let Some(document) = collection.get(&entry.1) {
                self.nscanned_objects += 1;
                self.current = Some((entry, document.clone()));
                return;
            }
        }
    }
}

fn next_forward(
    entries: &std::collections::BTreeSet<IndexEntry>,
    position: &Option<IndexEntry>,
    lo: &Bound<KeyPart>,
    hi: &Bound<KeyPart>,
) -> Option<IndexEntry> {
    let start: Bound<IndexEntry> = match position {
        Some(p) => Bound::Excluded(p.clone()),
        None => match lo {
            Bound::Unbounded => Bound::Unbounded,
            Bound::Included(part) => Bound::Included((vec![part.clone()], IndexKey::MinKey)),
            Bound::Excluded(part) => {
                Bound::Excluded((vec![part.clone(), KeyPart::Top], IndexKey::MaxKey))
            }
        },
    };
    let entry = entries.range((start, Bound::Unbounded)).next()?;
    let past_end = match (entry.0.first(), hi) {
        (_, Bound::Unbounded) | (None, _) => false,
        (Some(part), Bound::Included(h)) => part > h,
        (Some(part), Bound::Excluded(h)) => part >= h,
    };
    (!past_end).then(|| entry.clone())
}

fn next_backward(
    entries: &std::collections::BTreeSet<IndexEntry>,
    position: &Option<IndexEntry>,
    lo: &Bound<KeyPart>,
    hi: &Bound<KeyPart>,
) -> Option<IndexEntry> {
    let end: Bound<IndexEntry> = match position {
        Some(p) => Bound::Excluded(p.clone()),
        None => match hi {
            Bound::Unbounded => Bound::Unbounded,
            Bound::Included(part) => {
                Bound::Included((vec![part.clone(), KeyPart::Top], IndexKey::MaxKey))
            }
            Bound::Excluded(part) => Bound::Excluded((vec![part.clone()], IndexKey::MinKey)),
        },
    };
    let entry = entries.range((Bound::Unbounded, end)).next_back()?;
    let past_start = match (entry.0.first(), lo) {
        (_, Bound::Unbounded) | (None, _) => false,
        (Some(part), Bound::Included(l)) => part < l,
        (Some(part), Bound::Excluded(l)) => part <= l,
    };
    (!past_start).then(|| entry.clone())
}

impl IndexScan for BTreeIndexScan {
    fn ok(&self) -> bool {
        self.current.is_some()
    }

    fn advance(&mut self) -> bool {
        if self.current.is_some() {
            self.seek_next();
        }
        self.ok()
    }

    fn current(&self) -> Option<&Value> {
        self.current.as_ref().map(|(_, doc)| doc)
    }

    fn curr_key(&self) -> Option<&[KeyPart]> {
        self.current.as_ref().map(|((key, _), _)| key.as_slice())
    }

    fn curr_pk(&self) -> Option<&IndexKey> {
        self.current.as_ref().map(|((_, pk), _)| pk)
    }

    fn key_pattern(&self) -> &KeyPattern {
        &self.pattern
    }

    fn bounds(&self) -> Option<&IndexBounds> {
        Some(&self.bounds)
    }

    fn nscanned(&self) -> u64 {
        self.nscanned
    }

    fn nscanned_objects(&self) -> u64 {
        self.nscanned_objects
    }

    fn describe(&self) -> String {
        let mut out = format!("BtreeCursor {}", self.index_name);
        if self.ranges.len() > 1 {
            out.push_str(" multi");
        }
        if self.direction == ScanDirection::Backward {
            out.push_str(" reverse");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{Direction, Interval, IntervalSet};
    use crate::storage::catalog::write_collection;
    use crate::storage::Collection;
    use serde_json::json;
    use std::sync::RwLock;

    fn key(v: Value) -> IndexKey {
        IndexKey::from_json(&v)
    }

    fn collection() -> CollectionHandle {
        let mut c = Collection::new("db.c");
        c.create_index(KeyPattern::single("a"), None).unwrap();
        c.create_index(
            KeyPattern::new(vec![
                ("a".to_string(), Direction::Ascending),
                ("b".to_string(), Direction::Descending),
            ]),
            None,
        )
        .unwrap();
        for i in 0..10 {
            c.insert(json!({"_id": i, "a": i % 3, "b": i})).unwrap();
        }
        Arc::new(RwLock::new(c))
    }

    fn drain(scan: &mut dyn IndexScan) -> Vec<Value> {
        let mut out = Vec::new();
        while scan.ok() {
            out.push(scan.current().unwrap()["_id"].clone());
            scan.advance();
        }
        out
    }

    #[test]
    fn test_table_scan_both_directions() {
        let handle = collection();
        let mut fwd = TableScan::new(Arc::clone(&handle), ScanDirection::Forward);
        assert_eq!(drain(&mut fwd).len(), 10);
        assert_eq!(fwd.nscanned(), 10);

        let mut back = TableScan::new(handle, ScanDirection::Backward);
        let ids = drain(&mut back);
        assert_eq!(ids.first(), Some(&json!(9)));
        assert_eq!(ids.last(), Some(&json!(0)));
    }

    #[test]
    fn test_index_point_scan() {
        let handle = collection();
        let bounds = IndexBounds::new(vec![(
            "a".to_string(),
            IntervalSet::from_points(vec![key(json!(1))]),
        )]);
        let mut scan = BTreeIndexScan::new(
            handle,
            "a_1",
            KeyPattern::single("a"),
            bounds,
            ScanDirection::Forward,
        );
        assert_eq!(drain(&mut scan), vec![json!(1), json!(4), json!(7)]);
        assert_eq!(scan.nscanned(), 3);
    }

    #[test]
    fn test_index_range_scan_reverse() {
        let handle = collection();
        let bounds = IndexBounds::new(vec![(
            "a".to_string(),
            IntervalSet::from_interval(Interval::new(
                Bound::Excluded(key(json!(0))),
                Bound::Unbounded,
            )),
        )]);
        let mut scan = BTreeIndexScan::new(
            handle,
            "a_1",
            KeyPattern::single("a"),
            bounds,
            ScanDirection::Backward,
        );
        assert!(scan.describe().ends_with("reverse"));
        let ids = drain(&mut scan);
        assert_eq!(ids, vec![json!(8), json!(5), json!(2), json!(7), json!(4), json!(1)]);
    }

    #[test]
    fn test_compound_scan_filters_trailing_field() {
        let handle = collection();
        let pattern = KeyPattern::new(vec![
            ("a".to_string(), Direction::Ascending),
            ("b".to_string(), Direction::Descending),
        ]);
        let bounds = IndexBounds::new(vec![
            ("a".to_string(), IntervalSet::from_points(vec![key(json!(0))])),
            (
                "b".to_string(),
                IntervalSet::from_interval(Interval::new(
                    Bound::Included(key(json!(3))),
                    Bound::Unbounded,
                )),
            ),
        ]);
        let mut scan = BTreeIndexScan::new(handle, "a_1_b_-1", pattern, bounds, ScanDirection::Forward);
        // b descending within a == 0: 9, 6, 3 (0 filtered out)
        assert_eq!(drain(&mut scan), vec![json!(9), json!(6), json!(3)]);
        assert_eq!(scan.nscanned(), 4);
        assert_eq!(scan.nscanned_objects(), 3);
    }

    #[test]
    fn test_scan_tolerates_concurrent_removal() {
        let handle = collection();
        let mut scan = TableScan::new(Arc::clone(&handle), ScanDirection::Forward);
        assert_eq!(scan.current().unwrap()["_id"], json!(0));
        write_collection(&handle).remove(&key(json!(1)));
        scan.advance();
        assert_eq!(scan.current().unwrap()["_id"], json!(2));
    }

    #[test]
    fn test_dropped_index_ends_scan() {
        let handle = collection();
        let mut scan = BTreeIndexScan::new(
            Arc::clone(&handle),
            "a_1",
            KeyPattern::single("a"),
            IndexBounds::universal(&KeyPattern::single("a")),
            ScanDirection::Forward,
        );
        assert!(scan.ok());
        write_collection(&handle).drop_index("a_1").unwrap();
        assert!(!scan.advance());
    }
}
