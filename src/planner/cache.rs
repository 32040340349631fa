//! Plan cache
//!
//! Remembers which plan won for a (namespace, query shape) pair so the next
//! query of the same shape tries that plan first. Entries for a namespace
//! are cleared after a number of writes, on index changes and on drop.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::index::KeyPattern;

use super::ranges::FieldRangeSet;

/// Kind of constraint a query places on one field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeKind {
    Point,
    Range,
}

/// Normalized query shape: constrained fields and their kind, plus the sort
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryShape {
    fields: Vec<(String, ShapeKind)>,
    sort: KeyPattern,
}

impl QueryShape {
    pub fn new(ranges: &FieldRangeSet, sort: &KeyPattern) -> Self {
        let fields = ranges
            .fields()
            .filter(|(_, set)| !set.is_universal())
            .map(|(field, set)| {
                let kind = if set.is_points() {
                    ShapeKind::Point
                } else {
                    ShapeKind::Range
                };
                (field.to_string(), kind)
            })
            .collect();
        Self {
            fields,
            sort: sort.clone(),
        }
    }

    pub fn sort(&self) -> &KeyPattern {
        &self.sort
    }
}

impl fmt::Display for QueryShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<String> = self
            .fields
            .iter()
            .map(|(field, kind)| {
                let kind = match kind {
                    ShapeKind::Point => "point",
                    ShapeKind::Range => "range",
                };
                format!("{}: {}", field, kind)
            })
            .collect();
        write!(f, "{{{}}}", fields.join(", "))?;
        if !self.sort.is_empty() {
            write!(f, " sort {}", self.sort)?;
        }
        Ok(())
    }
}

/// A remembered winning plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedPlan {
    /// Index name, `None` for the table scan
    pub index_name: Option<String>,
    /// Keys the winner examined before it was chosen
    pub nscanned: u64,
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<(String, QueryShape), CachedPlan>,
    writes: HashMap<String, u64>,
}

/// Process-wide plan cache
#[derive(Debug)]
pub struct PlanCache {
    inner: Mutex<CacheInner>,
    write_threshold: u64,
}

impl PlanCache {
    pub fn new(write_threshold: u64) -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
            write_threshold,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, ns: &str, shape: &QueryShape) -> Option<CachedPlan> {
        self.lock()
            .entries
            .get(&(ns.to_string(), shape.clone()))
            .cloned()
    }

    pub fn record(&self, ns: &str, shape: &QueryShape, plan: CachedPlan) {
        self.lock().entries.insert((ns.to_string(), shape.clone()), plan);
    }

    /// Forgets one entry, e.g. after the cached plan underperformed
    pub fn clear_entry(&self, ns: &str, shape: &QueryShape) -> bool {
        self.lock()
            .entries
            .remove(&(ns.to_string(), shape.clone()))
            .is_some()
    }

    /// Forgets every entry for a namespace; returns how many were removed
    pub fn clear_namespace(&self, ns: &str) -> usize {
        let mut inner = self.lock();
        let before = inner.entries.len();
        inner.entries.retain(|(entry_ns, _), _| entry_ns != ns);
        inner.writes.remove(ns);
        before - inner.entries.len()
    }

    /// Counts a write; clears the namespace once the threshold is reached.
    ///
    /// Returns true when the namespace was cleared.
    pub fn note_write(&self, ns: &str) -> bool {
        let mut inner = self.lock();
        let count = inner.writes.entry(ns.to_string()).or_insert(0);
        *count += 1;
        if *count < self.write_threshold {
            return false;
        }
        inner.writes.remove(ns);
        inner.entries.retain(|(entry_ns, _), _| entry_ns != ns);
        true
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
