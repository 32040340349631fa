//! Per-field key ranges implied by a query
//!
//! Each constrained field maps to the set of keys a matching document can
//! hold. Ranges are bracketed by type: `{a: {$gt: 5}}` covers numbers above
//! five, never strings. Operators that cannot narrow an index scan
//! (`$ne`, `$nin`, `$exists`) leave the field unconstrained.

use std::collections::BTreeMap;
use std::ops::Bound;

use crate::index::{IndexBounds, IndexKey, Interval, IntervalSet, KeyPattern};

use super::ast::{FilterOp, Predicate};

/// Key ranges for every constrained field of one conjunction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldRangeSet {
    ranges: BTreeMap<String, IntervalSet>,
}

impl FieldRangeSet {
    /// Intersects the ranges of every predicate
    pub fn from_predicates(predicates: &[Predicate]) -> Self {
        let mut ranges: BTreeMap<String, IntervalSet> = BTreeMap::new();
        for predicate in predicates {
            let Some(set) = predicate_range(&predicate.op) else {
                continue;
            };
            match ranges.get_mut(&predicate.field) {
                Some(existing) => *existing = existing.intersect(&set),
                None => {
                    ranges.insert(predicate.field.clone(), set);
                }
            }
        }
        Self { ranges }
    }

    /// Range for a field; `None` means unconstrained
    pub fn range(&self, field: &str) -> Option<&IntervalSet> {
        self.ranges.get(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &IntervalSet)> {
        self.ranges.iter().map(|(f, s)| (f.as_str(), s))
    }

    pub fn is_constrained(&self, field: &str) -> bool {
        self.ranges.get(field).map_or(false, |s| !s.is_universal())
    }

    /// Field restricted to exactly one key
    pub fn is_single_point(&self, field: &str) -> bool {
        self.ranges
            .get(field)
            .map_or(false, |s| s.intervals().len() == 1 && s.is_points())
    }

    /// Some field admits no key at all, so nothing can match
    pub fn is_impossible(&self) -> bool {
        self.ranges.values().any(IntervalSet::is_empty)
    }

    pub fn has_constraints(&self) -> bool {
        self.ranges.values().any(|s| !s.is_universal())
    }

    /// True when every document admitted by `other` is admitted by `self`.
    ///
    /// Used to drop an `$or` clause that an earlier clause already scans.
    pub fn covers(&self, other: &FieldRangeSet) -> bool {
        if other.is_impossible() {
            return true;
        }
        self.ranges.iter().all(|(field, mine)| match other.ranges.get(field) {
            Some(theirs) => theirs.is_subset_of(mine),
            None => mine.is_universal(),
        })
    }

    /// Bounds aligned with an index key pattern
    pub fn bounds_for(&self, pattern: &KeyPattern) -> IndexBounds {
        IndexBounds::new(
            pattern
                .fields()
                .iter()
                .map(|(field, _)| {
                    let set = self
                        .ranges
                        .get(field)
                        .cloned()
                        .unwrap_or_else(IntervalSet::universal);
                    (field.clone(), set)
                })
                .collect(),
        )
    }
}

fn lower_bracket(key: IndexKey, inclusive: bool) -> Interval {
    let (upper, upper_inclusive) = key.type_max();
    let lower = if inclusive {
        Bound::Included(key)
    } else {
        Bound::Excluded(key)
    };
    let upper = if upper_inclusive {
        Bound::Included(upper)
    } else {
        Bound::Excluded(upper)
    };
    Interval::new(lower, upper)
}

fn upper_bracket(key: IndexKey, inclusive: bool) -> Interval {
    let lower = Bound::Included(key.type_min());
    let upper = if inclusive {
        Bound::Included(key)
    } else {
        Bound::Excluded(key)
    };
    Interval::new(lower, upper)
}

fn predicate_range(op: &FilterOp) -> Option<IntervalSet> {
    let key = |v| IndexKey::from_json(v);
    let set = match op {
        FilterOp::Eq(v) => IntervalSet::from_points([key(v)]),
        FilterOp::Gt(v) => IntervalSet::from_interval(lower_bracket(key(v), false)),
        FilterOp::Gte(v) => IntervalSet::from_interval(lower_bracket(key(v), true)),
        FilterOp::Lt(v) => IntervalSet::from_interval(upper_bracket(key(v), false)),
        FilterOp::Lte(v) => IntervalSet::from_interval(upper_bracket(key(v), true)),
        FilterOp::In(values) => IntervalSet::from_points(values.iter().map(key)),
        FilterOp::Regex(_) => IntervalSet::from_interval(lower_bracket(
            IndexKey::String(String::new()),
            true,
        )),
        FilterOp::Ne(_) | FilterOp::Nin(_) | FilterOp::Exists(_) => return None,
    };
    Some(set)
}
