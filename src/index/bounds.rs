//! Key ranges over index fields
//!
//! - `Interval`: one contiguous range of keys
//! - `IntervalSet`: sorted, disjoint union of intervals for one field
//! - `IndexBounds`: one interval set per key pattern field

use std::cmp::Ordering;
use std::ops::Bound;

use serde_json::{json, Map, Value};

use super::btree::{Direction, IndexKey, KeyPart, KeyPattern};

/// A contiguous range of index keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interval {
    pub lower: Bound<IndexKey>,
    pub upper: Bound<IndexKey>,
}

impl Interval {
    pub fn new(lower: Bound<IndexKey>, upper: Bound<IndexKey>) -> Self {
        Self { lower, upper }
    }

    /// Every key
    pub fn universal() -> Self {
        Self::new(Bound::Unbounded, Bound::Unbounded)
    }

    /// Exactly one key
    pub fn point(key: IndexKey) -> Self {
        Self::new(Bound::Included(key.clone()), Bound::Included(key))
    }

    pub fn is_universal(&self) -> bool {
        matches!((&self.lower, &self.upper), (Bound::Unbounded, Bound::Unbounded))
    }

    pub fn is_point(&self) -> bool {
        matches!((&self.lower, &self.upper), (Bound::Included(a), Bound::Included(b)) if a == b)
    }

    pub fn is_empty(&self) -> bool {
        match (&self.lower, &self.upper) {
            (Bound::Included(a), Bound::Included(b)) => a > b,
            (Bound::Included(a), Bound::Excluded(b))
            | (Bound::Excluded(a), Bound::Included(b))
            | (Bound::Excluded(a), Bound::Excluded(b)) => a >= b,
            _ => false,
        }
    }

    pub fn contains(&self, key: &IndexKey) -> bool {
        let above = match &self.lower {
            Bound::Unbounded => true,
            Bound::Included(l) => key >= l,
            Bound::Excluded(l) => key > l,
        };
        let below = match &self.upper {
            Bound::Unbounded => true,
            Bound::Included(u) => key <= u,
            Bound::Excluded(u) => key < u,
        };
        above && below
    }

    pub fn intersect(&self, other: &Interval) -> Interval {
        let lower = if cmp_lower(&self.lower, &other.lower) == Ordering::Less {
            other.lower.clone()
        } else {
            self.lower.clone()
        };
        let upper = if cmp_upper(&self.upper, &other.upper) == Ordering::Greater {
            other.upper.clone()
        } else {
            self.upper.clone()
        };
        Interval::new(lower, upper)
    }

    pub fn is_subset_of(&self, other: &Interval) -> bool {
        cmp_lower(&other.lower, &self.lower) != Ordering::Greater
            && cmp_upper(&self.upper, &other.upper) != Ordering::Greater
    }

    fn to_json(&self) -> Value {
        let lower = match &self.lower {
            Bound::Unbounded => IndexKey::MinKey.to_json(),
            Bound::Included(k) | Bound::Excluded(k) => k.to_json(),
        };
        let upper = match &self.upper {
            Bound::Unbounded => IndexKey::MaxKey.to_json(),
            Bound::Included(k) | Bound::Excluded(k) => k.to_json(),
        };
        json!([lower, upper])
    }
}

/// Orders lower bounds: unbounded first, inclusive before exclusive on ties.
fn cmp_lower(a: &Bound<IndexKey>, b: &Bound<IndexKey>) -> Ordering {
    match (a, b) {
        (Bound::Unbounded, Bound::Unbounded) => Ordering::Equal,
        (Bound::Unbounded, _) => Ordering::Less,
        (_, Bound::Unbounded) => Ordering::Greater,
        (Bound::Included(x), Bound::Included(y)) | (Bound::Excluded(x), Bound::Excluded(y)) => {
            x.cmp(y)
        }
        (Bound::Included(x), Bound::Excluded(y)) => x.cmp(y).then(Ordering::Less),
        (Bound::Excluded(x), Bound::Included(y)) => x.cmp(y).then(Ordering::Greater),
    }
}

/// Orders upper bounds: unbounded last, exclusive before inclusive on ties.
fn cmp_upper(a: &Bound<IndexKey>, b: &Bound<IndexKey>) -> Ordering {
    match (a, b) {
        (Bound::Unbounded, Bound::Unbounded) => Ordering::Equal,
        (Bound::Unbounded, _) => Ordering::Greater,
        (_, Bound::Unbounded) => Ordering::Less,
        (Bound::Included(x), Bound::Included(y)) | (Bound::Excluded(x), Bound::Excluded(y)) => {
            x.cmp(y)
        }
        (Bound::Included(x), Bound::Excluded(y)) => x.cmp(y).then(Ordering::Greater),
        (Bound::Excluded(x), Bound::Included(y)) => x.cmp(y).then(Ordering::Less),
    }
}

/// True when an interval ending at `upper` and a later one starting at
/// `lower` neither overlap nor touch.
fn has_gap(upper: &Bound<IndexKey>, lower: &Bound<IndexKey>) -> bool {
    match (upper, lower) {
        (Bound::Unbounded, _) | (_, Bound::Unbounded) => false,
        (Bound::Excluded(u), Bound::Excluded(l)) => u <= l,
        (Bound::Included(u), Bound::Included(l))
        | (Bound::Included(u), Bound::Excluded(l))
        | (Bound::Excluded(u), Bound::Included(l)) => u < l,
    }
}

/// Sorted, disjoint union of intervals for one field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntervalSet {
    intervals: Vec<Interval>,
}

impl IntervalSet {
    pub fn universal() -> Self {
        Self {
            intervals: vec![Interval::universal()],
        }
    }

    pub fn empty() -> Self {
        Self {
            intervals: Vec::new(),
        }
    }

    pub fn from_interval(interval: Interval) -> Self {
        Self::normalized(vec![interval])
    }

    pub fn from_points(keys: impl IntoIterator<Item = IndexKey>) -> Self {
        Self::normalized(keys.into_iter().map(Interval::point).collect())
    }

    fn normalized(mut intervals: Vec<Interval>) -> Self {
        intervals.retain(|i| !i.is_empty());
        intervals.sort_by(|a, b| cmp_lower(&a.lower, &b.lower));

        let mut merged: Vec<Interval> = Vec::with_capacity(intervals.len());
        for interval in intervals {
            match merged.last_mut() {
                Some(last) if !has_gap(&last.upper, &interval.lower) => {
                    if cmp_upper(&interval.upper, &last.upper) == Ordering::Greater {
                        last.upper = interval.upper;
                    }
                }
                _ => merged.push(interval),
            }
        }
        Self { intervals: merged }
    }

    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn is_universal(&self) -> bool {
        self.intervals.len() == 1 && self.intervals[0].is_universal()
    }

    /// Every interval is a single key
    pub fn is_points(&self) -> bool {
        !self.intervals.is_empty() && self.intervals.iter().all(Interval::is_point)
    }

    pub fn contains(&self, key: &IndexKey) -> bool {
        self.intervals.iter().any(|i| i.contains(key))
    }

    pub fn intersect(&self, other: &IntervalSet) -> IntervalSet {
        let mut out = Vec::new();
        for a in &self.intervals {
            for b in &other.intervals {
                let i = a.intersect(b);
                if !i.is_empty() {
                    out.push(i);
                }
            }
        }
        Self::normalized(out)
    }

    pub fn union(&self, other: &IntervalSet) -> IntervalSet {
        let mut all = self.intervals.clone();
        all.extend(other.intervals.iter().cloned());
        Self::normalized(all)
    }

    pub fn is_subset_of(&self, other: &IntervalSet) -> bool {
        self.intervals
            .iter()
            .all(|a| other.intervals.iter().any(|b| a.is_subset_of(b)))
    }

    pub fn to_json(&self) -> Value {
        Value::Array(self.intervals.iter().map(Interval::to_json).collect())
    }
}

/// Per-field key ranges for one index, aligned with its key pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexBounds {
    fields: Vec<(String, IntervalSet)>,
}

impl IndexBounds {
    pub fn new(fields: Vec<(String, IntervalSet)>) -> Self {
        Self { fields }
    }

    /// Universal bounds for every field of the pattern
    pub fn universal(pattern: &KeyPattern) -> Self {
        Self::new(
            pattern
                .fields()
                .iter()
                .map(|(f, _)| (f.clone(), IntervalSet::universal()))
                .collect(),
        )
    }

    pub fn fields(&self) -> &[(String, IntervalSet)] {
        &self.fields
    }

    pub fn field(&self, position: usize) -> Option<&IntervalSet> {
        self.fields.get(position).map(|(_, set)| set)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.iter().any(|(_, set)| set.is_empty())
    }

    /// Ranges over the leading field translated into stored-key order.
    ///
    /// A descending leading field flips each interval and the list order.
    pub fn leading_ranges(&self, direction: Direction) -> Vec<(Bound<KeyPart>, Bound<KeyPart>)> {
        let Some(set) = self.field(0) else {
            return Vec::new();
        };
        let wrap = |b: &Bound<IndexKey>| match b {
            Bound::Unbounded => Bound::Unbounded,
            Bound::Included(k) => Bound::Included(KeyPart::new(k.clone(), direction)),
            Bound::Excluded(k) => Bound::Excluded(KeyPart::new(k.clone(), direction)),
        };
        match direction {
            Direction::Ascending => set
                .intervals()
                .iter()
                .map(|i| (wrap(&i.lower), wrap(&i.upper)))
                .collect(),
            Direction::Descending => set
                .intervals()
                .iter()
                .rev()
                .map(|i| (wrap(&i.upper), wrap(&i.lower)))
                .collect(),
        }
    }

    /// Checks the non-leading components of a stored key.
    ///
    /// The leading component is already constrained by the seek.
    pub fn matches_trailing(&self, key: &[KeyPart]) -> bool {
        self.fields
            .iter()
            .zip(key.iter())
            .skip(1)
            .all(|((_, set), part)| part.key().map_or(false, |k| set.contains(k)))
    }

    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        for (field, set) in &self.fields {
            map.insert(field.clone(), set.to_json());
        }
        Value::Object(map)
    }
}
