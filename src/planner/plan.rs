//! Candidate query plans
//!
//! A plan is one way of scanning a collection for a query: a specific
//! index with bounds and a direction, or the natural-order table scan.
//! Plans carry no runtime state; executing one means opening a fresh scan.

use std::fmt;

use crate::index::{IndexBounds, IndexScan, KeyPattern, ScanDirection};
use crate::storage::{BTreeIndexScan, CollectionHandle, TableScan};

use super::ranges::FieldRangeSet;

/// How useful a plan is for its query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Utility {
    /// Ranges are contradictory; nothing can match
    Impossible,
    /// Index answers the query and order exactly; no need to race others
    Optimal,
    /// Worth racing against other candidates
    Helpful,
    /// Index constrains nothing and provides no order
    Unhelpful,
}

impl Utility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Utility::Impossible => "impossible",
            Utility::Optimal => "optimal",
            Utility::Helpful => "helpful",
            Utility::Unhelpful => "unhelpful",
        }
    }
}

/// One candidate plan for a query clause
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    ns: String,
    index_name: Option<String>,
    key_pattern: KeyPattern,
    bounds: Option<IndexBounds>,
    direction: ScanDirection,
    utility: Utility,
    scan_and_order_required: bool,
}

impl QueryPlan {
    /// Plan over an index
    pub fn index(
        ns: impl Into<String>,
        index_name: impl Into<String>,
        key_pattern: KeyPattern,
        ranges: &FieldRangeSet,
        sort: &KeyPattern,
    ) -> Self {
        let order = sort_direction(&key_pattern, ranges, sort);
        let scan_and_order_required = order.is_none();
        let utility = if ranges.is_impossible() {
            Utility::Impossible
        } else {
            index_utility(&key_pattern, ranges, sort, scan_and_order_required)
        };
        let bounds = ranges.bounds_for(&key_pattern);
        Self {
            ns: ns.into(),
            index_name: Some(index_name.into()),
            key_pattern,
            bounds: Some(bounds),
            direction: order.unwrap_or(ScanDirection::Forward),
            utility,
            scan_and_order_required,
        }
    }

    /// Natural-order table scan
    pub fn table_scan(ns: impl Into<String>, ranges: &FieldRangeSet, sort: &KeyPattern) -> Self {
        let utility = if ranges.is_impossible() {
            Utility::Impossible
        } else {
            Utility::Helpful
        };
        Self {
            ns: ns.into(),
            index_name: None,
            key_pattern: KeyPattern::empty(),
            bounds: None,
            direction: ScanDirection::Forward,
            utility,
            scan_and_order_required: !sort.is_empty(),
        }
    }

    /// Opens a new scan positioned on the plan's first entry
    pub fn new_scan(&self, handle: CollectionHandle) -> Box<dyn IndexScan> {
        match (&self.index_name, &self.bounds) {
            (Some(name), Some(bounds)) => Box::new(BTreeIndexScan::new(
                handle,
                name.clone(),
                self.key_pattern.clone(),
                bounds.clone(),
                self.direction,
            )),
            _ => Box::new(TableScan::new(handle, self.direction)),
        }
    }

    pub fn ns(&self) -> &str {
        &self.ns
    }

    /// Index name, `None` for the table scan
    pub fn index_name(&self) -> Option<&str> {
        self.index_name.as_deref()
    }

    pub fn is_table_scan(&self) -> bool {
        self.index_name.is_none()
    }

    pub fn key_pattern(&self) -> &KeyPattern {
        &self.key_pattern
    }

    pub fn bounds(&self) -> Option<&IndexBounds> {
        self.bounds.as_ref()
    }

    pub fn direction(&self) -> ScanDirection {
        self.direction
    }

    pub fn utility(&self) -> Utility {
        self.utility
    }

    /// Output must be buffered and sorted to honour the requested order
    pub fn scan_and_order_required(&self) -> bool {
        self.scan_and_order_required
    }

    pub fn is_impossible(&self) -> bool {
        self.utility == Utility::Impossible
    }

    pub fn is_optimal(&self) -> bool {
        self.utility == Utility::Optimal
    }

    /// Cursor description as reported by explain
    pub fn describe(&self) -> String {
        match &self.index_name {
            Some(name) => {
                let multi = self
                    .bounds
                    .as_ref()
                    .and_then(|b| b.field(0))
                    .map_or(false, |s| s.intervals().len() > 1);
                let mut out = format!("BtreeCursor {}", name);
                if multi {
                    out.push_str(" multi");
                }
                if self.direction == ScanDirection::Backward {
                    out.push_str(" reverse");
                }
                out
            }
            None => "BasicCursor".to_string(),
        }
    }
}

impl fmt::Display for QueryPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.describe(), self.utility.as_str())
    }
}

/// Direction in which an index yields the requested order, if it can.
///
/// Leading fields pinned to a single key do not affect order and are
/// skipped. The remaining index fields must start with the sort fields,
/// all in the same or all in the reversed direction.
pub fn sort_direction(
    pattern: &KeyPattern,
    ranges: &FieldRangeSet,
    sort: &KeyPattern,
) -> Option<ScanDirection> {
    if sort.is_empty() {
        return Some(ScanDirection::Forward);
    }
    let index_fields = pattern.fields();
    let mut position = 0;
    let mut direction = None;
    for (sort_field, sort_dir) in sort.fields() {
        loop {
            let (field, _) = index_fields.get(position)?;
            if field == sort_field {
                break;
            }
            if !ranges.is_single_point(field) {
                return None;
            }
            position += 1;
        }
        let (_, index_dir) = &index_fields[position];
        let this = if index_dir == sort_dir {
            ScanDirection::Forward
        } else {
            ScanDirection::Backward
        };
        if *direction.get_or_insert(this) != this {
            return None;
        }
        position += 1;
    }
    direction
}

fn index_utility(
    pattern: &KeyPattern,
    ranges: &FieldRangeSet,
    sort: &KeyPattern,
    scan_and_order_required: bool,
) -> Utility {
    let leading_constrained = pattern
        .first_field()
        .map_or(false, |f| ranges.is_constrained(f));
    if !leading_constrained && (sort.is_empty() || scan_and_order_required) {
        return Utility::Unhelpful;
    }
    if scan_and_order_required {
        return Utility::Helpful;
    }

    // Constrained fields must form a prefix in which every field but the
    // last is a single point, and no constrained field may lie outside it.
    let mut prefix = 0;
    for (field, _) in pattern.fields() {
        if !ranges.is_constrained(field) {
            break;
        }
        prefix += 1;
        if !ranges.is_single_point(field) {
            break;
        }
    }
    let covered = &pattern.fields()[..prefix];
    let all_covered = ranges
        .fields()
        .filter(|(_, set)| !set.is_universal())
        .all(|(field, _)| covered.iter().any(|(f, _)| f == field));
    if all_covered {
        Utility::Optimal
    } else {
        Utility::Helpful
    }
}
