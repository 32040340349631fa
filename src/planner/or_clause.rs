//! `$or` decomposition
//!
//! A top-level `$or` is split into one sub-query per branch, each carrying
//! the query's other predicates. Branches are planned and scanned one after
//! another. A branch whose ranges are already covered by an earlier branch
//! is dropped statically: everything it could return was returned before.

use crate::index::KeyPattern;
use crate::storage::Collection;

use super::ast::{FilterOp, Predicate, QueryExpr};
use super::plan::{QueryPlan, Utility};
use super::ranges::FieldRangeSet;

/// One `$or` branch ready for planning
#[derive(Debug, Clone)]
pub struct ClauseSpec {
    position: usize,
    predicates: Vec<Predicate>,
    ranges: FieldRangeSet,
}

impl ClauseSpec {
    /// Position of the branch in the original `$or` array
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn ranges(&self) -> &FieldRangeSet {
        &self.ranges
    }
}

/// Ranges describe the predicates exactly, so range coverage implies
/// match coverage.
fn ranges_are_exact(predicates: &[Predicate]) -> bool {
    predicates.iter().all(|p| {
        matches!(
            p.op,
            FilterOp::Eq(_)
                | FilterOp::Gt(_)
                | FilterOp::Gte(_)
                | FilterOp::Lt(_)
                | FilterOp::Lte(_)
                | FilterOp::In(_)
        )
    })
}

/// Splits a query into its `$or` clauses, dropping redundant ones
pub fn decompose(query: &QueryExpr) -> Vec<ClauseSpec> {
    let mut kept: Vec<ClauseSpec> = Vec::new();
    let mut exact: Vec<FieldRangeSet> = Vec::new();
    for position in 0..query.or_clauses().len() {
        let Some(clause) = query.clause(position) else {
            continue;
        };
        let predicates = clause.predicates().to_vec();
        let ranges = FieldRangeSet::from_predicates(&predicates);
        if ranges.is_impossible() || exact.iter().any(|earlier| earlier.covers(&ranges)) {
            continue;
        }
        if ranges_are_exact(&predicates) {
            exact.push(ranges.clone());
        }
        kept.push(ClauseSpec {
            position,
            predicates,
            ranges,
        });
    }
    kept
}

/// Every clause has an index that narrows it.
///
/// When some clause would need a table scan anyway, one scan of the whole
/// query is cheaper than scanning clause by clause.
pub fn clauses_are_indexable(collection: &Collection, ns: &str, clauses: &[ClauseSpec]) -> bool {
    let no_sort = KeyPattern::empty();
    clauses.iter().all(|clause| {
        collection.indexes().iter().any(|index| {
            let plan = QueryPlan::index(
                ns,
                index.name(),
                index.pattern().clone(),
                clause.ranges(),
                &no_sort,
            );
            matches!(plan.utility(), Utility::Optimal | Utility::Helpful)
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn positions(query: serde_json::Value) -> Vec<usize> {
        decompose(&QueryExpr::parse(&query).unwrap())
            .iter()
            .map(ClauseSpec::position)
            .collect()
    }

    #[test]
    fn test_clauses_carry_top_level_predicates() {
        let q = QueryExpr::parse(&json!({"c": 1, "$or": [{"a": 1}, {"b": 1}]})).unwrap();
        let clauses = decompose(&q);
        assert_eq!(clauses.len(), 2);
        assert_eq!(clauses[1].predicates().len(), 2);
        assert!(clauses[1].ranges().is_constrained("c"));
    }

    #[test]
    fn test_covered_clause_dropped() {
        assert_eq!(positions(json!({"$or": [{"_id": {"$gt": 0}}, {"_id": 1}]})), vec![0]);
        assert_eq!(positions(json!({"$or": [{"_id": 1}, {"_id": {"$gt": 0}}]})), vec![0, 1]);
    }

    #[test]
    fn test_inexact_clause_does_not_cover() {
        assert_eq!(
            positions(json!({"$or": [{"a": {"$gt": 0}, "b": {"$ne": 3}}, {"a": 1}]})),
            vec![0, 1]
        );
    }

    #[test]
    fn test_impossible_clause_dropped() {
        assert_eq!(positions(json!({"$or": [{"a": {"$in": []}}, {"b": 1}]})), vec![1]);
    }

    #[test]
    fn test_indexable() {
        let mut c = Collection::new("db.c");
        c.create_index(KeyPattern::single("a"), None).unwrap();
        let q = QueryExpr::parse(&json!({"$or": [{"a": 1}, {"_id": 2}]})).unwrap();
        assert!(clauses_are_indexable(&c, "db.c", &decompose(&q)));
        let q = QueryExpr::parse(&json!({"$or": [{"a": 1}, {"b": 2}]})).unwrap();
        assert!(!clauses_are_indexable(&c, "db.c", &decompose(&q)));
    }
}
