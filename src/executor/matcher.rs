//! Document matching
//!
//! Values compare through `IndexKey`, so matching agrees exactly with index
//! ranges: comparisons only succeed between values of the same type and a
//! missing field behaves like `null`.

use std::cmp::Ordering;
use std::fmt;

use serde_json::Value;

use crate::index::{lookup_path, IndexKey};
use crate::planner::{FilterOp, Predicate, QueryExpr};

/// "Does this document match"
pub trait Matcher: Send + Sync + fmt::Debug {
    fn matches(&self, document: &Value) -> bool;
}

/// Conjunction of predicates plus an optional disjunction of branches
#[derive(Debug, Clone, Default)]
pub struct PredicateMatcher {
    predicates: Vec<Predicate>,
    or_clauses: Vec<Vec<Predicate>>,
}

impl PredicateMatcher {
    pub fn new(query: &QueryExpr) -> Self {
        Self {
            predicates: query.predicates().to_vec(),
            or_clauses: query.or_clauses().to_vec(),
        }
    }

    /// Matcher for a plain conjunction (one `$or` clause)
    pub fn for_predicates(predicates: &[Predicate]) -> Self {
        Self {
            predicates: predicates.to_vec(),
            or_clauses: Vec::new(),
        }
    }

    fn matches_all(document: &Value, predicates: &[Predicate]) -> bool {
        predicates
            .iter()
            .all(|pred| Self::matches_predicate(document, pred))
    }

    fn matches_predicate(document: &Value, predicate: &Predicate) -> bool {
        let field_value = lookup_path(document, &predicate.field);
        let actual = field_value.map_or(IndexKey::Null, IndexKey::from_json);

        match &predicate.op {
            FilterOp::Eq(expected) => actual == IndexKey::from_json(expected),
            FilterOp::Ne(expected) => actual != IndexKey::from_json(expected),
            FilterOp::Gt(bound) => Self::compare(&actual, bound) == Some(Ordering::Greater),
            FilterOp::Gte(bound) => matches!(
                Self::compare(&actual, bound),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            FilterOp::Lt(bound) => Self::compare(&actual, bound) == Some(Ordering::Less),
            FilterOp::Lte(bound) => matches!(
                Self::compare(&actual, bound),
                Some(Ordering::Less | Ordering::Equal)
            ),
            FilterOp::In(values) => values.iter().any(|v| actual == IndexKey::from_json(v)),
            FilterOp::Nin(values) => values.iter().all(|v| actual != IndexKey::from_json(v)),
            FilterOp::Exists(expected) => field_value.is_some() == *expected,
            FilterOp::Regex(pattern) => match field_value {
                Some(Value::String(s)) => pattern.is_match(s),
                _ => false,
            },
        }
    }

    /// Ordering between values of the same type; `None` across types
    fn compare(actual: &IndexKey, bound: &Value) -> Option<Ordering> {
        let bound = IndexKey::from_json(bound);
        if actual.type_rank() != bound.type_rank() {
            return None;
        }
        Some(actual.cmp(&bound))
    }
}

impl Matcher for PredicateMatcher {
    fn matches(&self, document: &Value) -> bool {
        Self::matches_all(document, &self.predicates)
            && (self.or_clauses.is_empty()
                || self
                    .or_clauses
                    .iter()
                    .any(|clause| Self::matches_all(document, clause)))
    }
}
