//! Explain output
//!
//! Diagnostic counters for every candidate plan, rolled up per `$or`
//! clause and per query. Counters never influence plan selection.

use serde::Serialize;
use serde_json::Value;

use super::plan::QueryPlan;

/// Counters for one candidate plan
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanExplain {
    pub cursor: String,
    pub index_bounds: Value,
    pub n: u64,
    pub nscanned: u64,
    pub nscanned_objects: u64,
    pub scan_and_order: bool,
    pub picked: bool,
    pub done: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub aborted: bool,
}

impl PlanExplain {
    /// Zeroed counters for a plan that has not run yet
    pub fn for_plan(plan: &QueryPlan) -> Self {
        Self {
            cursor: plan.describe(),
            index_bounds: plan
                .bounds()
                .map(|b| b.to_json())
                .unwrap_or_else(|| Value::Object(Default::default())),
            scan_and_order: plan.scan_and_order_required(),
            ..Self::default()
        }
    }
}

/// The plan a cache entry pointed at
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OldPlanExplain {
    pub cursor: String,
    pub nscanned: u64,
}

/// Roll-up for one clause (the whole query when there is no `$or`)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClauseExplain {
    pub cursor: String,
    pub index_bounds: Value,
    pub n: u64,
    pub nscanned: u64,
    pub nscanned_objects: u64,
    pub scan_and_order: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub all_plans: Vec<PlanExplain>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_plan: Option<OldPlanExplain>,
}

impl ClauseExplain {
    /// Clause that ran a single plan
    pub fn single(plan: PlanExplain) -> Self {
        Self {
            cursor: plan.cursor.clone(),
            index_bounds: plan.index_bounds.clone(),
            n: plan.n,
            nscanned: plan.nscanned,
            nscanned_objects: plan.nscanned_objects,
            scan_and_order: plan.scan_and_order,
            all_plans: vec![PlanExplain {
                picked: true,
                ..plan
            }],
            old_plan: None,
        }
    }
}

/// Explain output for a whole query
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryExplain {
    pub cursor: String,
    pub index_bounds: Value,
    pub n: u64,
    pub nscanned: u64,
    pub nscanned_objects: u64,
    pub scan_and_order: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub clauses: Vec<ClauseExplain>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub all_plans: Vec<PlanExplain>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_plan: Option<OldPlanExplain>,
    pub millis: u64,
}

impl QueryExplain {
    /// Builds the query roll-up.
    ///
    /// One clause is reported flat; several are nested under `clauses` with
    /// summed counters. `n` is the number of documents actually returned.
    pub fn from_clauses(mut clauses: Vec<ClauseExplain>, n: u64, millis: u64) -> Self {
        if clauses.len() == 1 {
            if let Some(clause) = clauses.pop() {
                return Self {
                    cursor: clause.cursor,
                    index_bounds: clause.index_bounds,
                    n,
                    nscanned: clause.nscanned,
                    nscanned_objects: clause.nscanned_objects,
                    scan_and_order: clause.scan_and_order,
                    clauses: Vec::new(),
                    all_plans: clause.all_plans,
                    old_plan: clause.old_plan,
                    millis,
                };
            }
        }
        Self {
            cursor: "QueryOptimizerCursor".to_string(),
            index_bounds: Value::Object(Default::default()),
            n,
            nscanned: clauses.iter().map(|c| c.nscanned).sum(),
            nscanned_objects: clauses.iter().map(|c| c.nscanned_objects).sum(),
            scan_and_order: clauses.iter().any(|c| c.scan_and_order),
            clauses,
            all_plans: Vec::new(),
            old_plan: None,
            millis,
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::KeyPattern;
    use crate::planner::ranges::FieldRangeSet;
    use serde_json::json;

    fn clause(cursor: &str, nscanned: u64) -> ClauseExplain {
        ClauseExplain {
            cursor: cursor.to_string(),
            nscanned,
            nscanned_objects: nscanned,
            ..ClauseExplain::default()
        }
    }

    #[test]
    fn test_single_clause_is_flat() {
        let explain = QueryExplain::from_clauses(vec![clause("BtreeCursor a_1", 7)], 3, 0);
        let value = explain.to_json();
        assert_eq!(value["cursor"], json!("BtreeCursor a_1"));
        assert_eq!(value["n"], json!(3));
        assert!(value.get("clauses").is_none());
    }

    #[test]
    fn test_clauses_are_summed() {
        let explain = QueryExplain::from_clauses(
            vec![clause("BtreeCursor a_1", 4), clause("BtreeCursor b_1", 6)],
            9,
            1,
        );
        assert_eq!(explain.nscanned, 10);
        assert_eq!(explain.to_json()["clauses"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_plan_explain_uses_camel_case() {
        let plan = QueryPlan::table_scan("db.c", &FieldRangeSet::default(), &KeyPattern::single("a"));
        let value = serde_json::to_value(PlanExplain::for_plan(&plan)).unwrap();
        assert_eq!(value["cursor"], json!("BasicCursor"));
        assert_eq!(value["scanAndOrder"], json!(true));
        assert!(value.get("nscannedObjects").is_some());
        assert!(value.get("aborted").is_none());
    }
}
