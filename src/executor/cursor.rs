//! The query cursor capability and its single-plan implementation
//!
//! Every way of executing a query (one plan, several interleaved plans,
//! a sequence of `$or` clauses) is a `QueryCursor`. Result builders only
//! see this trait.
//!
//! Cursor contract:
//! - `ok()` is true while positioned on a document
//! - `current()`, `curr_key()` and `curr_pk()` are only valid while `ok()`
//! - `advance()` moves to the next position and reports `ok()`
//! - once `advance()` has failed every later call fails the same way

use std::sync::Arc;

use serde_json::Value;

use crate::index::{IndexKey, IndexScan, KeyPart, KeyPattern};
use crate::planner::{
    CandidatePlanCharacter, ClauseExplain, OldPlanExplain, PlanExplain, QueryPlan,
};
use crate::storage::CollectionHandle;

use super::errors::{ExecutorError, ExecutorResult};
use super::interrupt::Interrupt;
use super::matcher::Matcher;

/// Positioned iterator over the results of one query
pub trait QueryCursor: Send {
    /// True while positioned on a document
    fn ok(&self) -> bool;

    /// Moves to the next position; returns `ok()`
    fn advance(&mut self) -> ExecutorResult<bool>;

    /// Document at the current position
    fn current(&self) -> ExecutorResult<&Value>;

    fn curr_key(&self) -> ExecutorResult<&[KeyPart]>;

    /// Primary key of the current document
    fn curr_pk(&self) -> ExecutorResult<&IndexKey>;

    /// Matcher of the plan currently producing documents
    fn matcher(&self) -> Option<Arc<dyn Matcher>>;

    /// Whether the current document satisfies the query
    fn current_matches(&mut self) -> bool;

    /// Records `pk` as returned; true if it had been returned before
    fn getsetdup(&mut self, pk: &IndexKey) -> bool;

    /// Key pattern of the index currently being scanned
    fn index_key_pattern(&self) -> KeyPattern;

    /// Keys or documents examined, including any discarded plans
    fn nscanned(&self) -> u64;

    fn nscanned_objects(&self) -> u64;

    /// Explain name, e.g. `BtreeCursor a_1`
    fn describe(&self) -> String;

    fn candidate_plan_character(&self) -> CandidatePlanCharacter {
        CandidatePlanCharacter::new(true, false)
    }

    /// The plan that produced the current document cannot supply the sort
    fn current_plan_scan_and_order_required(&self) -> bool {
        false
    }

    /// A hybrid set finished because an out-of-order plan was exhausted
    fn complete_plan_of_hybrid_set_scan_and_order_required(&self) -> bool {
        false
    }

    /// Still racing plans, so the in-order candidate has not been abandoned
    fn running_initial_in_order_plan(&self) -> bool {
        false
    }

    /// A cached plan was used and other candidates were left out
    fn has_possibly_excluded_plans(&self) -> bool {
        false
    }

    /// Stops the out-of-order candidates; the in-order one keeps running
    fn abort_out_of_order_plans(&mut self) {}

    /// Forgets cached plans that led to this cursor
    fn clear_cached_plans(&self) {}

    /// Explain counters, one entry per clause run so far
    fn explain_info(&self) -> Vec<ClauseExplain>;
}

/// Counters inherited from the candidates a winning plan raced against
#[derive(Debug, Clone, Default)]
pub struct TakeoverHistory {
    pub base_nscanned: u64,
    pub base_nscanned_objects: u64,
    pub other_plans: Vec<PlanExplain>,
    pub old_plan: Option<OldPlanExplain>,
}

/// Cursor driving exactly one plan
///
/// Used both when planning produced a single candidate and, with a
/// `TakeoverHistory`, to continue the winner of an interleaved race from
/// where it stopped.
pub struct ScanCursor {
    plan: QueryPlan,
    scan: Option<Box<dyn IndexScan>>,
    matcher: Arc<dyn Matcher>,
    interrupt: Interrupt,
    current_match: Option<bool>,
    failed: Option<ExecutorError>,
    n: u64,
    character: CandidatePlanCharacter,
    history: TakeoverHistory,
}

impl ScanCursor {
    /// Opens the plan's scan. Impossible plans never open one.
    pub fn new(
        plan: QueryPlan,
        handle: CollectionHandle,
        matcher: Arc<dyn Matcher>,
        interrupt: Interrupt,
    ) -> Self {
        let scan = (!plan.is_impossible()).then(|| plan.new_scan(handle));
        Self::from_scan(plan, scan, matcher, interrupt)
    }

    /// Wraps an already positioned scan
    pub fn from_scan(
        plan: QueryPlan,
        scan: Option<Box<dyn IndexScan>>,
        matcher: Arc<dyn Matcher>,
        interrupt: Interrupt,
    ) -> Self {
        let character = CandidatePlanCharacter::new(
            !plan.scan_and_order_required(),
            plan.scan_and_order_required(),
        );
        Self {
            plan,
            scan,
            matcher,
            interrupt,
            current_match: None,
            failed: None,
            n: 0,
            character,
            history: TakeoverHistory::default(),
        }
    }

    /// Carries the race's counters and plan entries into the taken-over scan
    pub fn with_history(mut self, history: TakeoverHistory) -> Self {
        self.history = history;
        self
    }

    pub fn with_character(mut self, character: CandidatePlanCharacter) -> Self {
        self.character = character;
        self
    }

    pub fn with_old_plan(mut self, old_plan: Option<OldPlanExplain>) -> Self {
        self.history.old_plan = old_plan;
        self
    }

    /// The plan being scanned
    pub fn plan(&self) -> &QueryPlan {
        &self.plan
    }

    fn scan(&self) -> ExecutorResult<&dyn IndexScan> {
        match &self.scan {
            Some(scan) if scan.ok() && self.failed.is_none() => Ok(scan.as_ref()),
            _ => Err(ExecutorError::invalid_access("cursor is not positioned")),
        }
    }

    fn own_nscanned(&self) -> u64 {
        self.scan.as_ref().map_or(0, |s| s.nscanned())
    }

    fn own_nscanned_objects(&self) -> u64 {
        self.scan.as_ref().map_or(0, |s| s.nscanned_objects())
    }
}

impl QueryCursor for ScanCursor {
    fn ok(&self) -> bool {
        self.failed.is_none() && self.scan.as_ref().is_some_and(|s| s.ok())
    }

    fn advance(&mut self) -> ExecutorResult<bool> {
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }
        if let Err(err) = self.interrupt.check() {
            self.failed = Some(err.clone());
            return Err(err);
        }
        self.current_match = None;
        Ok(match &mut self.scan {
            Some(scan) => scan.advance(),
            None => false,
        })
    }

    fn current(&self) -> ExecutorResult<&Value> {
        self.scan()?
            .current()
            .ok_or_else(|| ExecutorError::invalid_access("current"))
    }

    fn curr_key(&self) -> ExecutorResult<&[KeyPart]> {
        self.scan()?
            .curr_key()
            .ok_or_else(|| ExecutorError::invalid_access("curr_key"))
    }

    fn curr_pk(&self) -> ExecutorResult<&IndexKey> {
        self.scan()?
            .curr_pk()
            .ok_or_else(|| ExecutorError::invalid_access("curr_pk"))
    }

    fn matcher(&self) -> Option<Arc<dyn Matcher>> {
        Some(Arc::clone(&self.matcher))
    }

    fn current_matches(&mut self) -> bool {
        if let Some(memo) = self.current_match {
            return memo;
        }
        let matched = match self.current() {
            Ok(document) => self.matcher.matches(document),
            Err(_) => return false,
        };
        self.current_match = Some(matched);
        matched
    }

    /// A single scan never revisits a key, so only counting happens here
    fn getsetdup(&mut self, _pk: &IndexKey) -> bool {
        self.n += 1;
        false
    }

    fn index_key_pattern(&self) -> KeyPattern {
        self.plan.key_pattern().clone()
    }

    fn nscanned(&self) -> u64 {
        self.history.base_nscanned + self.own_nscanned()
    }

    fn nscanned_objects(&self) -> u64 {
        self.history.base_nscanned_objects + self.own_nscanned_objects()
    }

    fn describe(&self) -> String {
        self.plan.describe()
    }

    fn candidate_plan_character(&self) -> CandidatePlanCharacter {
        self.character
    }

    fn current_plan_scan_and_order_required(&self) -> bool {
        self.plan.scan_and_order_required()
    }

    fn explain_info(&self) -> Vec<ClauseExplain> {
        let mut picked = PlanExplain::for_plan(&self.plan);
        picked.n = self.n;
        picked.nscanned = self.own_nscanned();
        picked.nscanned_objects = self.own_nscanned_objects();
        picked.picked = true;
        picked.done = !self.ok();

        let mut clause = ClauseExplain::single(picked);
        clause.nscanned = self.nscanned();
        clause.nscanned_objects = self.nscanned_objects();
        clause.all_plans.extend(self.history.other_plans.iter().cloned());
        clause.old_plan = self.history.old_plan.clone();
        vec![clause]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::matcher::PredicateMatcher;
    use crate::planner::{FieldRangeSet, QueryExpr};
    use crate::storage::{write_collection, Catalog};
    use serde_json::json;

    fn setup(docs: &[Value]) -> CollectionHandle {
        let catalog = Catalog::new();
        let handle = catalog.get_or_create("db.c").unwrap();
        {
            let mut coll = write_collection(&handle);
            for d in docs {
                coll.insert(d.clone()).unwrap();
            }
        }
        handle
    }

    fn cursor(handle: &CollectionHandle, query: Value) -> ScanCursor {
        let expr = QueryExpr::parse(&query).unwrap();
        let ranges = FieldRangeSet::from_predicates(expr.predicates());
        let plan = QueryPlan::table_scan("db.c", &ranges, &KeyPattern::empty());
        ScanCursor::new(
            plan,
            handle.clone(),
            Arc::new(PredicateMatcher::new(&expr)),
            Interrupt::new(),
        )
    }

    #[test]
    fn test_table_scan_cursor_walks_all_documents() {
        let handle = setup(&[json!({"_id": 1, "a": 1}), json!({"_id": 2, "a": 2})]);
        let mut c = cursor(&handle, json!({"a": 2}));

        assert!(c.ok());
        assert!(!c.current_matches());
        assert!(c.advance().unwrap());
        assert!(c.current_matches());
        assert_eq!(c.current().unwrap()["_id"], json!(2));
        assert!(!c.advance().unwrap());
        assert!(c.current().is_err());
        assert_eq!(c.nscanned(), 2);
    }

    #[test]
    fn test_impossible_plan_is_never_positioned() {
        let handle = setup(&[json!({"_id": 1, "a": 1})]);
        let c = cursor(&handle, json!({"a": {"$gt": 5, "$lt": 3}}));
        assert!(!c.ok());
        assert_eq!(c.nscanned(), 0);
    }

    #[test]
    fn test_interrupt_is_sticky() {
        let handle = setup(&[json!({"_id": 1}), json!({"_id": 2})]);
        let mut c = cursor(&handle, json!({}));
        c.interrupt.kill();
        assert!(c.advance().unwrap_err().is_interrupted());
        assert!(!c.ok());
        assert!(c.advance().unwrap_err().is_interrupted());
    }

    #[test]
    fn test_history_counts_roll_into_totals() {
        let handle = setup(&[json!({"_id": 1})]);
        let c = cursor(&handle, json!({})).with_history(TakeoverHistory {
            base_nscanned: 7,
            base_nscanned_objects: 3,
            other_plans: vec![PlanExplain::default()],
            old_plan: None,
        });
        assert_eq!(c.nscanned(), 8);
        let explain = c.explain_info();
        assert_eq!(explain[0].nscanned, 8);
        assert_eq!(explain[0].all_plans.len(), 2);
        assert!(explain[0].all_plans[0].picked);
    }
}
