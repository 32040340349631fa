//! One candidate plan inside an interleaved race
//!
//! A runner owns its scan and does one unit of work per `step()`: move to
//! the next entry (except on the first step) and evaluate the matcher.
//! It counts distinct matches and asks to stop once it reaches the
//! takeover threshold.

use std::sync::Arc;

use serde_json::Value;

use crate::index::{IndexKey, IndexScan, KeyPart};
use crate::planner::{PlanExplain, PlanSelectionPolicy, PlannerError, QueryPlan, QueryShape};
use crate::storage::CollectionHandle;

use super::dedup::DupSet;
use super::errors::{ExecutorError, ExecutorResult};
use super::matcher::Matcher;

/// One candidate plan: its scan, matcher and counters
pub struct PlanRunner {
    plan: QueryPlan,
    scan: Option<Box<dyn IndexScan>>,
    matcher: Arc<dyn Matcher>,
    seen: DupSet,
    matches: u64,
    counting: bool,
    threshold: u64,
    must_advance: bool,
    current_match: bool,
    complete: bool,
    stop_requested: bool,
    aborted: bool,
}

impl PlanRunner {
    /// `counting` runners can request takeover; out-of-order plans of a
    /// hybrid set run with it off.
    pub fn new(
        plan: QueryPlan,
        matcher: Arc<dyn Matcher>,
        counting: bool,
        threshold: u64,
        dedup_upgrade_threshold: usize,
    ) -> Self {
        Self {
            plan,
            scan: None,
            matcher,
            seen: DupSet::new(dedup_upgrade_threshold),
            matches: 0,
            counting,
            threshold,
            must_advance: false,
            current_match: false,
            complete: false,
            stop_requested: false,
            aborted: false,
        }
    }

    /// Opens the scan. Impossible plans complete immediately.
    ///
    /// Fails when the policy forbids the plan or when order is required
    /// and the plan would have to reorder its output.
    pub fn init(
        &mut self,
        handle: CollectionHandle,
        policy: PlanSelectionPolicy,
        require_order: bool,
        shape: &QueryShape,
    ) -> ExecutorResult<()> {
        if !policy.permit_plan(&self.plan) {
            return Err(PlannerError::plan_not_permitted(self.plan.ns(), shape, policy.name()).into());
        }
        if self.plan.is_impossible() {
            self.complete = true;
            return Ok(());
        }
        if require_order && self.plan.scan_and_order_required() {
            return Err(PlannerError::sort_not_satisfiable(self.plan.ns(), shape).into());
        }
        let scan = self.plan.new_scan(handle);
        self.complete = !scan.ok();
        self.scan = Some(scan);
        Ok(())
    }

    /// Able to take another step
    pub fn is_active(&self) -> bool {
        !(self.complete || self.stop_requested || self.aborted)
    }

    /// Moves the scan one position and counts a new match
    pub fn step(&mut self) {
        if !self.is_active() {
            return;
        }
        let Some(scan) = self.scan.as_mut() else {
            self.complete = true;
            return;
        };
        if self.must_advance {
            scan.advance();
        }
        self.must_advance = true;

        let (Some(document), Some(pk)) = (scan.current(), scan.curr_pk()) else {
            self.current_match = false;
            self.complete = true;
            return;
        };
        self.current_match = self.matcher.matches(document);
        if self.current_match && self.seen.insert(pk) {
            self.matches += 1;
            if self.counting && self.matches >= self.threshold {
                self.stop_requested = true;
            }
        }
    }

    /// Stops the runner; it is never stepped again
    pub fn abort(&mut self) {
        self.aborted = true;
    }

    /// The plan this runner executes
    pub fn plan(&self) -> &QueryPlan {
        &self.plan
    }

    pub fn matcher(&self) -> Arc<dyn Matcher> {
        Arc::clone(&self.matcher)
    }

    /// Document at the scan position
    pub fn current(&self) -> ExecutorResult<&Value> {
        self.positioned()?
            .current()
            .ok_or_else(|| ExecutorError::invalid_access("current"))
    }

    pub fn curr_key(&self) -> ExecutorResult<&[KeyPart]> {
        self.positioned()?
            .curr_key()
            .ok_or_else(|| ExecutorError::invalid_access("curr_key"))
    }

    /// Primary key at the scan position
    pub fn curr_pk(&self) -> ExecutorResult<&IndexKey> {
        self.positioned()?
            .curr_pk()
            .ok_or_else(|| ExecutorError::invalid_access("curr_pk"))
    }

    fn positioned(&self) -> ExecutorResult<&dyn IndexScan> {
        match &self.scan {
            Some(scan) if scan.ok() => Ok(scan.as_ref()),
            _ => Err(ExecutorError::invalid_access("plan is not positioned")),
        }
    }

    /// Whether the document at the scan position matched
    pub fn current_match(&self) -> bool {
        self.current_match
    }

    /// Distinct matches found so far
    pub fn matches(&self) -> u64 {
        self.matches
    }

    /// The scan ran to its end
    pub fn complete(&self) -> bool {
        self.complete
    }

    /// Reached the takeover threshold
    pub fn stop_requested(&self) -> bool {
        self.stop_requested
    }

    pub fn aborted(&self) -> bool {
        self.aborted
    }

    /// Keys or documents examined
    pub fn nscanned(&self) -> u64 {
        self.scan.as_ref().map_or(0, |s| s.nscanned())
    }

    pub fn nscanned_objects(&self) -> u64 {
        self.scan.as_ref().map_or(0, |s| s.nscanned_objects())
    }

    /// Explain entry for `allPlans`
    pub fn explain(&self, picked: bool) -> PlanExplain {
        PlanExplain {
            n: self.matches,
            nscanned: self.nscanned(),
            nscanned_objects: self.nscanned_objects(),
            picked,
            done: self.complete,
            aborted: self.aborted,
            ..PlanExplain::for_plan(&self.plan)
        }
    }

    /// Hands the plan and its positioned scan to a successor cursor
    pub fn into_parts(self) -> (QueryPlan, Option<Box<dyn IndexScan>>, Arc<dyn Matcher>) {
        (self.plan, self.scan, self.matcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::matcher::PredicateMatcher;
    use crate::index::KeyPattern;
    use crate::planner::{FieldRangeSet, QueryExpr};
    use crate::storage::{write_collection, Catalog};
    use serde_json::json;

    fn runner(handle: &CollectionHandle, query: Value, threshold: u64) -> PlanRunner {
        let expr = QueryExpr::parse(&query).unwrap();
        let ranges = FieldRangeSet::from_predicates(expr.predicates());
        let plan = QueryPlan::table_scan("db.c", &ranges, &KeyPattern::empty());
        let shape = QueryShape::new(&ranges, &KeyPattern::empty());
        let mut r = PlanRunner::new(plan, Arc::new(PredicateMatcher::new(&expr)), true, threshold, 500);
        r.init(handle.clone(), PlanSelectionPolicy::Any, false, &shape).unwrap();
        r
    }

    fn collection(n: i64) -> CollectionHandle {
        let catalog = Catalog::new();
        let handle = catalog.get_or_create("db.c").unwrap();
        {
            let mut coll = write_collection(&handle);
            for i in 0..n {
                coll.insert(json!({"_id": i, "even": i % 2 == 0})).unwrap();
            }
        }
        handle
    }

    #[test]
    fn test_first_step_evaluates_initial_position() {
        let handle = collection(3);
        let mut r = runner(&handle, json!({"even": true}), 100);
        r.step();
        assert_eq!(r.current().unwrap()["_id"], json!(0));
        assert!(r.current_match());
        r.step();
        assert_eq!(r.current().unwrap()["_id"], json!(1));
        assert!(!r.current_match());
        assert_eq!(r.matches(), 1);
    }

    #[test]
    fn test_threshold_requests_stop() {
        let handle = collection(10);
        let mut r = runner(&handle, json!({"even": true}), 2);
        while r.is_active() {
            r.step();
        }
        assert!(r.stop_requested());
        assert!(!r.complete());
        assert_eq!(r.matches(), 2);
        assert_eq!(r.current().unwrap()["_id"], json!(2));
    }

    #[test]
    fn test_exhaustion_completes() {
        let handle = collection(2);
        let mut r = runner(&handle, json!({}), 100);
        r.step();
        r.step();
        assert!(r.is_active());
        r.step();
        assert!(r.complete());
        assert!(r.current().is_err());
        assert!(r.explain(false).done);
    }

    #[test]
    fn test_init_enforces_policy_and_order() {
        let handle = collection(2);
        let ranges = FieldRangeSet::default();
        let sort = KeyPattern::single("x");
        let shape = QueryShape::new(&ranges, &sort);
        let plan = QueryPlan::table_scan("db.c", &ranges, &sort);
        let matcher: Arc<dyn Matcher> = Arc::new(PredicateMatcher::default());

        let mut r = PlanRunner::new(plan.clone(), Arc::clone(&matcher), true, 101, 500);
        let err = r
            .init(handle.clone(), PlanSelectionPolicy::IndexOnly, false, &shape)
            .unwrap_err();
        assert_eq!(err.code(), crate::executor::ExecutorErrorCode::AeroQueryPlanNotPermitted);

        let mut r = PlanRunner::new(plan, matcher, true, 101, 500);
        let err = r.init(handle, PlanSelectionPolicy::Any, true, &shape).unwrap_err();
        assert_eq!(err.code(), crate::executor::ExecutorErrorCode::AeroQuerySortNotSatisfiable);
        assert!(err.message().contains("db.c"));
    }

    #[test]
    fn test_impossible_plan_completes_on_init() {
        let handle = collection(2);
        let r = runner(&handle, json!({"_id": {"$gt": 5, "$lt": 1}}), 100);
        assert!(r.complete());
        assert_eq!(r.nscanned(), 0);
    }
}
