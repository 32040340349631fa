//! Round-robin driver for a set of candidate plans
//!
//! Each step advances the active runner that has examined the fewest keys
//! (ties go to the earliest runner), so candidates progress at the same
//! rate measured in work done rather than in documents returned.

use std::sync::Arc;

use crate::observability::{Event, Logger};
use crate::planner::{
    CachedPlan, CandidatePlanCharacter, CandidatePlanSet, ClauseExplain, OldPlanExplain,
    PlanCache, PlanSelectionPolicy, QueryShape,
};
use crate::storage::CollectionHandle;

use super::config::ExecutorConfig;
use super::cursor::{ScanCursor, TakeoverHistory};
use super::errors::ExecutorResult;
use super::interrupt::Interrupt;
use super::matcher::Matcher;
use super::runner::PlanRunner;

/// Outcome of one scheduling step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The runner moved and is positioned on a document
    Positioned(usize),
    /// The runner reached the match threshold and should take over
    TakeOver(usize),
    /// The runner ran out of entries; every result has been produced
    Complete(usize),
    /// No runner can make progress
    Exhausted,
}

/// Races the candidate plans of one query clause
pub struct MultiPlanScanner {
    ns: String,
    shape: QueryShape,
    runners: Vec<PlanRunner>,
    character: CandidatePlanCharacter,
    cache: Option<Arc<PlanCache>>,
    old_plan: Option<OldPlanExplain>,
    possibly_excluded_plans: bool,
}

impl MultiPlanScanner {
    pub fn new(
        set: CandidatePlanSet,
        handle: &CollectionHandle,
        matcher: Arc<dyn Matcher>,
        config: &ExecutorConfig,
        cache: Option<Arc<PlanCache>>,
        policy: PlanSelectionPolicy,
        require_order: bool,
    ) -> ExecutorResult<Self> {
        let ns = set.first_plan().map(|p| p.ns().to_string()).unwrap_or_default();
        let shape = set.shape().clone();
        let character = set.character();
        let possibly_excluded_plans = set.possibly_excluded_plans();
        let old_plan = match (set.cached_plan(), set.first_plan()) {
            (Some(cached), Some(plan)) => Some(OldPlanExplain {
                cursor: plan.describe(),
                nscanned: cached.nscanned,
            }),
            _ => None,
        };

        // One runner failing to start fails the whole race
        let hybrid = character.hybrid();
        let mut runners = Vec::with_capacity(set.len());
        for plan in set.into_plans() {
            let counting = !(hybrid && plan.scan_and_order_required());
            let mut runner = PlanRunner::new(
                plan,
                Arc::clone(&matcher),
                counting,
                config.takeover_match_threshold,
                config.dedup_upgrade_threshold,
            );
            runner.init(Arc::clone(handle), policy, require_order, &shape)?;
            runners.push(runner);
        }

        Ok(Self {
            ns,
            shape,
            runners,
            character,
            cache,
            old_plan,
            possibly_excluded_plans,
        })
    }

    /// Steps the active runner that has examined the least
    pub fn step(&mut self) -> StepOutcome {
        if let Some(idx) = self.runners.iter().position(|r| r.complete() && !r.aborted()) {
            return StepOutcome::Complete(idx);
        }

        let next = self
            .runners
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_active())
            .min_by_key(|(idx, r)| (r.nscanned(), *idx))
            .map(|(idx, _)| idx);
        let Some(idx) = next else {
            return StepOutcome::Exhausted;
        };

        let runner = &mut self.runners[idx];
        runner.step();
        if runner.complete() {
            StepOutcome::Complete(idx)
        } else if runner.stop_requested() {
            StepOutcome::TakeOver(idx)
        } else {
            StepOutcome::Positioned(idx)
        }
    }

    /// Runner at `idx`; panics if out of range
    pub fn runner(&self, idx: usize) -> &PlanRunner {
        &self.runners[idx]
    }

    /// Number of candidate plans
    pub fn len(&self) -> usize {
        self.runners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runners.is_empty()
    }

    pub fn ns(&self) -> &str {
        &self.ns
    }

    /// Plan cache key of the query
    pub fn shape(&self) -> &QueryShape {
        &self.shape
    }

    pub fn character(&self) -> CandidatePlanCharacter {
        self.character
    }

    /// A cached plan kept other candidates out of the race
    pub fn possibly_excluded_plans(&self) -> bool {
        self.possibly_excluded_plans
    }

    /// Total examined across all runners
    pub fn nscanned(&self) -> u64 {
        self.runners.iter().map(PlanRunner::nscanned).sum()
    }

    pub fn nscanned_objects(&self) -> u64 {
        self.runners.iter().map(PlanRunner::nscanned_objects).sum()
    }

    /// Remembers the winner for this namespace and query shape; false
    /// when there is no cache to record into
    pub fn record_winner(&self, idx: usize) -> bool {
        let Some(cache) = &self.cache else {
            return false;
        };
        let runner = &self.runners[idx];
        cache.record(
            &self.ns,
            &self.shape,
            CachedPlan {
                index_name: runner.plan().index_name().map(str::to_string),
                nscanned: runner.nscanned(),
            },
        );
        Logger::info(
            Event::PlanRecorded.as_str(),
            &[
                ("ns", self.ns.as_str()),
                ("shape", self.shape.to_string().as_str()),
                ("plan", runner.plan().describe().as_str()),
            ],
        );
        true
    }

    /// Forgets the cache entry for this query shape
    pub fn clear_cached_plan(&self) {
        if let Some(cache) = &self.cache {
            cache.clear_entry(&self.ns, &self.shape);
        }
    }

    /// Stops every runner whose plan needs an in-memory sort
    pub fn abort_out_of_order_plans(&mut self) {
        for runner in &mut self.runners {
            if runner.plan().scan_and_order_required() {
                runner.abort();
            }
        }
        Logger::info(
            Event::PlanOutOfOrderAborted.as_str(),
            &[("ns", self.ns.as_str()), ("shape", self.shape.to_string().as_str())],
        );
    }

    pub fn explain(&self, picked: Option<usize>) -> ClauseExplain {
        let all_plans: Vec<_> = self
            .runners
            .iter()
            .enumerate()
            .map(|(idx, r)| r.explain(Some(idx) == picked))
            .collect();
        let shown = picked.or(if self.runners.is_empty() { None } else { Some(0) });
        let (cursor, index_bounds, scan_and_order) = match shown.map(|i| &all_plans[i]) {
            Some(p) => (p.cursor.clone(), p.index_bounds.clone(), p.scan_and_order),
            None => (String::new(), serde_json::Value::Object(Default::default()), false),
        };
        ClauseExplain {
            cursor,
            index_bounds,
            n: 0,
            nscanned: self.nscanned(),
            nscanned_objects: self.nscanned_objects(),
            scan_and_order,
            all_plans,
            old_plan: self.old_plan.clone(),
        }
    }

    /// Turns the winner into a single-plan cursor continuing from its
    /// current position, carrying the losers' counters.
    pub fn take_over(self, idx: usize, interrupt: Interrupt) -> ScanCursor {
        let mut history = TakeoverHistory {
            old_plan: self.old_plan,
            ..TakeoverHistory::default()
        };
        let mut runners = self.runners;
        let winner = runners.remove(idx);
        for runner in &runners {
            history.base_nscanned += runner.nscanned();
            history.base_nscanned_objects += runner.nscanned_objects();
            history.other_plans.push(runner.explain(false));
        }

        let (plan, scan, matcher) = winner.into_parts();
        ScanCursor::from_scan(plan, scan, matcher, interrupt)
            .with_history(history)
            .with_character(self.character)
    }
}
