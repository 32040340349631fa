//! Cursor that races several candidate plans
//!
//! While interleaving, each `advance()` steps exactly one runner and the
//! cursor exposes that runner's position. When a runner reaches the match
//! threshold it takes over: the cursor continues with that plan alone,
//! from the document it stopped on. When any runner is exhausted every
//! result has been produced and the cursor ends.
//!
//! Documents may come back more than once while plans interleave; callers
//! filter them through `getsetdup`, which this cursor answers from one set
//! spanning the whole life of the cursor, takeover included.

use std::sync::Arc;

use serde_json::Value;

use crate::index::{IndexKey, KeyPart, KeyPattern};
use crate::observability::{Event, Logger, MetricsRegistry};
use crate::planner::{CandidatePlanCharacter, ClauseExplain};

use super::cursor::{QueryCursor, ScanCursor};
use super::dedup::DupSet;
use super::errors::{ExecutorError, ExecutorResult};
use super::interrupt::Interrupt;
use super::matcher::Matcher;
use super::multi_plan::{MultiPlanScanner, StepOutcome};

enum State {
    Interleaving {
        scanner: MultiPlanScanner,
        current: Option<usize>,
    },
    TakenOver(Box<ScanCursor>),
    Exhausted(Box<ExhaustedState>),
}

struct ExhaustedState {
    explain: ClauseExplain,
    nscanned: u64,
    nscanned_objects: u64,
    key_pattern: KeyPattern,
}

pub struct InterleavingCursor {
    state: State,
    dups: DupSet,
    n: u64,
    interrupt: Interrupt,
    failed: Option<ExecutorError>,
    character: CandidatePlanCharacter,
    possibly_excluded_plans: bool,
    hybrid_out_of_order_complete: bool,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl InterleavingCursor {
    /// Starts the race and positions the cursor on the first document
    pub fn new(
        scanner: MultiPlanScanner,
        dedup_upgrade_threshold: usize,
        interrupt: Interrupt,
        metrics: Option<Arc<MetricsRegistry>>,
    ) -> ExecutorResult<Self> {
        let character = scanner.character();
        let possibly_excluded_plans = scanner.possibly_excluded_plans();
        let mut cursor = Self {
            state: State::Interleaving {
                scanner,
                current: None,
            },
            dups: DupSet::new(dedup_upgrade_threshold),
            n: 0,
            interrupt,
            failed: None,
            character,
            possibly_excluded_plans,
            hybrid_out_of_order_complete: false,
            metrics,
        };
        cursor.advance()?;
        Ok(cursor)
    }

    fn step_scanner(&mut self) {
        let outcome = match &mut self.state {
            State::Interleaving { scanner, .. } => scanner.step(),
            _ => return,
        };
        match outcome {
            StepOutcome::Positioned(idx) => {
                if let State::Interleaving { current, .. } = &mut self.state {
                    *current = Some(idx);
                }
            }
            StepOutcome::TakeOver(idx) => self.take_over(idx),
            StepOutcome::Complete(idx) => self.finish(Some(idx)),
            StepOutcome::Exhausted => self.finish(None),
        }
    }

    fn take_over(&mut self, idx: usize) {
        let State::Interleaving { scanner, .. } =
            std::mem::replace(&mut self.state, State::Exhausted(Box::new(ExhaustedState::empty())))
        else {
            return;
        };
        let recorded = scanner.record_winner(idx);
        let winner = scanner.runner(idx).plan().describe();
        Logger::info(
            Event::PlanTakeover.as_str(),
            &[("ns", scanner.ns()), ("plan", winner.as_str())],
        );
        if let Some(metrics) = &self.metrics {
            metrics.increment_plan_takeovers();
            if recorded {
                metrics.increment_plan_cache_records();
            }
        }
        let cursor = scanner.take_over(idx, self.interrupt.clone());
        self.state = State::TakenOver(Box::new(cursor));
    }

    fn finish(&mut self, completed: Option<usize>) {
        let State::Interleaving { scanner, .. } = &self.state else {
            return;
        };
        if let Some(idx) = completed {
            if scanner.record_winner(idx) {
                if let Some(metrics) = &self.metrics {
                    metrics.increment_plan_cache_records();
                }
            }
            let plan = scanner.runner(idx).plan();
            self.hybrid_out_of_order_complete =
                self.character.hybrid() && plan.scan_and_order_required();
        }
        let mut explain = scanner.explain(completed);
        explain.n = self.n;
        let exhausted = ExhaustedState {
            explain,
            nscanned: scanner.nscanned(),
            nscanned_objects: scanner.nscanned_objects(),
            key_pattern: completed
                .map(|idx| scanner.runner(idx).plan().key_pattern().clone())
                .unwrap_or_else(KeyPattern::empty),
        };
        self.state = State::Exhausted(Box::new(exhausted));
    }

    fn not_positioned() -> ExecutorError {
        ExecutorError::invalid_access("cursor is not positioned")
    }

    /// Still racing plans rather than running a single winner
    pub fn is_interleaving(&self) -> bool {
        matches!(self.state, State::Interleaving { .. })
    }
}

impl ExhaustedState {
    fn empty() -> Self {
        Self {
            explain: ClauseExplain::default(),
            nscanned: 0,
            nscanned_objects: 0,
            key_pattern: KeyPattern::empty(),
        }
    }
}

impl QueryCursor for InterleavingCursor {
    fn ok(&self) -> bool {
        if self.failed.is_some() {
            return false;
        }
        match &self.state {
            State::Interleaving { current, .. } => current.is_some(),
            State::TakenOver(cursor) => cursor.ok(),
            State::Exhausted(_) => false,
        }
    }

    fn advance(&mut self) -> ExecutorResult<bool> {
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }
        if let Err(err) = self.interrupt.check() {
            self.failed = Some(err.clone());
            return Err(err);
        }
        if self.is_interleaving() {
            self.step_scanner();
        } else if let State::TakenOver(cursor) = &mut self.state {
            if let Err(err) = cursor.advance() {
                self.failed = Some(err.clone());
                return Err(err);
            }
        }
        Ok(self.ok())
    }

    fn current(&self) -> ExecutorResult<&Value> {
        if self.failed.is_some() {
            return Err(Self::not_positioned());
        }
        match &self.state {
            State::Interleaving {
                scanner,
                current: Some(idx),
            } => scanner.runner(*idx).current(),
            State::TakenOver(cursor) => cursor.current(),
            _ => Err(Self::not_positioned()),
        }
    }

    fn curr_key(&self) -> ExecutorResult<&[KeyPart]> {
        if self.failed.is_some() {
            return Err(Self::not_positioned());
        }
        match &self.state {
            State::Interleaving {
                scanner,
                current: Some(idx),
            } => scanner.runner(*idx).curr_key(),
            State::TakenOver(cursor) => cursor.curr_key(),
            _ => Err(Self::not_positioned()),
        }
    }

    fn curr_pk(&self) -> ExecutorResult<&IndexKey> {
        if self.failed.is_some() {
            return Err(Self::not_positioned());
        }
        match &self.state {
            State::Interleaving {
                scanner,
                current: Some(idx),
            } => scanner.runner(*idx).curr_pk(),
            State::TakenOver(cursor) => cursor.curr_pk(),
            _ => Err(Self::not_positioned()),
        }
    }

    fn matcher(&self) -> Option<Arc<dyn Matcher>> {
        match &self.state {
            State::Interleaving {
                scanner,
                current: Some(idx),
            } => Some(scanner.runner(*idx).matcher()),
            State::TakenOver(cursor) => cursor.matcher(),
            _ => None,
        }
    }

    fn current_matches(&mut self) -> bool {
        if !self.ok() {
            return false;
        }
        match &mut self.state {
            State::Interleaving {
                scanner,
                current: Some(idx),
            } => scanner.runner(*idx).current_match(),
            State::TakenOver(cursor) => cursor.current_matches(),
            _ => false,
        }
    }

    fn getsetdup(&mut self, pk: &IndexKey) -> bool {
        let dup = self.dups.getsetdup(pk);
        if !dup {
            self.n += 1;
        }
        dup
    }

    fn index_key_pattern(&self) -> KeyPattern {
        match &self.state {
            State::Interleaving {
                scanner,
                current: Some(idx),
            } => scanner.runner(*idx).plan().key_pattern().clone(),
            State::Interleaving { .. } => KeyPattern::empty(),
            State::TakenOver(cursor) => cursor.index_key_pattern(),
            State::Exhausted(done) => done.key_pattern.clone(),
        }
    }

    fn nscanned(&self) -> u64 {
        match &self.state {
            State::Interleaving { scanner, .. } => scanner.nscanned(),
            State::TakenOver(cursor) => cursor.nscanned(),
            State::Exhausted(done) => done.nscanned,
        }
    }

    fn nscanned_objects(&self) -> u64 {
        match &self.state {
            State::Interleaving { scanner, .. } => scanner.nscanned_objects(),
            State::TakenOver(cursor) => cursor.nscanned_objects(),
            State::Exhausted(done) => done.nscanned_objects,
        }
    }

    fn describe(&self) -> String {
        match &self.state {
            State::TakenOver(cursor) => cursor.describe(),
            _ => "QueryOptimizerCursor".to_string(),
        }
    }

    fn candidate_plan_character(&self) -> CandidatePlanCharacter {
        self.character
    }

    fn current_plan_scan_and_order_required(&self) -> bool {
        match &self.state {
            State::Interleaving {
                scanner,
                current: Some(idx),
            } => scanner.runner(*idx).plan().scan_and_order_required(),
            State::TakenOver(cursor) => cursor.current_plan_scan_and_order_required(),
            _ => false,
        }
    }

    fn complete_plan_of_hybrid_set_scan_and_order_required(&self) -> bool {
        self.hybrid_out_of_order_complete
    }

    fn running_initial_in_order_plan(&self) -> bool {
        self.is_interleaving() && self.character.may_run_in_order_plan()
    }

    fn has_possibly_excluded_plans(&self) -> bool {
        self.possibly_excluded_plans
    }

    fn abort_out_of_order_plans(&mut self) {
        if let State::Interleaving { scanner, .. } = &mut self.state {
            scanner.abort_out_of_order_plans();
        }
    }

    fn clear_cached_plans(&self) {
        if let State::Interleaving { scanner, .. } = &self.state {
            scanner.clear_cached_plan();
        }
    }

    fn explain_info(&self) -> Vec<ClauseExplain> {
        let mut explain = match &self.state {
            State::Interleaving { scanner, current } => scanner.explain(*current),
            State::TakenOver(cursor) => cursor.explain_info().pop().unwrap_or_default(),
            State::Exhausted(done) => done.explain.clone(),
        };
        explain.n = self.n;
        vec![explain]
    }
}
