//! Chooses the cursor that will execute a query
//!
//! In order of preference:
//! 1. an empty query without sort or hint scans the table
//! 2. an exact `_id` equality without sort or hint reads one index point
//! 3. a top-level `$or` without sort or hint, whose clauses can all use an
//!    index, runs clause by clause
//! 4. everything else is planned as a whole: one candidate runs alone,
//!    several are interleaved

use std::sync::Arc;

use crate::index::KeyPattern;
use crate::observability::{Event, Logger, MetricsRegistry};
use crate::planner::{
    clauses_are_indexable, decompose, generate_plans, ClauseSpec, FieldRangeSet, Hint,
    PlanCache, PlanRequest, PlanSelectionPolicy, Predicate, QueryExpr, QueryPlan,
};
use crate::storage::{read_collection, CollectionHandle, ID_INDEX_NAME};

use super::config::ExecutorConfig;
use super::cursor::{QueryCursor, ScanCursor};
use super::errors::{ExecutorError, ExecutorResult};
use super::interleaving::InterleavingCursor;
use super::interrupt::Interrupt;
use super::matcher::{Matcher, PredicateMatcher};
use super::multi_plan::MultiPlanScanner;
use super::or_sequencer::OrClauseSequencer;

/// Everything a cursor needs beyond the query itself
#[derive(Clone)]
pub struct CursorContext {
    pub handle: CollectionHandle,
    pub ns: String,
    pub cache: Option<Arc<PlanCache>>,
    pub policy: PlanSelectionPolicy,
    pub config: ExecutorConfig,
    pub interrupt: Interrupt,
    pub metrics: Option<Arc<MetricsRegistry>>,
}

impl CursorContext {
    pub fn new(handle: CollectionHandle, ns: impl Into<String>, config: ExecutorConfig) -> Self {
        Self {
            handle,
            ns: ns.into(),
            cache: None,
            policy: PlanSelectionPolicy::Any,
            config,
            interrupt: Interrupt::new(),
            metrics: None,
        }
    }

    pub fn with_cache(mut self, cache: Arc<PlanCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_policy(mut self, policy: PlanSelectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

/// The query-specific inputs
#[derive(Debug, Clone, Copy)]
pub struct CursorRequest<'a> {
    pub query: &'a QueryExpr,
    pub sort: &'a KeyPattern,
    pub hint: Option<&'a Hint>,
    /// Every plan must supply `sort` without reordering
    pub require_order: bool,
}

impl<'a> CursorRequest<'a> {
    pub fn new(query: &'a QueryExpr, sort: &'a KeyPattern) -> Self {
        Self {
            query,
            sort,
            hint: None,
            require_order: false,
        }
    }
}

pub fn new_query_cursor(
    ctx: &CursorContext,
    request: &CursorRequest<'_>,
) -> ExecutorResult<Box<dyn QueryCursor>> {
    let query = request.query;
    let unsorted_unhinted = request.sort.is_empty() && request.hint.is_none();

    if unsorted_unhinted {
        if let Some(cursor) = shortcut_cursor(ctx, query) {
            return Ok(cursor);
        }

        if query.has_or() {
            let clauses = decompose(query);
            let indexable = !clauses.is_empty() && {
                let collection = read_collection(&ctx.handle);
                clauses_are_indexable(&collection, &ctx.ns, &clauses)
            };
            if indexable {
                Logger::trace(
                    Event::OrClausesPlanned.as_str(),
                    &[
                        ("ns", ctx.ns.as_str()),
                        ("clauses", clauses.len().to_string().as_str()),
                    ],
                );
                return Ok(Box::new(OrClauseSequencer::new(ctx.clone(), clauses)?));
            }
        }
    }

    let matcher: Arc<dyn Matcher> = Arc::new(PredicateMatcher::new(query));
    plan_cursor(
        ctx,
        query.predicates(),
        matcher,
        request.sort,
        request.hint,
        request.require_order,
    )
}

/// Cursor for one clause of a decomposed `$or`
pub fn clause_cursor(ctx: &CursorContext, clause: &ClauseSpec) -> ExecutorResult<Box<dyn QueryCursor>> {
    let matcher: Arc<dyn Matcher> = Arc::new(PredicateMatcher::for_predicates(clause.predicates()));
    plan_cursor(ctx, clause.predicates(), matcher, &KeyPattern::empty(), None, false)
}

fn shortcut_cursor(ctx: &CursorContext, query: &QueryExpr) -> Option<Box<dyn QueryCursor>> {
    let no_sort = KeyPattern::empty();
    let plan = if query.is_empty() {
        QueryPlan::table_scan(&ctx.ns, &FieldRangeSet::default(), &no_sort)
    } else if query.simple_id_equality().is_some() {
        let ranges = FieldRangeSet::from_predicates(query.predicates());
        QueryPlan::index(&ctx.ns, ID_INDEX_NAME, KeyPattern::id(), &ranges, &no_sort)
    } else {
        return None;
    };
    if !ctx.policy.permit_plan(&plan) {
        return None;
    }
    let matcher: Arc<dyn Matcher> = Arc::new(PredicateMatcher::new(query));
    Some(Box::new(ScanCursor::new(
        plan,
        Arc::clone(&ctx.handle),
        matcher,
        ctx.interrupt.clone(),
    )))
}

fn plan_cursor(
    ctx: &CursorContext,
    predicates: &[Predicate],
    matcher: Arc<dyn Matcher>,
    sort: &KeyPattern,
    hint: Option<&Hint>,
    require_order: bool,
) -> ExecutorResult<Box<dyn QueryCursor>> {
    let set = {
        let collection = read_collection(&ctx.handle);
        let request = PlanRequest {
            ns: &ctx.ns,
            predicates,
            sort,
            hint,
            policy: ctx.policy,
            require_order,
        };
        generate_plans(&collection, &request, ctx.cache.as_deref())?
    };

    if set.using_cached_plan() {
        if let Some(metrics) = &ctx.metrics {
            metrics.increment_plan_cache_hits();
        }
    }

    Logger::trace(
        Event::PlansGenerated.as_str(),
        &[
            ("ns", ctx.ns.as_str()),
            ("shape", set.shape().to_string().as_str()),
            ("candidates", set.len().to_string().as_str()),
        ],
    );

    if !set.is_single() {
        let scanner = MultiPlanScanner::new(
            set,
            &ctx.handle,
            matcher,
            &ctx.config,
            ctx.cache.clone(),
            ctx.policy,
            require_order,
        )?;
        let cursor = InterleavingCursor::new(
            scanner,
            ctx.config.dedup_upgrade_threshold,
            ctx.interrupt.clone(),
            ctx.metrics.clone(),
        )?;
        return Ok(Box::new(cursor));
    }

    let character = set.character();
    let plan = set
        .into_plans()
        .pop()
        .ok_or_else(|| ExecutorError::query_invalid("no candidate plan"))?;
    let cursor = ScanCursor::new(plan, Arc::clone(&ctx.handle), matcher, ctx.interrupt.clone())
        .with_character(character);
    Ok(Box::new(cursor))
}
