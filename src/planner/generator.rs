//! Candidate plan generation
//!
//! Turns one query clause into the set of plans worth racing:
//!
//! 1. A hint yields exactly the hinted plan
//! 2. Contradictory ranges yield a single impossible plan
//! 3. An optimal index yields that plan alone
//! 4. Otherwise every helpful index plus the table scan, with a cached
//!    winner moved to the front
//!
//! A sorted query keeps at most one plan that produces the order directly,
//! so interleaved in-order output stays sorted.

use crate::index::KeyPattern;
use crate::storage::Collection;

use super::ast::{Hint, Predicate};
use super::cache::{CachedPlan, PlanCache, QueryShape};
use super::errors::{PlannerError, PlannerResult};
use super::plan::{QueryPlan, Utility};
use super::policy::PlanSelectionPolicy;
use super::ranges::FieldRangeSet;

/// Which kinds of candidates exist for a query and sort
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CandidatePlanCharacter {
    may_run_in_order: bool,
    may_run_out_of_order: bool,
}

impl CandidatePlanCharacter {
    pub fn new(may_run_in_order: bool, may_run_out_of_order: bool) -> Self {
        Self {
            may_run_in_order,
            may_run_out_of_order,
        }
    }

    fn of(plans: &[QueryPlan]) -> Self {
        Self::new(
            plans.iter().any(|p| !p.scan_and_order_required()),
            plans.iter().any(QueryPlan::scan_and_order_required),
        )
    }

    pub fn may_run_in_order_plan(&self) -> bool {
        self.may_run_in_order
    }

    pub fn may_run_out_of_order_plan(&self) -> bool {
        self.may_run_out_of_order
    }

    /// Both kinds are present; results need the hybrid build strategy
    pub fn hybrid(&self) -> bool {
        self.may_run_in_order && self.may_run_out_of_order
    }

    pub fn is_valid(&self) -> bool {
        self.may_run_in_order || self.may_run_out_of_order
    }
}

/// Inputs for planning one clause
#[derive(Debug, Clone, Copy)]
pub struct PlanRequest<'a> {
    pub ns: &'a str,
    pub predicates: &'a [Predicate],
    pub sort: &'a KeyPattern,
    pub hint: Option<&'a Hint>,
    pub policy: PlanSelectionPolicy,
    pub require_order: bool,
}

/// The plans chosen for one clause
#[derive(Debug, Clone)]
pub struct CandidatePlanSet {
    plans: Vec<QueryPlan>,
    ranges: FieldRangeSet,
    shape: QueryShape,
    cached_plan: Option<CachedPlan>,
    possibly_excluded_plans: bool,
    hinted: bool,
    character: CandidatePlanCharacter,
}

impl CandidatePlanSet {
    fn new(plans: Vec<QueryPlan>, ranges: FieldRangeSet, shape: QueryShape) -> Self {
        let character = CandidatePlanCharacter::of(&plans);
        Self {
            plans,
            ranges,
            shape,
            cached_plan: None,
            possibly_excluded_plans: false,
            hinted: false,
            character,
        }
    }

    pub fn plans(&self) -> &[QueryPlan] {
        &self.plans
    }

    pub fn into_plans(self) -> Vec<QueryPlan> {
        self.plans
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    pub fn is_single(&self) -> bool {
        self.plans.len() == 1
    }

    pub fn first_plan(&self) -> Option<&QueryPlan> {
        self.plans.first()
    }

    pub fn ranges(&self) -> &FieldRangeSet {
        &self.ranges
    }

    pub fn shape(&self) -> &QueryShape {
        &self.shape
    }

    /// Cache entry that influenced this set, if any
    pub fn cached_plan(&self) -> Option<&CachedPlan> {
        self.cached_plan.as_ref()
    }

    pub fn using_cached_plan(&self) -> bool {
        self.cached_plan.is_some()
    }

    /// The cache caused some candidate to be left out
    pub fn possibly_excluded_plans(&self) -> bool {
        self.possibly_excluded_plans
    }

    pub fn hinted(&self) -> bool {
        self.hinted
    }

    pub fn character(&self) -> CandidatePlanCharacter {
        self.character
    }
}

/// Builds the candidate plans for one clause over a collection
pub fn generate_plans(
    collection: &Collection,
    request: &PlanRequest<'_>,
    cache: Option<&PlanCache>,
) -> PlannerResult<CandidatePlanSet> {
    let ranges = FieldRangeSet::from_predicates(request.predicates);
    let shape = QueryShape::new(&ranges, request.sort);

    if let Some(hint) = request.hint {
        let plan = hinted_plan(collection, request, &ranges, hint)?;
        check_plan(&plan, request, &shape)?;
        let mut set = CandidatePlanSet::new(vec![plan], ranges, shape);
        set.hinted = true;
        return Ok(set);
    }

    let mut all: Vec<QueryPlan> = collection
        .indexes()
        .iter()
        .map(|index| {
            QueryPlan::index(
                request.ns,
                index.name(),
                index.pattern().clone(),
                &ranges,
                request.sort,
            )
        })
        .collect();
    all.push(QueryPlan::table_scan(request.ns, &ranges, request.sort));
    all.retain(|p| request.policy.permit_plan(p));

    let shortcut = all
        .iter()
        .position(QueryPlan::is_impossible)
        .or_else(|| all.iter().position(QueryPlan::is_optimal));
    if let Some(position) = shortcut {
        let plan = all.swap_remove(position);
        check_plan(&plan, request, &shape)?;
        return Ok(CandidatePlanSet::new(vec![plan], ranges, shape));
    }

    let mut candidates: Vec<QueryPlan> = all
        .into_iter()
        .filter(|p| p.is_table_scan() || p.utility() != Utility::Unhelpful)
        .collect();
    if candidates.is_empty() {
        return Err(PlannerError::plan_not_permitted(
            request.ns,
            &shape,
            request.policy.name(),
        ));
    }

    let cached_plan = cache.and_then(|c| c.get(request.ns, &shape));
    let cached_position = cached_plan.as_ref().and_then(|cached| {
        candidates
            .iter()
            .position(|p| p.index_name() == cached.index_name.as_deref())
    });
    if let Some(position) = cached_position {
        let plan = candidates.remove(position);
        candidates.insert(0, plan);
    }

    let before = candidates.len();
    if !request.sort.is_empty() {
        let mut seen_in_order = false;
        candidates.retain(|p| {
            if p.scan_and_order_required() {
                return true;
            }
            let keep = !seen_in_order;
            seen_in_order = true;
            keep
        });
    }
    let excluded = candidates.len() < before;
    if request.require_order {
        candidates.retain(|p| !p.scan_and_order_required());
        if candidates.is_empty() {
            return Err(PlannerError::sort_not_satisfiable(request.ns, &shape));
        }
    }

    let mut set = CandidatePlanSet::new(candidates, ranges, shape);
    if cached_position.is_some() {
        set.possibly_excluded_plans = excluded;
        set.cached_plan = cached_plan;
    }
    Ok(set)
}

fn hinted_plan(
    collection: &Collection,
    request: &PlanRequest<'_>,
    ranges: &FieldRangeSet,
    hint: &Hint,
) -> PlannerResult<QueryPlan> {
    let index = match hint {
        Hint::Natural => {
            return Ok(QueryPlan::table_scan(request.ns, ranges, request.sort));
        }
        Hint::Name(name) => collection.index(name),
        Hint::Pattern(pattern) => collection.index_by_pattern(pattern),
    };
    let index = index.ok_or_else(|| PlannerError::bad_hint(hint))?;
    Ok(QueryPlan::index(
        request.ns,
        index.name(),
        index.pattern().clone(),
        ranges,
        request.sort,
    ))
}

fn check_plan(plan: &QueryPlan, request: &PlanRequest<'_>, shape: &QueryShape) -> PlannerResult<()> {
    if !request.policy.permit_plan(plan) {
        return Err(PlannerError::plan_not_permitted(
            request.ns,
            shape,
            request.policy.name(),
        ));
    }
    if request.require_order && plan.scan_and_order_required() && !plan.is_impossible() {
        return Err(PlannerError::sort_not_satisfiable(request.ns, shape));
    }
    Ok(())
}
