//! Query planner subsystem for aerocursor
//!
//! Plans are chosen empirically: the planner proposes candidates, the
//! executor races them and the plan cache remembers the winner.
//!
//! # Design Principles
//!
//! - Candidates are generated per clause; a top-level `$or` is planned
//!   branch by branch
//! - An optimal, hinted or impossible plan runs alone
//! - Selection policies fail the query instead of degrading to a table scan
//! - A sorted query races at most one plan that yields the order directly
//!
//! # Plan Utility
//!
//! 1. Impossible: contradictory ranges, nothing is scanned
//! 2. Optimal: the index answers the query and the order exactly
//! 3. Helpful: raced against the other candidates
//! 4. Unhelpful: dropped

mod ast;
mod cache;
mod errors;
mod explain;
mod generator;
mod or_clause;
mod plan;
mod policy;
mod ranges;

pub use ast::{parse_sort, FilterOp, Hint, Predicate, QueryExpr, RegexPattern};
pub use cache::{CachedPlan, PlanCache, QueryShape, ShapeKind};
pub use errors::{PlannerError, PlannerErrorCode, PlannerResult, Severity};
pub use explain::{ClauseExplain, OldPlanExplain, PlanExplain, QueryExplain};
pub use generator::{generate_plans, CandidatePlanCharacter, CandidatePlanSet, PlanRequest};
pub use or_clause::{clauses_are_indexable, decompose, ClauseSpec};
pub use plan::{sort_direction, QueryPlan, Utility};
pub use policy::PlanSelectionPolicy;
pub use ranges::FieldRangeSet;
