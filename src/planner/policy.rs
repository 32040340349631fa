//! Plan selection policies
//!
//! A policy restricts which candidate plans a caller is willing to run.
//! Violations fail the whole query; they never degrade to a table scan.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::storage::ID_INDEX_NAME;

use super::errors::PlannerError;
use super::plan::QueryPlan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlanSelectionPolicy {
    /// Any plan, including the table scan
    #[default]
    Any,
    /// Index plans only
    IndexOnly,
    /// The `_id` index, else a table scan
    IdElseNatural,
}

impl PlanSelectionPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            PlanSelectionPolicy::Any => "any",
            PlanSelectionPolicy::IndexOnly => "indexOnly",
            PlanSelectionPolicy::IdElseNatural => "idElseNatural",
        }
    }

    pub fn permit_plan(&self, plan: &QueryPlan) -> bool {
        match self {
            PlanSelectionPolicy::Any => true,
            PlanSelectionPolicy::IndexOnly => !plan.is_table_scan(),
            PlanSelectionPolicy::IdElseNatural => {
                plan.is_table_scan() || plan.index_name() == Some(ID_INDEX_NAME)
            }
        }
    }
}

impl fmt::Display for PlanSelectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for PlanSelectionPolicy {
    type Err = PlannerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "any" => Ok(PlanSelectionPolicy::Any),
            "indexOnly" => Ok(PlanSelectionPolicy::IndexOnly),
            "idElseNatural" => Ok(PlanSelectionPolicy::IdElseNatural),
            other => Err(PlannerError::query_invalid(format!(
                "unknown plan selection policy '{}'",
                other
            ))),
        }
    }
}
