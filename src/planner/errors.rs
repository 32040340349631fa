//! Planner error types
//!
//! Error codes:
//! - AERO_QUERY_INVALID (REJECT)
//! - AERO_QUERY_BAD_HINT (REJECT)
//! - AERO_QUERY_PLAN_NOT_PERMITTED (REJECT)
//! - AERO_QUERY_SORT_NOT_SATISFIABLE (REJECT)

use std::fmt;

/// Severity levels for planner errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Client request rejected
    Reject,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Reject => write!(f, "REJECT"),
        }
    }
}

/// Planner-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannerErrorCode {
    /// Malformed query, sort, hint or projection
    AeroQueryInvalid,
    /// Hinted index does not exist
    AeroQueryBadHint,
    /// Plan disallowed by the selection policy
    AeroQueryPlanNotPermitted,
    /// No candidate can produce the required order
    AeroQuerySortNotSatisfiable,
}

impl PlannerErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            PlannerErrorCode::AeroQueryInvalid => "AERO_QUERY_INVALID",
            PlannerErrorCode::AeroQueryBadHint => "AERO_QUERY_BAD_HINT",
            PlannerErrorCode::AeroQueryPlanNotPermitted => "AERO_QUERY_PLAN_NOT_PERMITTED",
            PlannerErrorCode::AeroQuerySortNotSatisfiable => "AERO_QUERY_SORT_NOT_SATISFIABLE",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        Severity::Reject
    }

    /// Whether the caller may succeed by retrying with different options
    pub fn is_retriable_with_options(&self) -> bool {
        matches!(self, PlannerErrorCode::AeroQuerySortNotSatisfiable)
    }
}

impl fmt::Display for PlannerErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Planner error type with full context
#[derive(Debug, Clone)]
pub struct PlannerError {
    /// Error code
    code: PlannerErrorCode,
    /// Human-readable message
    message: String,
    /// Field name if applicable
    field: Option<String>,
}

impl PlannerError {
    /// Create a query invalid error
    pub fn query_invalid(reason: impl Into<String>) -> Self {
        Self {
            code: PlannerErrorCode::AeroQueryInvalid,
            message: reason.into(),
            field: None,
        }
    }

    /// Create an invalid operator error for a field
    pub fn invalid_operator(field: impl Into<String>, op: &str) -> Self {
        let f = field.into();
        Self {
            code: PlannerErrorCode::AeroQueryInvalid,
            message: format!("unsupported operator '{}' on field '{}'", op, f),
            field: Some(f),
        }
    }

    /// Create a bad hint error
    pub fn bad_hint(hint: impl fmt::Display) -> Self {
        Self {
            code: PlannerErrorCode::AeroQueryBadHint,
            message: format!("hint {} does not name an existing index", hint),
            field: None,
        }
    }

    /// Create a plan-not-permitted error
    pub fn plan_not_permitted(ns: &str, shape: impl fmt::Display, policy: &str) -> Self {
        Self {
            code: PlannerErrorCode::AeroQueryPlanNotPermitted,
            message: format!(
                "no plan for {} query {} is permitted by the '{}' selection policy",
                ns, shape, policy
            ),
            field: None,
        }
    }

    /// Create a sort-not-satisfiable error
    pub fn sort_not_satisfiable(ns: &str, shape: impl fmt::Display) -> Self {
        Self {
            code: PlannerErrorCode::AeroQuerySortNotSatisfiable,
            message: format!(
                "order spec cannot be satisfied by any index for {} query {}",
                ns, shape
            ),
            field: None,
        }
    }

    /// Returns the error code
    pub fn code(&self) -> PlannerErrorCode {
        self.code
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the field if applicable
    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }
}

impl fmt::Display for PlannerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.code.severity(), self.code.code(), self.message)
    }
}

impl std::error::Error for PlannerError {}

/// Result type for planner operations
pub type PlannerResult<T> = Result<T, PlannerError>;
