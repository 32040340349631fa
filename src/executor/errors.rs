//! Executor error types
//!
//! Error codes:
//! - AERO_QUERY_INVALID (REJECT)
//! - AERO_QUERY_BAD_HINT (REJECT)
//! - AERO_QUERY_PLAN_NOT_PERMITTED (REJECT)
//! - AERO_QUERY_SORT_NOT_SATISFIABLE (REJECT)
//! - AERO_SCAN_AND_ORDER_MEMORY_LIMIT (ERROR)
//! - AERO_OPERATION_INTERRUPTED (ERROR)
//! - AERO_CURSOR_INVALID_ACCESS (ERROR)

use std::fmt;

use crate::planner::{PlannerError, PlannerErrorCode};

/// Severity levels for executor errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Request rejected before any scanning
    Reject,
    /// Operation failed but system is healthy
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Reject => write!(f, "REJECT"),
            Severity::Error => write!(f, "ERROR"),
        }
    }
}

/// Executor-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorErrorCode {
    AeroQueryInvalid,
    AeroQueryBadHint,
    /// Selection policy forbids every candidate
    AeroQueryPlanNotPermitted,
    /// Required order cannot be produced
    AeroQuerySortNotSatisfiable,
    /// Scan-and-order buffer exceeded its byte cap
    AeroScanAndOrderMemoryLimit,
    /// Kill signal observed
    AeroOperationInterrupted,
    /// Cursor read while not positioned
    AeroCursorInvalidAccess,
}

impl ExecutorErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            ExecutorErrorCode::AeroQueryInvalid => "AERO_QUERY_INVALID",
            ExecutorErrorCode::AeroQueryBadHint => "AERO_QUERY_BAD_HINT",
            ExecutorErrorCode::AeroQueryPlanNotPermitted => "AERO_QUERY_PLAN_NOT_PERMITTED",
            ExecutorErrorCode::AeroQuerySortNotSatisfiable => "AERO_QUERY_SORT_NOT_SATISFIABLE",
            ExecutorErrorCode::AeroScanAndOrderMemoryLimit => "AERO_SCAN_AND_ORDER_MEMORY_LIMIT",
            ExecutorErrorCode::AeroOperationInterrupted => "AERO_OPERATION_INTERRUPTED",
            ExecutorErrorCode::AeroCursorInvalidAccess => "AERO_CURSOR_INVALID_ACCESS",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            ExecutorErrorCode::AeroQueryInvalid
            | ExecutorErrorCode::AeroQueryBadHint
            | ExecutorErrorCode::AeroQueryPlanNotPermitted
            | ExecutorErrorCode::AeroQuerySortNotSatisfiable => Severity::Reject,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for ExecutorErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl From<PlannerErrorCode> for ExecutorErrorCode {
    fn from(code: PlannerErrorCode) -> Self {
        match code {
            PlannerErrorCode::AeroQueryInvalid => ExecutorErrorCode::AeroQueryInvalid,
            PlannerErrorCode::AeroQueryBadHint => ExecutorErrorCode::AeroQueryBadHint,
            PlannerErrorCode::AeroQueryPlanNotPermitted => ExecutorErrorCode::AeroQueryPlanNotPermitted,
            PlannerErrorCode::AeroQuerySortNotSatisfiable => {
                ExecutorErrorCode::AeroQuerySortNotSatisfiable
            }
        }
    }
}

/// Executor error type with full context
#[derive(Debug, Clone)]
pub struct ExecutorError {
    code: ExecutorErrorCode,
    message: String,
}

impl ExecutorError {
    /// Create a scan-and-order memory limit error
    pub fn memory_limit(ns: &str, limit_bytes: usize) -> Self {
        Self {
            code: ExecutorErrorCode::AeroScanAndOrderMemoryLimit,
            message: format!(
                "too much data for sort() with no index on {}; add an index or specify a smaller limit ({} bytes)",
                ns, limit_bytes
            ),
        }
    }

    /// Create an interrupted error
    pub fn interrupted() -> Self {
        Self {
            code: ExecutorErrorCode::AeroOperationInterrupted,
            message: "operation was interrupted".to_string(),
        }
    }

    /// Create an invalid access error for a cursor that is not positioned
    pub fn invalid_access(what: &str) -> Self {
        Self {
            code: ExecutorErrorCode::AeroCursorInvalidAccess,
            message: format!("{} called on a cursor that is not ok()", what),
        }
    }

    /// Create a query invalid error
    pub fn query_invalid(reason: impl Into<String>) -> Self {
        Self {
            code: ExecutorErrorCode::AeroQueryInvalid,
            message: reason.into(),
        }
    }

    /// Returns the error code
    pub fn code(&self) -> ExecutorErrorCode {
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

    pub fn is_memory_limit(&self) -> bool {
        self.code == ExecutorErrorCode::AeroScanAndOrderMemoryLimit
    }

    pub fn is_interrupted(&self) -> bool {
        self.code == ExecutorErrorCode::AeroOperationInterrupted
    }
}

impl From<PlannerError> for ExecutorError {
    fn from(err: PlannerError) -> Self {
        Self {
            code: err.code().into(),
            message: err.message().to_string(),
        }
    }
}

impl fmt::Display for ExecutorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.code.severity(), self.code.code(), self.message)
    }
}

impl std::error::Error for ExecutorError {}

/// Result type for executor operations
pub type ExecutorResult<T> = Result<T, ExecutorError>;
