//! # Query Path Errors
//!
//! Everything `find`, `getMore`, `killCursors` and the write operations
//! can report to a client.

use thiserror::Error;

use crate::cursor::CursorError;
use crate::executor::ExecutorError;
use crate::planner::PlannerError;
use crate::storage::StorageError;

/// Result type for query path operations
pub type OpsResult<T> = Result<T, OpsError>;

#[derive(Debug, Clone, Error)]
pub enum OpsError {
    /// Planning or execution failed
    #[error(transparent)]
    Executor(#[from] ExecutorError),

    /// Cursor missing, busy, or on another namespace
    #[error(transparent)]
    Cursor(#[from] CursorError),

    /// Collection or index maintenance failed
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Malformed request document
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl From<PlannerError> for OpsError {
    fn from(err: PlannerError) -> Self {
        OpsError::Executor(err.into())
    }
}

impl OpsError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        OpsError::InvalidRequest(reason.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            OpsError::Executor(err) => err.code().code(),
            OpsError::Cursor(err) => err.code(),
            OpsError::Storage(err) => err.code().code(),
            OpsError::InvalidRequest(_) => "AERO_QUERY_INVALID",
        }
    }

    /// Caused by the request rather than the server
    pub fn is_rejection(&self) -> bool {
        match self {
            OpsError::Executor(err) => !err.is_memory_limit() && !err.is_interrupted(),
            OpsError::Cursor(_) | OpsError::InvalidRequest(_) => true,
            OpsError::Storage(_) => true,
        }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, OpsError::Executor(err) if err.is_interrupted())
    }
}
