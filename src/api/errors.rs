//! API error types
//!
//! API errors are pass-through: they keep the `AERO_*` code of the
//! subsystem that failed. Only malformed envelopes and unknown operations
//! originate here.

use std::fmt;

use crate::ops::OpsError;

/// Result type for request handling
pub type ApiResult<T> = Result<T, ApiError>;

/// API-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorCode {
    /// Invalid request format
    AeroInvalidRequest,
    /// Unknown operation
    AeroUnknownOperation,
}

impl ApiErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            ApiErrorCode::AeroInvalidRequest => "AERO_INVALID_REQUEST",
            ApiErrorCode::AeroUnknownOperation => "AERO_UNKNOWN_OPERATION",
        }
    }
}

impl fmt::Display for ApiErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// API error with the originating subsystem's code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    code: String,
    message: String,
    /// Caused by the request rather than the server
    rejected: bool,
}

impl ApiError {
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self {
            code: ApiErrorCode::AeroInvalidRequest.code().to_string(),
            message: reason.into(),
            rejected: true,
        }
    }

    pub fn unknown_operation(op: impl Into<String>) -> Self {
        Self {
            code: ApiErrorCode::AeroUnknownOperation.code().to_string(),
            message: format!("Unknown operation: {}", op.into()),
            rejected: true,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_rejection(&self) -> bool {
        self.rejected
    }
}

impl From<OpsError> for ApiError {
    fn from(err: OpsError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
            rejected: err.is_rejection(),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::CursorError;

    #[test]
    fn test_codes() {
        assert_eq!(ApiError::invalid_request("x").code(), "AERO_INVALID_REQUEST");
        assert_eq!(
            ApiError::unknown_operation("update").code(),
            "AERO_UNKNOWN_OPERATION"
        );
    }

    #[test]
    fn test_pass_through_keeps_subsystem_code() {
        let err = ApiError::from(OpsError::from(CursorError::InUse(7)));
        assert_eq!(err.code(), "AERO_CURSOR_IN_USE");
        assert!(err.message().contains('7'));
        assert!(err.is_rejection());
    }
}
