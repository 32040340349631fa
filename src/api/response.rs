//! API response types
//!
//! `{"status": "ok", "data": ...}` or
//! `{"status": "error", "code": ..., "message": ...}`, one line each.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::ApiError;

/// Success response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub status: String,
    pub data: Value,
}

impl SuccessResponse {
    pub fn new(data: Value) -> Self {
        Self {
            status: "ok".to_string(),
            data,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn from_error(err: &ApiError) -> Self {
        Self {
            status: "error".to_string(),
            code: err.code().to_string(),
            message: err.message().to_string(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Unified response type
#[derive(Debug, Clone)]
pub enum Response {
    Success(SuccessResponse),
    Error(ErrorResponse),
}

impl Response {
    pub fn success(data: Value) -> Self {
        Response::Success(SuccessResponse::new(data))
    }

    pub fn error(err: &ApiError) -> Self {
        Response::Error(ErrorResponse::from_error(err))
    }

    pub fn to_json(&self) -> String {
        match self {
            Response::Success(r) => r.to_json(),
            Response::Error(r) => r.to_json(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Response::Success(_))
    }

    /// `data` of a success, `None` for an error
    pub fn data(&self) -> Option<&Value> {
        match self {
            Response::Success(r) => Some(&r.data),
            Response::Error(_) => None,
        }
    }

    /// Error code, `None` for a success
    pub fn code(&self) -> Option<&str> {
        match self {
            Response::Success(_) => None,
            Response::Error(r) => Some(&r.code),
        }
    }
}
