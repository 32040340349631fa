//! Storage error types
//!
//! Error codes:
//! - AERO_DOCUMENT_INVALID (REJECT)
//! - AERO_DOCUMENT_MISSING_ID (REJECT)
//! - AERO_DUPLICATE_KEY (REJECT)
//! - AERO_NAMESPACE_INVALID (REJECT)
//! - AERO_INDEX_EXISTS (REJECT)
//! - AERO_INDEX_NOT_FOUND (REJECT)
//! - AERO_INDEX_ID_REQUIRED (REJECT)

use std::fmt;

use crate::index::IndexError;

/// Severity levels for storage errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Client request rejected, no state changed
    Reject,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Reject => write!(f, "REJECT"),
        }
    }
}

/// Storage-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorCode {
    /// Document is not a JSON object
    AeroDocumentInvalid,
    /// Document has no `_id`
    AeroDocumentMissingId,
    /// `_id` already present
    AeroDuplicateKey,
    /// Namespace is not `db.collection`
    AeroNamespaceInvalid,
    /// Index with the same name already exists
    AeroIndexExists,
    /// Index name unknown
    AeroIndexNotFound,
    /// The `_id` index cannot be dropped
    AeroIndexIdRequired,
    /// Key pattern rejected by the index layer
    AeroIndexInvalidKeyPattern,
}

impl StorageErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            StorageErrorCode::AeroDocumentInvalid => "AERO_DOCUMENT_INVALID",
            StorageErrorCode::AeroDocumentMissingId => "AERO_DOCUMENT_MISSING_ID",
            StorageErrorCode::AeroDuplicateKey => "AERO_DUPLICATE_KEY",
            StorageErrorCode::AeroNamespaceInvalid => "AERO_NAMESPACE_INVALID",
            StorageErrorCode::AeroIndexExists => "AERO_INDEX_EXISTS",
            StorageErrorCode::AeroIndexNotFound => "AERO_INDEX_NOT_FOUND",
            StorageErrorCode::AeroIndexIdRequired => "AERO_INDEX_ID_REQUIRED",
            StorageErrorCode::AeroIndexInvalidKeyPattern => "AERO_INDEX_INVALID_KEY_PATTERN",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        Severity::Reject
    }
}

impl fmt::Display for StorageErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Storage error with full context
#[derive(Debug, Clone)]
pub struct StorageError {
    code: StorageErrorCode,
    message: String,
}

impl StorageError {
    fn new(code: StorageErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_document(reason: impl Into<String>) -> Self {
        Self::new(StorageErrorCode::AeroDocumentInvalid, reason)
    }

    pub fn missing_id(ns: &str) -> Self {
        Self::new(
            StorageErrorCode::AeroDocumentMissingId,
            format!("document for '{}' has no _id", ns),
        )
    }

    pub fn duplicate_key(ns: &str, id: &serde_json::Value) -> Self {
        Self::new(
            StorageErrorCode::AeroDuplicateKey,
            format!("duplicate _id {} in '{}'", id, ns),
        )
    }

    pub fn invalid_namespace(ns: &str) -> Self {
        Self::new(
            StorageErrorCode::AeroNamespaceInvalid,
            format!("invalid namespace '{}', expected <db>.<collection>", ns),
        )
    }

    pub fn index_exists(name: &str) -> Self {
        Self::new(
            StorageErrorCode::AeroIndexExists,
            format!("index '{}' already exists", name),
        )
    }

    pub fn index_not_found(name: &str) -> Self {
        Self::new(
            StorageErrorCode::AeroIndexNotFound,
            format!("index '{}' not found", name),
        )
    }

    pub fn id_index_required() -> Self {
        Self::new(
            StorageErrorCode::AeroIndexIdRequired,
            "the _id index cannot be dropped",
        )
    }

    /// Returns the error code
    pub fn code(&self) -> StorageErrorCode {
        self.code
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<IndexError> for StorageError {
    fn from(err: IndexError) -> Self {
        Self::new(
            StorageErrorCode::AeroIndexInvalidKeyPattern,
            err.message().to_string(),
        )
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.code.severity(), self.code.code(), self.message)
    }
}

impl std::error::Error for StorageError {}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
