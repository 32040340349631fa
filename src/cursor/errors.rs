//! # Client Cursor Errors
//!
//! Failures a client can provoke through `getMore` and `killCursors`.
//! Contract violations (erasing a pinned cursor, bare lookup of an
//! unpinned one) are panics and never appear here.

use thiserror::Error;

use super::id::CursorId;

/// Result type for client cursor operations
pub type CursorResult<T> = Result<T, CursorError>;

/// Client cursor errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CursorError {
    /// Id absent from the table (killed, timed out or exhausted)
    #[error("cursor {0} not found")]
    NotFound(CursorId),

    /// Another request holds the pin
    #[error("cursor {0} is already in use")]
    InUse(CursorId),

    /// getMore presented a namespace the cursor was not created on
    #[error("cursor {id} belongs to '{owner}', not '{presented}'")]
    NamespaceMismatch {
        id: CursorId,
        owner: String,
        presented: String,
    },

    /// Caller may not act on the cursor's namespace
    #[error("not authorized on '{0}'")]
    Unauthorized(String),
}

impl CursorError {
    pub fn code(&self) -> &'static str {
        match self {
            CursorError::NotFound(_) => "AERO_CURSOR_NOT_FOUND",
            CursorError::InUse(_) => "AERO_CURSOR_IN_USE",
            CursorError::NamespaceMismatch { .. } => "AERO_CURSOR_NAMESPACE_MISMATCH",
            CursorError::Unauthorized(_) => "AERO_UNAUTHORIZED",
        }
    }

    /// Namespace spoofing is reported like an authorization failure
    pub fn is_authorization(&self) -> bool {
        matches!(
            self,
            CursorError::NamespaceMismatch { .. } | CursorError::Unauthorized(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(CursorError::NotFound(7).code(), "AERO_CURSOR_NOT_FOUND");
        assert_eq!(CursorError::InUse(7).code(), "AERO_CURSOR_IN_USE");
        assert_eq!(
            CursorError::Unauthorized("db.c".into()).code(),
            "AERO_UNAUTHORIZED"
        );
    }

    #[test]
    fn test_namespace_mismatch_message_names_both() {
        let err = CursorError::NamespaceMismatch {
            id: 42,
            owner: "db.a".into(),
            presented: "db.b".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("db.a"));
        assert!(msg.contains("db.b"));
        assert!(err.is_authorization());
        assert!(!CursorError::NotFound(1).is_authorization());
    }
}
