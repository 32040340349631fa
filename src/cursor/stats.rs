//! `cursorInfo` counters

use serde::{Deserialize, Serialize};

/// Point-in-time view of the client cursor table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorStats {
    pub total_open: usize,
    /// Currently held by a request
    pub pinned: usize,
    pub total_no_timeout: usize,
    /// Erased by the idle sweep since startup
    pub timed_out: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_with_wire_names() {
        let stats = CursorStats {
            total_open: 3,
            pinned: 1,
            total_no_timeout: 1,
            timed_out: 9,
        };
        let json = serde_json::to_value(stats).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"totalOpen": 3, "pinned": 1, "totalNoTimeout": 1, "timedOut": 9})
        );
    }
}
