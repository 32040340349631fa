//! Observable events
//!
//! Every log line names one of these. Events are explicit and typed.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Client cursors
    CursorRegistered,
    CursorErased,
    CursorTimedOut,
    CursorsInvalidated,
    CursorKilled,
    /// Open cursor count crossed the warning threshold
    CursorTableLarge,

    // Planning
    PlansGenerated,
    PlanTakeover,
    PlanRecorded,
    PlanCacheCleared,
    PlanOutOfOrderAborted,
    OrClausesPlanned,
    OrClauseAdvanced,

    // Execution
    ScanAndOrderLimit,
    QueryRetry,
    OperationInterrupted,
    GetMoreCursorNotFound,

    // Process
    MonitorStart,
    MonitorStop,
    ConfigLoaded,
    DatasetLoaded,
    ServeStart,
    ServeStop,
    RequestFailed,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::CursorRegistered => "CURSOR_REGISTERED",
            Event::CursorErased => "CURSOR_ERASED",
            Event::CursorTimedOut => "CURSOR_TIMED_OUT",
            Event::CursorsInvalidated => "CURSORS_INVALIDATED",
            Event::CursorKilled => "CURSOR_KILLED",
            Event::CursorTableLarge => "CURSOR_TABLE_LARGE",

            Event::PlansGenerated => "PLANS_GENERATED",
            Event::PlanTakeover => "PLAN_TAKEOVER",
            Event::PlanRecorded => "PLAN_RECORDED",
            Event::PlanCacheCleared => "PLAN_CACHE_CLEARED",
            Event::PlanOutOfOrderAborted => "PLAN_ABORTED_OUT_OF_ORDER",
            Event::OrClausesPlanned => "OR_CLAUSES_PLANNED",
            Event::OrClauseAdvanced => "OR_CLAUSE_ADVANCED",

            Event::ScanAndOrderLimit => "SCAN_AND_ORDER_LIMIT",
            Event::QueryRetry => "QUERY_RETRY",
            Event::OperationInterrupted => "OPERATION_INTERRUPTED",
            Event::GetMoreCursorNotFound => "GETMORE_CURSOR_NOT_FOUND",

            Event::MonitorStart => "MONITOR_START",
            Event::MonitorStop => "MONITOR_STOP",
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::DatasetLoaded => "DATASET_LOADED",
            Event::ServeStart => "SERVE_START",
            Event::ServeStop => "SERVE_STOP",
            Event::RequestFailed => "REQUEST_FAILED",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_are_upper_snake_case() {
        let events = [
            Event::CursorRegistered,
            Event::CursorErased,
            Event::CursorTimedOut,
            Event::CursorsInvalidated,
            Event::CursorKilled,
            Event::CursorTableLarge,
            Event::PlansGenerated,
            Event::PlanTakeover,
            Event::PlanRecorded,
            Event::PlanCacheCleared,
            Event::PlanOutOfOrderAborted,
            Event::OrClausesPlanned,
            Event::OrClauseAdvanced,
            Event::ScanAndOrderLimit,
            Event::QueryRetry,
            Event::OperationInterrupted,
            Event::GetMoreCursorNotFound,
            Event::MonitorStart,
            Event::MonitorStop,
            Event::ConfigLoaded,
            Event::DatasetLoaded,
            Event::ServeStart,
            Event::ServeStop,
            Event::RequestFailed,
        ];
        for event in events {
            let s = event.as_str();
            assert!(!s.is_empty());
            assert!(s.chars().all(|c| c.is_ascii_uppercase() || c == '_'));
        }
    }

    #[test]
    fn test_display_matches_as_str() {
        assert_eq!(Event::PlanTakeover.to_string(), "PLAN_TAKEOVER");
    }
}
