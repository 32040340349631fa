//! Observability for aerocursor
//!
//! - Structured logging (one JSON object per line)
//! - Counters for queries, cursors and plan selection
//! - Scoped begin/complete tracing of queries
//!
//! # Principles
//!
//! 1. Observability is read-only: it never changes what a query returns
//! 2. Logging failures are swallowed
//! 3. Deterministic field order
//!
//! # Usage
//!
//! ```ignore
//! use aerocursor::observability::{Event, Logger, MetricsRegistry, ObservationScope};
//!
//! Logger::info(Event::PlanTakeover.as_str(), &[("ns", "db.c")]);
//!
//! let metrics = MetricsRegistry::new();
//! metrics.increment_queries_executed();
//!
//! let scope = ObservationScope::new("QUERY");
//! scope.complete();
//! ```

mod events;
mod logger;
mod metrics;
mod scope;

pub use events::Event;
pub use logger::{LogSink, Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
pub use scope::{ObservationScope, Timer};

/// Logs an event at INFO
pub fn log_event(event: Event) {
    Logger::info(event.as_str(), &[]);
}

/// Logs an event at INFO with fields
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::info(event.as_str(), fields);
}
