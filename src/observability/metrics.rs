//! Metrics registry
//!
//! - Counters only, monotonic
//! - Reset only on process start
//! - Lock-free: relaxed atomics, values are exact once quiescent

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct MetricsRegistry {
    queries_executed: AtomicU64,
    queries_rejected: AtomicU64,
    get_mores: AtomicU64,
    cursors_opened: AtomicU64,
    cursors_exhausted: AtomicU64,
    cursors_killed: AtomicU64,
    cursors_timed_out: AtomicU64,
    cursors_invalidated: AtomicU64,
    plan_takeovers: AtomicU64,
    plan_cache_hits: AtomicU64,
    plan_cache_records: AtomicU64,
    query_retries: AtomicU64,
    interrupts: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // Queries

    pub fn increment_queries_executed(&self) {
        self.queries_executed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_queries_rejected(&self) {
        self.queries_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_get_mores(&self) {
        self.get_mores.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_query_retries(&self) {
        self.query_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_interrupts(&self) {
        self.interrupts.fetch_add(1, Ordering::Relaxed);
    }

    // Client cursors

    pub fn increment_cursors_opened(&self) {
        self.cursors_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_cursors_exhausted(&self) {
        self.cursors_exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_cursors_killed(&self, count: u64) {
        self.cursors_killed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_cursors_timed_out(&self, count: u64) {
        self.cursors_timed_out.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_cursors_invalidated(&self, count: u64) {
        self.cursors_invalidated.fetch_add(count, Ordering::Relaxed);
    }

    // Planning

    pub fn increment_plan_takeovers(&self) {
        self.plan_takeovers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_plan_cache_hits(&self) {
        self.plan_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_plan_cache_records(&self) {
        self.plan_cache_records.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queries_executed: self.queries_executed.load(Ordering::Relaxed),
            queries_rejected: self.queries_rejected.load(Ordering::Relaxed),
            get_mores: self.get_mores.load(Ordering::Relaxed),
            cursors_opened: self.cursors_opened.load(Ordering::Relaxed),
            cursors_exhausted: self.cursors_exhausted.load(Ordering::Relaxed),
            cursors_killed: self.cursors_killed.load(Ordering::Relaxed),
            cursors_timed_out: self.cursors_timed_out.load(Ordering::Relaxed),
            cursors_invalidated: self.cursors_invalidated.load(Ordering::Relaxed),
            plan_takeovers: self.plan_takeovers.load(Ordering::Relaxed),
            plan_cache_hits: self.plan_cache_hits.load(Ordering::Relaxed),
            plan_cache_records: self.plan_cache_records.load(Ordering::Relaxed),
            query_retries: self.query_retries.load(Ordering::Relaxed),
            interrupts: self.interrupts.load(Ordering::Relaxed),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self.snapshot()).unwrap_or(serde_json::Value::Null)
    }
}

/// Point-in-time copy of every counter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub queries_executed: u64,
    pub queries_rejected: u64,
    pub get_mores: u64,
    pub cursors_opened: u64,
    pub cursors_exhausted: u64,
    pub cursors_killed: u64,
    pub cursors_timed_out: u64,
    pub cursors_invalidated: u64,
    pub plan_takeovers: u64,
    pub plan_cache_hits: u64,
    pub plan_cache_records: u64,
    pub query_retries: u64,
    pub interrupts: u64,
}
