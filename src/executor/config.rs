//! Executor tuning knobs
//!
//! Defaults reproduce the classic query engine constants.

use serde::{Deserialize, Serialize};

/// Thresholds used while planning and batching
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Distinct matches a candidate needs before it takes over
    #[serde(default = "default_takeover_match_threshold")]
    pub takeover_match_threshold: u64,

    /// Accesses after which a dedup vector becomes an ordered set
    #[serde(default = "default_dedup_upgrade_threshold")]
    pub dedup_upgrade_threshold: usize,

    /// Byte cap of one scan-and-order buffer
    #[serde(default = "default_scan_and_order_max_bytes")]
    pub scan_and_order_max_bytes: usize,

    /// Advisory byte cap of any result batch
    #[serde(default = "default_batch_max_bytes")]
    pub batch_max_bytes: usize,

    /// First batch size when the client gave none
    #[serde(default = "default_first_batch_docs")]
    pub first_batch_default_docs: usize,

    /// First batch byte cap when the client gave no batch size
    #[serde(default = "default_first_batch_bytes")]
    pub first_batch_default_bytes: usize,

    /// Writes to a namespace before its cached plans are forgotten
    #[serde(default = "default_plan_cache_write_threshold")]
    pub plan_cache_write_threshold: u64,
}

fn default_takeover_match_threshold() -> u64 {
    101
}
fn default_dedup_upgrade_threshold() -> usize {
    500
}
fn default_scan_and_order_max_bytes() -> usize {
    32 * 1024 * 1024
}
fn default_batch_max_bytes() -> usize {
    4 * 1024 * 1024
}
fn default_first_batch_docs() -> usize {
    101
}
fn default_first_batch_bytes() -> usize {
    1024 * 1024
}
fn default_plan_cache_write_threshold() -> u64 {
    100
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            takeover_match_threshold: default_takeover_match_threshold(),
            dedup_upgrade_threshold: default_dedup_upgrade_threshold(),
            scan_and_order_max_bytes: default_scan_and_order_max_bytes(),
            batch_max_bytes: default_batch_max_bytes(),
            first_batch_default_docs: default_first_batch_docs(),
            first_batch_default_bytes: default_first_batch_bytes(),
            plan_cache_write_threshold: default_plan_cache_write_threshold(),
        }
    }
}

impl ExecutorConfig {
    /// Rejects zero-valued thresholds
    pub fn validate(&self) -> Result<(), String> {
        let checks = [
            ("takeover_match_threshold", self.takeover_match_threshold == 0),
            ("scan_and_order_max_bytes", self.scan_and_order_max_bytes == 0),
            ("batch_max_bytes", self.batch_max_bytes == 0),
            ("first_batch_default_docs", self.first_batch_default_docs == 0),
            ("first_batch_default_bytes", self.first_batch_default_bytes == 0),
            ("plan_cache_write_threshold", self.plan_cache_write_threshold == 0),
        ];
        match checks.iter().find(|(_, bad)| *bad) {
            Some((name, _)) => Err(format!("{} must be > 0", name)),
            None => Ok(()),
        }
    }
}
