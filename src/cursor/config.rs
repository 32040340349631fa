//! Client cursor table settings

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorConfig {
    /// Idle time after which an unpinned cursor is erased
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,

    /// Period of the background idle sweep
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    /// Open cursor count that triggers a warning
    #[serde(default = "default_large_table_warning")]
    pub large_table_warning: usize,
}

fn default_idle_timeout_ms() -> u64 {
    10 * 60 * 1000
}
fn default_sweep_interval_ms() -> u64 {
    4000
}
fn default_large_table_warning() -> usize {
    100_000
}

impl Default for CursorConfig {
    fn default() -> Self {
        Self {
            idle_timeout_ms: default_idle_timeout_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
            large_table_warning: default_large_table_warning(),
        }
    }
}

impl CursorConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.idle_timeout_ms == 0 {
            return Err("cursor.idle_timeout_ms must be greater than zero".into());
        }
        if self.sweep_interval_ms == 0 {
            return Err("cursor.sweep_interval_ms must be greater than zero".into());
        }
        if self.large_table_warning == 0 {
            return Err("cursor.large_table_warning must be greater than zero".into());
        }
        Ok(())
    }
}
