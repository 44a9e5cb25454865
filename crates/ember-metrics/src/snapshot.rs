//! Snapshot export

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Point-in-time view of all registered metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Counter values by name
    pub counters: BTreeMap<String, u64>,
    /// Gauge values by name
    pub gauges: BTreeMap<String, i64>,
}

impl MetricsSnapshot {
    /// Render the snapshot as pretty JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}
