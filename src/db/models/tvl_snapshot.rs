use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Total value locked of a DeFi protocol as reported by the aggregator.
///
/// Read-through only: snapshots are cached briefly but never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TvlSnapshot {
    pub protocol: String,
    pub tvl_usd: f64,
    pub last_updated: DateTime<Utc>,
}

impl TvlSnapshot {
    pub fn new(protocol: impl Into<String>, tvl_usd: f64, last_updated: DateTime<Utc>) -> Self {
        Self {
            protocol: protocol.into(),
            tvl_usd,
            last_updated,
        }
    }
}
