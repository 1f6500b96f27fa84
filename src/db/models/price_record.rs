use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One observed price of a tracked symbol (PostgreSQL `prices` row).
///
/// Rows are append-only: a record is never updated or deleted once stored.
/// `symbol` is always the canonical, lower-cased id (e.g. `bitcoin`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub symbol: String,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

impl PriceRecord {
    pub fn new(symbol: impl Into<String>, price: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into().trim().to_lowercase(),
            price,
            timestamp,
        }
    }

    /// Record observed now.
    pub fn observed_now(symbol: impl Into<String>, price: f64) -> Self {
        Self::new(symbol, price, Utc::now())
    }
}
