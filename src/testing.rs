//! In-memory doubles for the store and upstream seams.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::db::{HistoryQuery, PriceRecord, PriceStore, SortOrder, TvlSnapshot};
use crate::error::{FetchError, StorageError};
use crate::upstream::PriceSource;

/// Append-only store backed by a `Vec`.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<PriceRecord>>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn rows_for(&self, symbol: &str) -> Vec<PriceRecord> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.symbol == symbol)
            .cloned()
            .collect()
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StorageError::Unavailable("store offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PriceStore for MemoryStore {
    async fn append(&self, record: &PriceRecord) -> Result<(), StorageError> {
        self.check()?;
        self.rows.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn query_history(
        &self,
        symbol: &str,
        query: &HistoryQuery,
    ) -> Result<Vec<PriceRecord>, StorageError> {
        self.check()?;
        let query = query.sanitized();

        // Stable sort keeps insertion order for equal timestamps, like `id`
        let mut rows: Vec<PriceRecord> = self
            .rows_for(symbol)
            .into_iter()
            .filter(|r| query.contains(&r.timestamp))
            .collect();
        rows.sort_by_key(|r| r.timestamp);
        if query.order == SortOrder::Desc {
            rows.reverse();
        }

        Ok(rows
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .collect())
    }

    async fn query_latest(&self, symbol: &str) -> Result<Option<PriceRecord>, StorageError> {
        self.check()?;
        let rows = self.rows_for(symbol);
        let mut latest: Option<PriceRecord> = None;
        for row in rows {
            if latest.as_ref().map_or(true, |l| row.timestamp >= l.timestamp) {
                latest = Some(row);
            }
        }
        Ok(latest)
    }

    async fn count(&self, symbol: &str, query: &HistoryQuery) -> Result<i64, StorageError> {
        self.check()?;
        Ok(self
            .rows_for(symbol)
            .iter()
            .filter(|r| query.contains(&r.timestamp))
            .count() as i64)
    }
}

#[derive(Debug, Clone)]
enum Scripted {
    Price(f64),
    Unavailable,
    Malformed,
}

/// Upstream that answers from a fixed script and counts calls.
///
/// Symbols without a script are unknown.
#[derive(Default)]
pub struct ScriptedSource {
    prices: Mutex<HashMap<String, Scripted>>,
    tvl: Mutex<HashMap<String, TvlSnapshot>>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price(self, symbol: &str, price: f64) -> Self {
        self.set_price(symbol, price);
        self
    }

    pub fn with_outage(self, symbol: &str) -> Self {
        self.prices
            .lock()
            .unwrap()
            .insert(symbol.to_string(), Scripted::Unavailable);
        self
    }

    pub fn with_malformed(self, symbol: &str) -> Self {
        self.prices
            .lock()
            .unwrap()
            .insert(symbol.to_string(), Scripted::Malformed);
        self
    }

    pub fn with_tvl(self, snapshot: TvlSnapshot) -> Self {
        self.tvl
            .lock()
            .unwrap()
            .insert(snapshot.protocol.clone(), snapshot);
        self
    }

    pub fn set_price(&self, symbol: &str, price: f64) {
        self.prices
            .lock()
            .unwrap()
            .insert(symbol.to_string(), Scripted::Price(price));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceSource for ScriptedSource {
    async fn fetch_price(&self, symbol: &str) -> Result<PriceRecord, FetchError> {
        let scripted = self.prices.lock().unwrap().get(symbol).cloned();
        let scripted =
            scripted.ok_or_else(|| FetchError::UnknownSymbolOrProtocol(symbol.to_string()))?;

        self.calls.fetch_add(1, Ordering::SeqCst);
        match scripted {
            Scripted::Price(price) => Ok(PriceRecord::new(symbol, price, Utc::now())),
            Scripted::Unavailable => Err(FetchError::unavailable("scripted", "HTTP 500")),
            Scripted::Malformed => Err(FetchError::malformed("scripted", "no price")),
        }
    }

    async fn fetch_tvl(&self, protocol: &str) -> Result<TvlSnapshot, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.tvl
            .lock()
            .unwrap()
            .get(protocol)
            .cloned()
            .ok_or_else(|| FetchError::UnknownSymbolOrProtocol(protocol.to_string()))
    }
}
