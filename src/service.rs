//! Request-level operations over the store, cache, upstream and poller.

use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use moka::future::Cache;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::cache::LatestCache;
use crate::db::{HistoryQuery, PriceRecord, PriceStore, TvlSnapshot};
use crate::error::{FetchError, ServiceError};
use crate::poller::ModeController;
use crate::upstream::{normalize_protocol, PriceSource, SymbolRegistry};

const MAX_CACHED_PROTOCOLS: u64 = 1_000;

/// Retry policy for on-demand fetches.
#[derive(Debug, Clone, Copy)]
pub struct FetchRetry {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl FetchRetry {
    /// Delay before retry number `n` (1-based): `base * 2^(n-1)`.
    fn delay(&self, n: u32) -> Duration {
        self.base_delay
            .saturating_mul(1u32 << n.saturating_sub(1).min(16))
    }
}

/// One page of a symbol's price history plus the total row count.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryPage {
    pub symbol: String,
    pub total: i64,
    pub records: Vec<PriceRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModeStatus {
    pub live_mode: bool,
    pub poll_interval_ms: u64,
    pub cache_retention_secs: u64,
}

pub struct PriceService {
    registry: Arc<SymbolRegistry>,
    source: Arc<dyn PriceSource>,
    store: Arc<dyn PriceStore>,
    cache: LatestCache,
    mode: Arc<ModeController>,
    tvl_cache: Cache<String, TvlSnapshot>,
    retry: FetchRetry,
    cache_retention: Duration,
}

impl PriceService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<SymbolRegistry>,
        source: Arc<dyn PriceSource>,
        store: Arc<dyn PriceStore>,
        cache: LatestCache,
        mode: Arc<ModeController>,
        retry: FetchRetry,
        cache_retention: Duration,
        tvl_cache_ttl: Duration,
    ) -> Self {
        let tvl_cache = Cache::builder()
            .max_capacity(MAX_CACHED_PROTOCOLS)
            .time_to_live(tvl_cache_ttl)
            .build();

        Self {
            registry,
            source,
            store,
            cache,
            mode,
            tvl_cache,
            retry,
            cache_retention,
        }
    }

    /// Canonical id of a registered symbol, or `UnknownSymbolOrProtocol`.
    fn canonical(&self, symbol: &str) -> Result<String, ServiceError> {
        Ok(self.registry.resolve(symbol)?.id.clone())
    }

    pub fn is_live(&self) -> bool {
        self.mode.is_live()
    }

    pub async fn history(
        &self,
        symbol: &str,
        query: &HistoryQuery,
    ) -> Result<HistoryPage, ServiceError> {
        let symbol = self.canonical(symbol)?;

        if let (Some(from), Some(to)) = (query.from, query.to) {
            if from > to {
                return Err(ServiceError::InvalidRequest(format!(
                    "'from' ({}) is after 'to' ({})",
                    from, to
                )));
            }
        }

        let records = self.store.query_history(&symbol, query).await?;
        let total = self.store.count(&symbol, query).await?;

        Ok(HistoryPage {
            symbol,
            total,
            records,
        })
    }

    /// Most recent price. In live mode the cache is consulted first and a
    /// miss falls through to the store; in static mode the store is read
    /// directly.
    pub async fn latest(&self, symbol: &str) -> Result<PriceRecord, ServiceError> {
        let symbol = self.canonical(symbol)?;

        if self.mode.is_live() {
            if let Some(record) = self.cache.get(&symbol).await {
                return Ok(record);
            }
        }

        self.store
            .query_latest(&symbol)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("no price stored for '{}'", symbol)))
    }

    /// Fetch a fresh price, store it, and (in live mode) cache and publish it.
    pub async fn fetch(&self, symbol: &str) -> Result<PriceRecord, ServiceError> {
        let symbol = self.canonical(symbol)?;
        let record = self.fetch_with_retry(&symbol).await?;

        self.store.append(&record).await?;

        if self.mode.is_live() {
            self.cache.set(&record.symbol, record.clone(), None).await;
            self.cache.publish(&record);
        }

        info!("Fetched and stored {} price: {}", record.symbol, record.price);
        Ok(record)
    }

    async fn fetch_with_retry(&self, symbol: &str) -> Result<PriceRecord, FetchError> {
        let mut attempt = 1;
        loop {
            match self.source.fetch_price(symbol).await {
                Ok(record) => return Ok(record),
                Err(e) if e.is_transient() && attempt < self.retry.attempts => {
                    let delay = self.retry.delay(attempt);
                    warn!(
                        "Fetch attempt {}/{} for {} failed: {}; retrying in {:?}",
                        attempt, self.retry.attempts, symbol, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                },
                Err(e) => return Err(e),
            }
        }
    }

    /// Current TVL of `protocol`, served from a short-lived cache.
    pub async fn tvl(&self, protocol: &str) -> Result<TvlSnapshot, ServiceError> {
        let protocol = normalize_protocol(protocol)?;

        if let Some(snapshot) = self.tvl_cache.get(&protocol).await {
            return Ok(snapshot);
        }

        let snapshot = self.source.fetch_tvl(&protocol).await?;
        self.tvl_cache.insert(protocol, snapshot.clone()).await;
        Ok(snapshot)
    }

    pub fn mode_status(&self) -> ModeStatus {
        ModeStatus {
            live_mode: self.mode.is_live(),
            poll_interval_ms: self.mode.poll_interval().as_millis() as u64,
            cache_retention_secs: self.cache_retention.as_secs(),
        }
    }

    pub async fn set_mode(&self, live: bool) -> ModeStatus {
        self.mode.set_live(live).await;
        self.mode_status()
    }

    /// Live price updates published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<PriceRecord> {
        self.cache.subscribe()
    }
}
