use std::time::{Duration, Instant};

use log::debug;
use moka::{future::Cache, Expiry};
use tokio::sync::broadcast;

use crate::db::PriceRecord;

/// Buffered updates per subscriber before a slow listener starts lagging.
pub const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// Upper bound on distinct cached symbols.
const MAX_CACHED_SYMBOLS: u64 = 10_000;

#[derive(Debug, Clone)]
struct CacheEntry {
    record: PriceRecord,
    ttl: Duration,
}

/// Expires each entry after the TTL it was written with. Overwriting an
/// entry restarts its clock.
struct EntryTtl;

impl Expiry<String, CacheEntry> for EntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CacheEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Most recent price per symbol plus a broadcast channel for live listeners.
///
/// At most one entry exists per symbol; writers race with last-writer-wins.
/// A miss is a normal outcome (`None`), never an error.
#[derive(Clone)]
pub struct LatestCache {
    entries: Cache<String, CacheEntry>,
    default_ttl: Duration,
    updates: broadcast::Sender<PriceRecord>,
}

impl LatestCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self::with_capacity(default_ttl, DEFAULT_BROADCAST_CAPACITY)
    }

    pub fn with_capacity(default_ttl: Duration, broadcast_capacity: usize) -> Self {
        let entries = Cache::builder()
            .max_capacity(MAX_CACHED_SYMBOLS)
            .expire_after(EntryTtl)
            .build();

        let (updates, _) = broadcast::channel(broadcast_capacity.max(1));

        Self {
            entries,
            default_ttl,
            updates,
        }
    }

    /// Overwrite the entry for `symbol`. `ttl` falls back to the configured
    /// retention.
    pub async fn set(&self, symbol: &str, record: PriceRecord, ttl: Option<Duration>) {
        let entry = CacheEntry {
            record,
            ttl: ttl.unwrap_or(self.default_ttl),
        };
        self.entries.insert(symbol.to_string(), entry).await;
    }

    pub async fn get(&self, symbol: &str) -> Option<PriceRecord> {
        self.entries.get(symbol).await.map(|entry| entry.record)
    }

    /// Send `record` to every current subscriber.
    ///
    /// Never blocks and never fails: with nobody listening the update is
    /// dropped.
    pub fn publish(&self, record: &PriceRecord) {
        match self.updates.send(record.clone()) {
            Ok(receivers) => debug!(
                "Published {} -> {} to {} subscribers",
                record.symbol, record.price, receivers
            ),
            Err(_) => debug!("No subscribers for {} update", record.symbol),
        }
    }

    /// Receive every update published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<PriceRecord> {
        self.updates.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.updates.receiver_count()
    }

    /// Drop every cached entry.
    pub fn clear(&self) {
        self.entries.invalidate_all();
    }
}
