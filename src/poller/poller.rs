use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use log::{debug, error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::cache::LatestCache;
use crate::db::PriceStore;
use crate::upstream::PriceSource;

/// Summary of one refresh cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Symbols whose price was fetched (and cached)
    pub fetched: Vec<String>,
    /// Fetched symbols whose history row was written
    pub stored: usize,
    /// Symbols whose fetch failed, with the reason
    pub failed: Vec<(String, String)>,
}

impl CycleReport {
    /// True when the cycle had symbols to refresh and none succeeded.
    pub fn all_failed(&self) -> bool {
        self.fetched.is_empty() && !self.failed.is_empty()
    }
}

enum SymbolOutcome {
    Refreshed { symbol: String, stored: bool },
    Failed { symbol: String, reason: String },
}

/// Interval multiplier for the next cycle: doubles (up to `max`) after a
/// cycle where every symbol failed, halves back toward 1 otherwise.
pub(crate) fn next_backoff(current: f64, all_failed: bool, max: f64) -> f64 {
    if all_failed {
        (current * 2.0).min(max)
    } else {
        (current * 0.5).max(1.0)
    }
}

/// Drives fetch → store → cache → publish for every tracked symbol.
pub struct Poller {
    source: Arc<dyn PriceSource>,
    store: Arc<dyn PriceStore>,
    cache: LatestCache,
    symbols: Vec<String>,
    interval: Duration,
    max_backoff_multiplier: f64,
}

impl Poller {
    pub fn new(
        source: Arc<dyn PriceSource>,
        store: Arc<dyn PriceStore>,
        cache: LatestCache,
        symbols: Vec<String>,
        interval: Duration,
        max_backoff_multiplier: f64,
    ) -> Self {
        Self {
            source,
            store,
            cache,
            symbols,
            interval,
            max_backoff_multiplier: max_backoff_multiplier.max(1.0),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Refresh one symbol. A fetch failure stops here; a store failure is
    /// logged and the fetched price is still cached and published.
    async fn refresh_symbol(&self, symbol: &str) -> SymbolOutcome {
        let record = match self.source.fetch_price(symbol).await {
            Ok(record) => record,
            Err(e) => {
                warn!("Failed to fetch {} price: {}", symbol, e);
                return SymbolOutcome::Failed {
                    symbol: symbol.to_string(),
                    reason: e.to_string(),
                };
            },
        };

        info!("Fetched {} price: {}", record.symbol, record.price);

        let stored = match self.store.append(&record).await {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to store {} price: {}", record.symbol, e);
                false
            },
        };

        self.cache.set(&record.symbol, record.clone(), None).await;
        self.cache.publish(&record);

        SymbolOutcome::Refreshed {
            symbol: record.symbol,
            stored,
        }
    }

    /// Run one refresh cycle over every tracked symbol.
    ///
    /// Symbols are refreshed concurrently and independently: one symbol's
    /// failure never prevents the others from being fetched, stored and
    /// cached. Nothing is retried within the cycle.
    pub async fn run_cycle(&self) -> CycleReport {
        let outcomes = join_all(self.symbols.iter().map(|s| self.refresh_symbol(s))).await;

        let mut report = CycleReport::default();
        for outcome in outcomes {
            match outcome {
                SymbolOutcome::Refreshed { symbol, stored } => {
                    if stored {
                        report.stored += 1;
                    }
                    report.fetched.push(symbol);
                },
                SymbolOutcome::Failed { symbol, reason } => report.failed.push((symbol, reason)),
            }
        }

        if report.fetched.is_empty() {
            warn!("No prices fetched in this poller cycle");
        }

        report
    }

    /// Repeat refresh cycles until `cancellation_token` fires.
    ///
    /// The first cycle starts one interval after entry. Cancellation is only
    /// observed between cycles, so a cycle already running completes.
    pub async fn run(self: Arc<Self>, cancellation_token: CancellationToken) {
        info!(
            "Price poller started ({} symbols, every {:?})",
            self.symbols.len(),
            self.interval
        );

        let mut multiplier = 1.0;
        let mut wait = self.interval;

        loop {
            tokio::select! {
                biased;
                _ = cancellation_token.cancelled() => break,
                _ = tokio::time::sleep(wait) => {},
            }

            if cancellation_token.is_cancelled() {
                break;
            }

            let start = Instant::now();
            let report = self.run_cycle().await;
            let elapsed = start.elapsed();

            multiplier = next_backoff(multiplier, report.all_failed(), self.max_backoff_multiplier);
            wait = self.interval.mul_f64(multiplier).saturating_sub(elapsed);

            debug!(
                "Poller cycle took {:?} ({} fetched, {} stored, {} failed); sleeping {:?} (multiplier={:.2})",
                elapsed,
                report.fetched.len(),
                report.stored,
                report.failed.len(),
                wait,
                multiplier
            );
        }

        info!("Price poller stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryStore, ScriptedSource};

    fn poller(source: ScriptedSource, store: Arc<MemoryStore>, cache: LatestCache) -> Poller {
        Poller::new(
            Arc::new(source),
            store,
            cache,
            vec!["bitcoin".into(), "ethereum".into(), "cusd".into()],
            Duration::from_millis(20),
            4.0,
        )
    }

    #[test]
    fn test_backoff_doubles_to_cap_and_recovers() {
        assert_eq!(next_backoff(1.0, true, 4.0), 2.0);
        assert_eq!(next_backoff(2.0, true, 4.0), 4.0);
        assert_eq!(next_backoff(4.0, true, 4.0), 4.0);
        assert_eq!(next_backoff(4.0, false, 4.0), 2.0);
        assert_eq!(next_backoff(1.0, false, 4.0), 1.0);
    }

    #[tokio::test]
    async fn test_one_failing_symbol_does_not_abort_cycle() {
        let source = ScriptedSource::new()
            .with_price("bitcoin", 42000.53)
            .with_outage("ethereum")
            .with_price("cusd", 0.9998);
        let store = Arc::new(MemoryStore::new());
        let cache = LatestCache::new(Duration::from_secs(60));
        let poller = poller(source, store.clone(), cache.clone());

        let report = poller.run_cycle().await;

        assert_eq!(report.fetched, vec!["bitcoin".to_string(), "cusd".to_string()]);
        assert_eq!(report.stored, 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "ethereum");
        assert!(!report.all_failed());

        assert_eq!(store.rows_for("bitcoin").len(), 1);
        assert_eq!(store.rows_for("cusd").len(), 1);
        assert!(store.rows_for("ethereum").is_empty());
        assert_eq!(cache.get("bitcoin").await.unwrap().price, 42000.53);
        assert_eq!(cache.get("cusd").await.unwrap().price, 0.9998);
        assert!(cache.get("ethereum").await.is_none());
    }

    #[tokio::test]
    async fn test_cycle_publishes_each_refreshed_symbol() {
        let source = ScriptedSource::new()
            .with_price("bitcoin", 1.0)
            .with_malformed("ethereum")
            .with_price("cusd", 1.0);
        let store = Arc::new(MemoryStore::new());
        let cache = LatestCache::new(Duration::from_secs(60));
        let mut rx = cache.subscribe();
        let poller = poller(source, store, cache);

        poller.run_cycle().await;

        let mut seen = vec![rx.recv().await.unwrap().symbol, rx.recv().await.unwrap().symbol];
        seen.sort();
        assert_eq!(seen, vec!["bitcoin".to_string(), "cusd".to_string()]);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_storage_failure_still_updates_cache() {
        let source = ScriptedSource::new()
            .with_price("bitcoin", 1.0)
            .with_price("ethereum", 2.0)
            .with_price("cusd", 3.0);
        let store = Arc::new(MemoryStore::new());
        store.set_failing(true);
        let cache = LatestCache::new(Duration::from_secs(60));
        let poller = poller(source, store.clone(), cache.clone());

        let report = poller.run_cycle().await;

        assert_eq!(report.fetched.len(), 3);
        assert_eq!(report.stored, 0);
        assert_eq!(store.len(), 0);
        assert_eq!(cache.get("ethereum").await.unwrap().price, 2.0);
    }

    #[tokio::test]
    async fn test_all_failed_cycle() {
        let source = ScriptedSource::new()
            .with_outage("bitcoin")
            .with_outage("ethereum")
            .with_outage("cusd");
        let poller = poller(
            source,
            Arc::new(MemoryStore::new()),
            LatestCache::new(Duration::from_secs(60)),
        );

        assert!(poller.run_cycle().await.all_failed());
    }

    #[tokio::test]
    async fn test_run_stops_on_cancellation() {
        let source = ScriptedSource::new()
            .with_price("bitcoin", 1.0)
            .with_price("ethereum", 2.0)
            .with_price("cusd", 3.0);
        let store = Arc::new(MemoryStore::new());
        let poller = Arc::new(poller(
            source,
            store.clone(),
            LatestCache::new(Duration::from_secs(60)),
        ));

        let token = CancellationToken::new();
        let handle = tokio::spawn(poller.run(token.clone()));

        tokio::time::sleep(Duration::from_millis(150)).await;
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("poller did not stop")
            .unwrap();

        let written = store.len();
        assert!(written >= 3, "expected at least one cycle, got {} rows", written);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.len(), written);
    }
}
