use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cache::LatestCache;

use super::{LiveModeFlag, Poller};

/// How long shutdown waits for an in-flight cycle.
const STOP_TIMEOUT: Duration = Duration::from_secs(10);

struct RunningPoller {
    handle: JoinHandle<()>,
    cancel_token: CancellationToken,
}

/// Owns the live-mode flag and the poller task behind it.
///
/// Toggling is serialized, so at most one poller task exists at any time.
pub struct ModeController {
    flag: LiveModeFlag,
    poller: Arc<Poller>,
    cache: LatestCache,
    running: Mutex<Option<RunningPoller>>,
    shutdown: CancellationToken,
}

impl ModeController {
    pub fn new(poller: Arc<Poller>, cache: LatestCache, shutdown: CancellationToken) -> Self {
        Self {
            flag: LiveModeFlag::new(),
            poller,
            cache,
            running: Mutex::new(None),
            shutdown,
        }
    }

    pub fn is_live(&self) -> bool {
        self.flag.is_live()
    }

    pub fn poll_interval(&self) -> Duration {
        self.poller.interval()
    }

    /// Switch between static and live mode. Returns the resulting mode.
    ///
    /// Setting the current mode again is a no-op. Entering live mode drops
    /// every cached price and starts the poller; its first cycle runs one
    /// interval later. Leaving live mode signals the poller and returns
    /// without waiting for a cycle in flight to finish.
    pub async fn set_live(&self, live: bool) -> bool {
        let mut running = self.running.lock().await;

        if live == self.flag.is_live() {
            return live;
        }

        if live {
            if self.shutdown.is_cancelled() {
                warn!("Refusing to enter live mode during shutdown");
                return false;
            }

            self.cache.clear();

            let cancel_token = self.shutdown.child_token();
            let handle = tokio::spawn(self.poller.clone().run(cancel_token.clone()));
            *running = Some(RunningPoller {
                handle,
                cancel_token,
            });
            self.flag.set(true);

            info!("Live mode enabled");
        } else {
            self.flag.set(false);

            if let Some(poller) = running.take() {
                poller.cancel_token.cancel();
                tokio::spawn(async move {
                    if let Err(e) = poller.handle.await {
                        warn!("Poller task ended abnormally: {}", e);
                    }
                });
            }

            info!("Live mode disabled");
        }

        live
    }

    /// Stop the poller (if any) and wait for it to finish.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.flag.set(false);

        let Some(running) = self.running.lock().await.take() else {
            return;
        };

        info!("Stopping price poller");
        running.cancel_token.cancel();

        match tokio::time::timeout(STOP_TIMEOUT, running.handle).await {
            Ok(_) => info!("Price poller stopped gracefully"),
            Err(_) => warn!("Price poller did not stop within timeout, continuing..."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::PriceRecord;
    use crate::testing::{MemoryStore, ScriptedSource};

    fn controller(interval: Duration) -> (ModeController, Arc<MemoryStore>, LatestCache) {
        let source = ScriptedSource::new()
            .with_price("bitcoin", 42000.53)
            .with_price("ethereum", 2500.0);
        let store = Arc::new(MemoryStore::new());
        let cache = LatestCache::new(Duration::from_secs(60));
        let poller = Poller::new(
            Arc::new(source),
            store.clone(),
            cache.clone(),
            vec!["bitcoin".into(), "ethereum".into()],
            interval,
            4.0,
        );
        let controller = ModeController::new(Arc::new(poller), cache.clone(), CancellationToken::new());
        (controller, store, cache)
    }

    #[tokio::test]
    async fn test_starts_static() {
        let (controller, _, _) = controller(Duration::from_millis(10));
        assert!(!controller.is_live());
    }

    #[tokio::test]
    async fn test_toggle_on_then_off_writes_nothing() {
        let (controller, store, _) = controller(Duration::from_millis(200));

        assert!(controller.set_live(true).await);
        assert!(!controller.set_live(false).await);

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_live_mode_polls_every_interval() {
        let (controller, store, cache) = controller(Duration::from_millis(20));

        controller.set_live(true).await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        controller.set_live(false).await;

        assert!(store.rows_for("bitcoin").len() >= 2);
        assert_eq!(cache.get("bitcoin").await.unwrap().price, 42000.53);

        // No cycle starts after leaving live mode
        tokio::time::sleep(Duration::from_millis(60)).await;
        let settled = store.len();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.len(), settled);
    }

    #[tokio::test]
    async fn test_repeated_enable_keeps_single_poller() {
        let (controller, store, _) = controller(Duration::from_millis(50));

        controller.set_live(true).await;
        controller.set_live(true).await;
        controller.set_live(true).await;
        tokio::time::sleep(Duration::from_millis(75)).await;
        controller.shutdown().await;

        // One cycle over two symbols
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_entering_live_clears_cache() {
        let (controller, _, cache) = controller(Duration::from_secs(60));
        cache
            .set("bitcoin", PriceRecord::observed_now("bitcoin", 1.0), None)
            .await;

        controller.set_live(true).await;
        assert!(cache.get("bitcoin").await.is_none());
        controller.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_blocks_live_mode() {
        let (controller, _, _) = controller(Duration::from_millis(10));
        controller.shutdown().await;
        assert!(!controller.set_live(true).await);
        assert!(!controller.is_live());
    }
}
