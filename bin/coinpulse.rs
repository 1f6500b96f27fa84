use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use jemallocator::Jemalloc;
use log::{info, LevelFilter};
use simple_logger::SimpleLogger;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use coinpulse::{
    api, FetchRetry, LatestCache, ModeController, Poller, PostgresClient, PriceService, Settings,
    SymbolRegistry, UpstreamClient,
};

#[tokio::main()]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let settings = Settings::new().context("Failed to load configuration. Check config.yaml and COINPULSE_* variables")?;

    let level = settings
        .log_level
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::Info);
    SimpleLogger::new()
        .with_level(level)
        .with_colors(true)
        .init()
        .context("Failed to initialize logger")?;

    let db = Arc::new(
        PostgresClient::new(settings.postgres.clone())
            .await
            .context("Failed to initialize database connection")?,
    );

    if settings.postgres.run_migrations {
        db.migrate().await.context("Failed to apply migrations")?;
    }

    let registry = Arc::new(SymbolRegistry::new(&settings.symbols, &settings.upstream));
    let upstream = Arc::new(
        UpstreamClient::new(settings.upstream.clone(), registry.clone())
            .context("Failed to initialize upstream client")?,
    );

    let tracked = match &settings.poller.tracked_symbols {
        Some(symbols) => symbols
            .iter()
            .map(|s| registry.resolve(s).map(|t| t.id.clone()))
            .collect::<Result<Vec<_>, _>>()?,
        None => registry.ids().map(String::from).collect(),
    };
    info!("Tracking symbols: {}", tracked.join(", "));

    let cache = LatestCache::new(settings.poller.cache_retention());
    let cancellation_token = CancellationToken::new();

    let poller = Arc::new(Poller::new(
        upstream.clone(),
        db.clone(),
        cache.clone(),
        tracked,
        settings.poller.interval(),
        settings.poller.max_backoff_multiplier,
    ));

    let mode = Arc::new(ModeController::new(
        poller,
        cache.clone(),
        cancellation_token.child_token(),
    ));

    if settings.poller.live_on_start {
        mode.set_live(true).await;
    }

    let service = Arc::new(PriceService::new(
        registry,
        upstream,
        db,
        cache,
        mode.clone(),
        FetchRetry {
            attempts: settings.upstream.fetch_attempts,
            base_delay: std::time::Duration::from_millis(settings.upstream.retry_base_delay_ms),
        },
        settings.poller.cache_retention(),
        settings.poller.tvl_cache_ttl(),
    ));

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .context("Invalid server bind address")?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    let server_token = cancellation_token.child_token();
    let server = tokio::spawn(async move {
        axum::serve(listener, api::router(service))
            .with_graceful_shutdown(async move { server_token.cancelled().await })
            .await
    });

    info!("API listening on http://{}", addr);

    #[cfg(unix)]
    let mut sigterm_stream = {
        use tokio::signal::unix::{signal, SignalKind};
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?
    };

    info!("Service running. Press Ctrl+C to stop.");

    #[cfg(unix)]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
            },
            _ = sigterm_stream.recv() => {
                info!("Received SIGTERM, exiting gracefully...");
            },
        };
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
            },
        };
    }

    info!("Finishing all tasks...");
    cancellation_token.cancel();

    mode.shutdown().await;

    info!("Waiting for API server to stop...");
    server
        .await
        .context("API server task panicked")?
        .context("API server failed")?;

    info!("Shutdown complete");
    Ok(())
}
