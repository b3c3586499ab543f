//! Cache Core - demo host process
//!
//! Runs a cache built from the environment under a small synthetic
//! workload and logs statistics until interrupted.

use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cache_core::interceptors::HeapSizeEstimator;
use cache_core::{spawn_purge_task, Cache, Config};

/// Number of distinct keys the workload cycles through.
const KEY_SPACE: u64 = 4096;

/// Main entry point.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Build the cache and start the background purge task
/// 4. Run the workload and the statistics reporter
/// 5. Handle graceful shutdown on SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cache_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting cache core");

    let config = Config::from_env()?;
    info!(
        "Configuration loaded: max_entries={}, strategy={}, purge_interval={}s, track_memory_usage={}",
        config.max_entries, config.eviction_strategy, config.purge_interval, config.track_memory_usage
    );

    let cache: Arc<Cache<String, String>> = Arc::new(
        Cache::builder(config.clone())
            .size_estimator(Arc::new(HeapSizeEstimator))
            .build()?,
    );

    let purge_handle = spawn_purge_task(cache.container().clone(), config.purge_interval);
    let workload_handle = spawn_workload(cache.clone());
    let reporter_handle = spawn_reporter(cache.clone());

    shutdown_signal().await?;

    for handle in [purge_handle, workload_handle, reporter_handle] {
        handle.abort();
    }
    warn!("Background tasks aborted");

    if let Some(stats) = cache.stats() {
        info!("Final statistics: {}", serde_json::to_string(&stats)?);
    }
    info!("Shutdown complete");
    Ok(())
}

/// Writes and reads keys in a loop, with roughly one read miss in four.
fn spawn_workload(cache: Arc<Cache<String, String>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(10));
        let mut counter: u64 = 0;
        loop {
            ticker.tick().await;
            counter = counter.wrapping_add(1);
            let key = format!("key:{}", counter % KEY_SPACE);
            if counter % 4 != 0 {
                if let Err(error) = cache.put(key.clone(), format!("value:{}", counter)) {
                    warn!(%error, "Put failed");
                }
            }
            let _ = cache.get(&format!("key:{}", (counter * 7) % KEY_SPACE));
        }
    })
}

/// Logs statistics and memory usage every ten seconds.
fn spawn_reporter(cache: Arc<Cache<String, String>>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(10));
        loop {
            ticker.tick().await;
            if let Some(stats) = cache.stats() {
                info!(
                    size = cache.size(),
                    hits = stats.hits,
                    misses = stats.misses,
                    evictions = stats.evictions,
                    expirations = stats.expirations,
                    hit_rate = stats.hit_rate,
                    "Cache statistics"
                );
            }
            if let Some(report) = cache.memory_usage() {
                info!(
                    total = report.total,
                    tracking = %report.tracking_type,
                    "Memory usage"
                );
            }
        }
    })
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = signal::ctrl_c() => {
                result?;
                info!("Received Ctrl+C, initiating shutdown...");
            }
            _ = terminate.recv() => {
                info!("Received SIGTERM, initiating shutdown...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        info!("Received Ctrl+C, initiating shutdown...");
    }

    Ok(())
}
