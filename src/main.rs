//! TTL Cache - demonstration entry point
//!
//! Builds a cache from the environment, stores one value and reads it back.

use std::time::Duration;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ttl_cache::{CacheStore, Config};

/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Create the cache (starting its sweeper when enabled)
/// 4. Store and read back a value
/// 5. Stop the sweeper
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ttl_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    info!(
        "Configuration loaded: default_ttl={:?}, cleanup_interval={:?}",
        config.default_ttl, config.cleanup_interval
    );

    let (cache, sweeper) = CacheStore::<String>::from_config(&config);

    // Zero TTL picks up the configured default
    cache.set("server", "https://www.google.com".to_string(), Duration::ZERO);

    let server = cache
        .get("server")
        .context("value stored under 'server' should be readable")?;
    info!("server = {}", server);

    let stats = serde_json::to_string(&cache.stats())?;
    info!("Cache stats: {}", stats);

    sweeper.stop();
    info!("Shutdown complete");
    Ok(())
}
