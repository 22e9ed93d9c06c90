//! TTL Sweeper Task
//!
//! Background task that periodically removes expired cache entries until it
//! is stopped or its cache is dropped.

use std::fmt;
use std::thread;
use std::time::Duration;

use tokio::runtime::Builder;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::cache::{CacheStore, WeakCacheStore};

// == Sweeper Handle ==
/// Controls a running sweeper.
///
/// Dropping the handle closes the shutdown channel, which stops the sweeper
/// just like [`SweeperHandle::stop`].
#[must_use = "dropping the handle stops the sweeper"]
pub struct SweeperHandle {
    shutdown_tx: Option<watch::Sender<bool>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl SweeperHandle {
    /// Handle for a cache that never sweeps.
    pub fn disabled() -> Self {
        Self {
            shutdown_tx: None,
            worker: None,
        }
    }

    /// Returns true if a sweeper was started for this cache.
    pub fn is_enabled(&self) -> bool {
        self.worker.is_some()
    }

    /// Returns true while the sweep loop has not exited.
    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|worker| !worker.is_finished())
    }

    /// Requests the sweeper to stop. Safe to call more than once.
    ///
    /// The loop exits at its next wake-up; an in-flight sweep completes first.
    pub fn stop(&self) {
        if let Some(shutdown_tx) = &self.shutdown_tx {
            shutdown_tx.send_replace(true);
        }
    }
}

impl fmt::Debug for SweeperHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SweeperHandle")
            .field("enabled", &self.is_enabled())
            .field("running", &self.is_running())
            .finish()
    }
}

/// Spawns a background thread that periodically sweeps expired cache entries.
///
/// The sweep loop runs on a dedicated `ttl-cache-sweeper` thread driving its
/// own single-threaded Tokio runtime, so it keeps running regardless of the
/// caller's runtime. It only holds a weak reference to the cache and exits
/// by itself once every [`CacheStore`] handle is gone.
///
/// A zero `interval` returns a disabled handle. If the thread cannot be
/// spawned the failure is logged and a disabled handle is returned; if its
/// runtime cannot be built the thread logs the failure and exits, after which
/// [`SweeperHandle::is_running`] reports false.
///
/// # Example
/// ```ignore
/// let (cache, _disabled) = CacheStore::<String>::new(Duration::ZERO, Duration::ZERO);
/// let sweeper = spawn_sweeper(cache.downgrade(), Duration::from_secs(1));
/// // Later, during shutdown:
/// sweeper.stop();
/// ```
pub fn spawn_sweeper<V>(cache: WeakCacheStore<V>, interval: Duration) -> SweeperHandle
where
    V: Clone + Send + Sync + 'static,
{
    if interval.is_zero() {
        return SweeperHandle::disabled();
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let spawned = thread::Builder::new()
        .name("ttl-cache-sweeper".to_string())
        .spawn(move || {
            // Built on the sweeper thread so it is never dropped inside the caller's runtime
            match Builder::new_current_thread().enable_time().build() {
                Ok(runtime) => runtime.block_on(sweep_loop(cache, interval, shutdown_rx)),
                Err(err) => error!("Failed to build sweeper runtime, sweeping disabled: {}", err),
            }
        });

    match spawned {
        Ok(worker) => {
            info!("Starting TTL sweeper with interval of {:?}", interval);
            SweeperHandle {
                shutdown_tx: Some(shutdown_tx),
                worker: Some(worker),
            }
        }
        Err(err) => {
            error!("Failed to spawn sweeper thread, sweeping disabled: {}", err);
            SweeperHandle::disabled()
        }
    }
}

async fn sweep_loop<V>(
    cache: WeakCacheStore<V>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) where
    V: Clone + Send + Sync + 'static,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Some(store) = cache.upgrade() else {
                    debug!("Cache dropped, TTL sweeper exiting");
                    break;
                };
                sweep(&store);
            }
            changed = shutdown_rx.changed() => {
                // Err means the handle was dropped
                if changed.is_err() || *shutdown_rx.borrow() {
                    debug!("TTL sweeper stopped");
                    break;
                }
            }
        }
    }
}

/// One scan-then-evict cycle. The two phases take the lock separately.
fn sweep<V>(store: &CacheStore<V>) -> usize
where
    V: Clone + Send + Sync + 'static,
{
    let expired = store.expired_keys();
    if expired.is_empty() {
        debug!("TTL sweep: no expired entries found");
        return 0;
    }

    debug!("TTL sweep: {} expired entries found", expired.len());
    let removed = store.evict_expired(&expired);
    info!("TTL sweep: removed {} expired entries", removed);
    removed
}
