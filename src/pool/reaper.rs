//! Background reclamation of idle sandboxes.
//!
//! The reaper owns no pool state. It periodically calls
//! [`SandboxPool::cleanup_idle_sandboxes`] and, on shutdown, waits for any
//! in-flight sweep before clearing the pool.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use super::SandboxPool;

/// Timing and shutdown behaviour of the reaper.
#[derive(Debug, Clone)]
pub struct ReaperConfig {
    /// Time between idle sweeps.
    ///
    /// Default: 60 seconds
    pub sweep_interval: Duration,

    /// Evicted sandboxes idle for longer than this are destroyed.
    ///
    /// Default: 600 seconds
    pub idle_timeout: Duration,

    /// Destroy every container on shutdown rather than abandoning them.
    ///
    /// Default: true
    pub close_on_shutdown: bool,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(60),
            idle_timeout: Duration::from_secs(600),
            close_on_shutdown: true,
        }
    }
}

/// Reaper counters, readable without locking.
#[derive(Debug, Default)]
pub struct ReaperStats {
    /// Completed sweeps.
    pub sweeps: AtomicU64,
    /// Sandboxes destroyed by sweeps.
    pub reclaimed: AtomicU64,
}

impl ReaperStats {
    /// Completed sweeps so far.
    pub fn sweeps(&self) -> u64 {
        self.sweeps.load(Ordering::Relaxed)
    }

    /// Sandboxes destroyed by sweeps so far.
    pub fn reclaimed(&self) -> u64 {
        self.reclaimed.load(Ordering::Relaxed)
    }
}

/// Periodic idle sweeper for a [`SandboxPool`].
pub struct Reaper {
    pool: Arc<SandboxPool>,
    config: ReaperConfig,
    shutdown: Arc<AtomicBool>,
    shutdown_notify: Arc<Notify>,
    handle: Option<JoinHandle<()>>,
    stats: Arc<ReaperStats>,
}

impl Reaper {
    /// Create a reaper. Nothing runs until [`start`](Self::start).
    pub fn new(pool: Arc<SandboxPool>, config: ReaperConfig) -> Self {
        Self {
            pool,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
            shutdown_notify: Arc::new(Notify::new()),
            handle: None,
            stats: Arc::new(ReaperStats::default()),
        }
    }

    /// Spawn the sweep loop on the current tokio runtime.
    pub fn start(&mut self) {
        if self.handle.is_some() {
            tracing::warn!("Reaper already started");
            return;
        }

        let pool = Arc::clone(&self.pool);
        let config = self.config.clone();
        let shutdown = Arc::clone(&self.shutdown);
        let shutdown_notify = Arc::clone(&self.shutdown_notify);
        let stats = Arc::clone(&self.stats);

        self.handle = Some(tokio::spawn(async move {
            Self::sweep_loop(pool, config, shutdown, shutdown_notify, stats).await;
        }));

        tracing::info!(
            interval_secs = self.config.sweep_interval.as_secs(),
            idle_timeout_secs = self.config.idle_timeout.as_secs(),
            "Reaper started"
        );
    }

    async fn sweep_loop(
        pool: Arc<SandboxPool>,
        config: ReaperConfig,
        shutdown: Arc<AtomicBool>,
        shutdown_notify: Arc<Notify>,
        stats: Arc<ReaperStats>,
    ) {
        loop {
            tokio::select! {
                biased;

                _ = shutdown_notify.notified() => {
                    tracing::debug!("Reaper received shutdown signal");
                    break;
                }

                () = tokio::time::sleep(config.sweep_interval) => {
                    if shutdown.load(Ordering::Relaxed) {
                        break;
                    }

                    let reclaimed = pool.cleanup_idle_sandboxes(config.idle_timeout).await;
                    stats.sweeps.fetch_add(1, Ordering::Relaxed);
                    stats.reclaimed.fetch_add(reclaimed as u64, Ordering::Relaxed);

                    let active = pool.active_len().await;
                    let evicted = pool.evicted_len().await;
                    tracing::debug!(reclaimed, active, evicted, "Idle sweep complete");
                }
            }
        }

        tracing::debug!("Reaper loop exited");
    }

    /// Live counters.
    pub fn stats(&self) -> &ReaperStats {
        &self.stats
    }

    /// True between [`start`](Self::start) and [`shutdown`](Self::shutdown).
    pub fn is_running(&self) -> bool {
        self.handle.is_some() && !self.shutdown.load(Ordering::Relaxed)
    }

    /// Stop sweeping, wait for an in-flight sweep, then clear the pool.
    ///
    /// Returns the number of entries dropped from the pool.
    pub async fn shutdown(&mut self) -> usize {
        tracing::info!("Shutting down reaper");

        self.shutdown.store(true, Ordering::Relaxed);
        self.shutdown_notify.notify_one();

        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::error!(error = ?e, "Reaper task panicked during shutdown");
            }
        }

        let cleared = self.pool.clear_pool(self.config.close_on_shutdown).await;
        tracing::info!(
            cleared,
            sweeps = self.stats.sweeps(),
            reclaimed = self.stats.reclaimed(),
            "Reaper shutdown complete"
        );
        cleared
    }
}
