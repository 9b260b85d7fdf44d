// crates/tvws-paws/src/scheduler.rs
// ============================================================================
// Module: Refresh Scheduler
// Description: One recurring refresh task per cached dataset.
// Purpose: Keep incumbent snapshots current without blocking request tasks.
// Dependencies: tvws-core, tokio
// ============================================================================

//! ## Overview
//! [`RefreshScheduler::spawn`] starts one tokio task per dataset key. Each
//! task reads its interval from the cache's [`tvws_core::RefreshIntervals`]
//! at every fire, so edited intervals apply on the next tick. Refresh work
//! runs on the blocking pool under a timeout; a tick that lands while a
//! refresh is still running is absorbed by the cache's refresh gate.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tvws_core::CacheEvent;
use tvws_core::CacheEventKind;
use tvws_core::CacheEventSink;
use tvws_core::CacheKey;
use tvws_core::CacheManager;
use tvws_core::NoopCacheEventSink;
use tvws_core::RefreshOutcome;

// ============================================================================
// SECTION: Scheduler
// ============================================================================

/// Spawns per-dataset refresh timers.
#[derive(Clone)]
pub struct RefreshScheduler {
    /// Cache refreshed by the timers.
    cache: Arc<CacheManager>,
    /// Upper bound on one refresh as seen by the timer task.
    timeout: Duration,
    /// Sink for timer-level timeouts.
    events: Arc<dyn CacheEventSink>,
}

impl RefreshScheduler {
    /// Creates a scheduler over a cache.
    #[must_use]
    pub fn new(cache: Arc<CacheManager>, timeout: Duration) -> Self {
        Self { cache, timeout, events: Arc::new(NoopCacheEventSink) }
    }

    /// Replaces the event sink used for timer-level timeouts.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn CacheEventSink>) -> Self {
        self.events = events;
        self
    }

    /// Starts one task per dataset. Must be called inside a tokio runtime.
    #[must_use]
    pub fn spawn(&self) -> SchedulerHandle {
        let (shutdown, receiver) = watch::channel(false);
        let tasks = self
            .cache
            .keys()
            .into_iter()
            .map(|key| {
                let scheduler = self.clone();
                let receiver = receiver.clone();
                tokio::spawn(async move { scheduler.run_dataset(key, receiver).await })
            })
            .collect();
        SchedulerHandle { shutdown, tasks }
    }

    /// Timer loop for one dataset.
    async fn run_dataset(self, key: CacheKey, mut shutdown: watch::Receiver<bool>) {
        loop {
            let interval = self.cache.interval(&key);
            tokio::select! {
                () = tokio::time::sleep(interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return;
                    }
                    continue;
                }
            }
            // The cache emits an event for every failed outcome it returns.
            let _outcome = self.refresh_once(key).await;
        }
    }

    /// Runs one refresh on the blocking pool under the timeout.
    ///
    /// Returns `None` when the refresh timed out, its task failed, or the key
    /// is unknown.
    pub async fn refresh_once(&self, key: CacheKey) -> Option<RefreshOutcome> {
        let cache = Arc::clone(&self.cache);
        let task = tokio::task::spawn_blocking(move || cache.refresh(key));
        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(Ok(outcome))) => Some(outcome),
            Ok(Ok(Err(err))) => {
                self.record(key, CacheEventKind::RefreshFailed, err.to_string());
                None
            }
            Ok(Err(err)) => {
                self.record(key, CacheEventKind::RefreshFailed, format!("refresh task failed: {err}"));
                None
            }
            Err(_) => {
                self.record(
                    key,
                    CacheEventKind::Timeout,
                    format!("refresh exceeded {} ms", self.timeout.as_millis()),
                );
                None
            }
        }
    }

    /// Emits a scheduler event.
    fn record(&self, key: CacheKey, kind: CacheEventKind, message: String) {
        let event = CacheEvent::new(kind, self.cache.now(), key.authority(), key.dataset_label())
            .with_message(message);
        self.events.record(&event);
    }
}

// ============================================================================
// SECTION: Handle
// ============================================================================

/// Running scheduler tasks.
#[derive(Debug)]
pub struct SchedulerHandle {
    /// Shutdown signal shared by every task.
    shutdown: watch::Sender<bool>,
    /// Per-dataset tasks.
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Number of dataset timers.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Signals every timer to stop and waits for them.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
    }
}
