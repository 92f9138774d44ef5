use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::models::RecommendationRequest;
use crate::services::cache_key::RequestKey;

/// Why a refresh was scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshTrigger {
    /// A hot hit was served but had grown old
    CacheRefresh,
    /// Pre-warming the background tier after a foreground generation
    Periodic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshPriority {
    Low,
    High,
}

#[derive(Debug, Clone, Copy)]
pub struct ScheduleOptions {
    pub delay: Duration,
    pub trigger: RefreshTrigger,
    pub priority: RefreshPriority,
}

/// A deferred regeneration waiting in the queue
#[derive(Debug, Clone)]
pub struct ScheduledRefresh {
    pub key: RequestKey,
    pub context: RecommendationRequest,
    pub due_at: Instant,
    pub trigger: RefreshTrigger,
    pub priority: RefreshPriority,
}

/// Runs due refreshes on behalf of the scheduler
#[async_trait::async_trait]
pub trait RefreshHandler: Send + Sync {
    /// Whether a generation for `key` is already running; due refreshes for
    /// such keys are dropped rather than queued behind it
    fn is_in_flight(&self, key: &RequestKey) -> bool;

    async fn run_refresh(&self, refresh: ScheduledRefresh);
}

/// Queue of deferred, low-priority regenerations.
///
/// Holds at most one pending refresh per key: scheduling a key again replaces
/// its due time and trigger. Due items are drained by a single task started
/// with [`spawn`](Self::spawn) and run one at a time.
#[derive(Clone, Default)]
pub struct BackgroundScheduler {
    shared: Arc<SchedulerShared>,
}

#[derive(Default)]
struct SchedulerShared {
    queue: Mutex<HashMap<RequestKey, ScheduledRefresh>>,
    wake: Notify,
    scheduled: AtomicU64,
    dropped: AtomicU64,
    completed: AtomicU64,
}

/// Stops the scheduler loop
pub struct SchedulerHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Stops the loop once the refresh currently running (if any) finishes.
    /// Pending refreshes are discarded.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            if let Err(e) = join.await {
                tracing::error!(error = %e, "Scheduler loop ended abnormally");
            }
        }
        tracing::info!("Background scheduler stopped");
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        if let Some(join) = self.join.take() {
            join.abort();
        }
    }
}

impl BackgroundScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a refresh for `key`, replacing any refresh already pending for it
    pub fn schedule(
        &self,
        key: &RequestKey,
        context: RecommendationRequest,
        options: ScheduleOptions,
    ) {
        let refresh = ScheduledRefresh {
            key: key.clone(),
            context,
            due_at: Instant::now() + options.delay,
            trigger: options.trigger,
            priority: options.priority,
        };

        let replaced = self.shared.lock_queue().insert(key.clone(), refresh);
        self.shared.scheduled.fetch_add(1, Ordering::Relaxed);

        match replaced {
            Some(previous) => tracing::debug!(
                key = %key,
                trigger = ?options.trigger,
                replaced_trigger = ?previous.trigger,
                delay_secs = options.delay.as_secs(),
                "Replaced pending background refresh"
            ),
            None => tracing::debug!(
                key = %key,
                trigger = ?options.trigger,
                delay_secs = options.delay.as_secs(),
                "Scheduled background refresh"
            ),
        }

        self.shared.wake.notify_one();
    }

    /// Removes the pending refresh for `key`; returns whether one existed
    pub fn cancel(&self, key: &RequestKey) -> bool {
        let removed = self.shared.lock_queue().remove(key).is_some();
        if removed {
            tracing::debug!(key = %key, "Cancelled background refresh");
            self.shared.wake.notify_one();
        }
        removed
    }

    pub fn pending(&self, key: &RequestKey) -> Option<ScheduledRefresh> {
        self.shared.lock_queue().get(key).cloned()
    }

    pub fn pending_len(&self) -> usize {
        self.shared.lock_queue().len()
    }

    /// Schedule calls accepted so far, replacements included
    pub fn scheduled_count(&self) -> u64 {
        self.shared.scheduled.load(Ordering::Relaxed)
    }

    /// Due refreshes skipped because a generation for the key was running
    pub fn dropped_count(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    pub fn completed_count(&self) -> u64 {
        self.shared.completed.load(Ordering::Relaxed)
    }

    /// Starts the loop that drains due refreshes into `handler`
    pub fn spawn(&self, handler: Arc<dyn RefreshHandler>) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let shared = self.shared.clone();

        let join = tokio::spawn(async move {
            Self::run_loop(shared, handler, shutdown_rx).await;
        });

        SchedulerHandle {
            shutdown_tx: Some(shutdown_tx),
            join: Some(join),
        }
    }

    async fn run_loop(
        shared: Arc<SchedulerShared>,
        handler: Arc<dyn RefreshHandler>,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        tracing::info!("Background scheduler started");

        loop {
            while let Some(refresh) = shared.take_due(Instant::now()) {
                if handler.is_in_flight(&refresh.key) {
                    shared.dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::info!(
                        key = %refresh.key,
                        trigger = ?refresh.trigger,
                        "Dropped background refresh, generation already in flight"
                    );
                    continue;
                }

                tracing::debug!(
                    key = %refresh.key,
                    trigger = ?refresh.trigger,
                    "Running background refresh"
                );
                handler.run_refresh(refresh).await;
                shared.completed.fetch_add(1, Ordering::Relaxed);

                if shutdown_requested(&mut shutdown_rx) {
                    return;
                }
            }

            let next_due = shared.next_due();
            let until_due = async move {
                match next_due {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = &mut shutdown_rx => return,
                _ = shared.wake.notified() => {}
                _ = until_due => {}
            }
        }
    }
}

fn shutdown_requested(shutdown_rx: &mut oneshot::Receiver<()>) -> bool {
    !matches!(shutdown_rx.try_recv(), Err(oneshot::error::TryRecvError::Empty))
}

impl SchedulerShared {
    fn lock_queue(&self) -> MutexGuard<'_, HashMap<RequestKey, ScheduledRefresh>> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Removes and returns the most urgent due refresh: High before Low, then earliest
    fn take_due(&self, now: Instant) -> Option<ScheduledRefresh> {
        let mut queue = self.lock_queue();
        let key = queue
            .values()
            .filter(|refresh| refresh.due_at <= now)
            .min_by(|a, b| b.priority.cmp(&a.priority).then(a.due_at.cmp(&b.due_at)))
            .map(|refresh| refresh.key.clone())?;
        queue.remove(&key)
    }

    fn next_due(&self) -> Option<Instant> {
        self.lock_queue().values().map(|refresh| refresh.due_at).min()
    }
}
