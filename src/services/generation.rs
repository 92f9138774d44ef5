use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::time::Instant;

use crate::error::GenerationError;
use crate::models::{RecommendationFilters, RecommendationSet, WatchHistorySummary};
use crate::services::cache_key::RequestKey;
use crate::services::providers::GenerationService;
use crate::services::response::parse_recommendations;
use crate::services::retry::{RetryPolicy, RetryState};
use crate::services::throttle::Throttle;

pub type GenerationResult = Result<RecommendationSet, GenerationError>;

/// Handle every caller for the same key awaits
type SharedGeneration = Shared<BoxFuture<'static, GenerationResult>>;

/// Calls the generation service on behalf of the engine.
///
/// Per call: joins an in-flight generation for the same key if there is one,
/// otherwise waits for the shared throttle, dispatches, retries retryable
/// failures with exponential backoff and validates the response body.
#[derive(Clone)]
pub struct GenerationClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    service: Arc<dyn GenerationService>,
    throttle: Arc<Throttle>,
    retry: RetryPolicy,
    in_flight: Mutex<HashMap<RequestKey, SharedGeneration>>,
    dispatches: AtomicU64,
    attached: AtomicU64,
}

impl GenerationClient {
    pub fn new(
        service: Arc<dyn GenerationService>,
        throttle: Arc<Throttle>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                service,
                throttle,
                retry,
                in_flight: Mutex::new(HashMap::new()),
                dispatches: AtomicU64::new(0),
                attached: AtomicU64::new(0),
            }),
        }
    }

    /// Generates recommendations for `key` from the user's watch history.
    ///
    /// The outbound work runs in its own task: if every caller goes away the
    /// generation still completes and leaves the in-flight registry.
    pub async fn generate(
        &self,
        key: &RequestKey,
        history: &WatchHistorySummary,
        filters: &RecommendationFilters,
    ) -> GenerationResult {
        let generation = {
            let mut in_flight = self.inner.lock_in_flight();

            if let Some(existing) = in_flight.get(key) {
                self.inner.attached.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key = %key, "Attaching to in-flight generation");
                existing.clone()
            } else {
                let inner = self.inner.clone();
                let task_key = key.clone();
                let prompt = history.to_prompt(filters);

                let task = tokio::spawn(async move {
                    let result = inner.dispatch_with_retry(&task_key, &prompt).await;
                    inner.lock_in_flight().remove(&task_key);
                    result
                });

                let generation = async move {
                    task.await.unwrap_or_else(|e| {
                        Err(GenerationError::service_unavailable(format!(
                            "generation task failed: {}",
                            e
                        )))
                    })
                }
                .boxed()
                .shared();

                in_flight.insert(key.clone(), generation.clone());
                generation
            }
        };

        generation.await
    }

    /// Whether a generation for `key` is currently outstanding
    pub fn is_in_flight(&self, key: &RequestKey) -> bool {
        self.inner.lock_in_flight().contains_key(key)
    }

    /// Outbound requests issued so far, retries included
    pub fn dispatch_count(&self) -> u64 {
        self.inner.dispatches.load(Ordering::Relaxed)
    }

    /// Callers that joined an existing generation instead of starting one
    pub fn attached_count(&self) -> u64 {
        self.inner.attached.load(Ordering::Relaxed)
    }
}

impl ClientInner {
    fn lock_in_flight(&self) -> MutexGuard<'_, HashMap<RequestKey, SharedGeneration>> {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn dispatch_with_retry(&self, key: &RequestKey, prompt: &str) -> GenerationResult {
        let mut state = RetryState::new(self.retry);

        loop {
            let attempt = state.begin_attempt();
            self.throttle.acquire().await;
            self.dispatches.fetch_add(1, Ordering::Relaxed);

            let started = Instant::now();
            let outcome = self
                .service
                .complete(prompt)
                .await
                .and_then(|body| parse_recommendations(&body));

            let error = match outcome {
                Ok(mut set) => {
                    set.generation_time_ms = started.elapsed().as_millis() as u64;
                    tracing::info!(
                        key = %key,
                        attempt,
                        movies = set.movies.len(),
                        tv_series = set.tv_series.len(),
                        elapsed_ms = set.generation_time_ms,
                        provider = self.service.name(),
                        "Generation succeeded"
                    );
                    return Ok(set);
                }
                Err(e) => e,
            };

            if !error.is_retryable() {
                tracing::warn!(key = %key, attempt, kind = %error.kind, error = %error, "Generation failed, not retrying");
                return Err(error);
            }

            match state.next_delay() {
                Some(delay) => {
                    tracing::warn!(
                        key = %key,
                        attempt,
                        max_attempts = state.max_attempts(),
                        kind = %error.kind,
                        delay_secs = delay.as_secs_f64(),
                        "Generation failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    tracing::error!(key = %key, attempt, kind = %error.kind, error = %error, "Generation failed after all retries");
                    return Err(error);
                }
            }
        }
    }
}
