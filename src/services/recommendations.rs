use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::GenerationError;
use crate::models::{RecommendationFilters, RecommendationRequest, RecommendationSet};
use crate::services::cache_key::{derive_key, RequestKey};
use crate::services::generation::GenerationClient;
use crate::services::quality::QualityAssessor;
use crate::services::scheduler::{
    BackgroundScheduler, RefreshHandler, RefreshPriority, RefreshTrigger, ScheduleOptions,
    ScheduledRefresh, SchedulerHandle,
};
use crate::services::tiered_cache::{CacheEntry, CacheTier, TieredCacheStore};

/// Where a load currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadingState {
    Idle,
    Loading,
    CacheHit,
    BackgroundCacheHit,
    ApiGeneration,
    Complete,
    Error,
}

/// What produced the recommendations a load returned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationSource {
    HotCache,
    BackgroundCache,
    Generated,
    /// Expired cache served because generation failed
    StaleFallback,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// Skip cache reads and always generate
    pub force: bool,
    /// Scheduler-initiated: result goes to the background tier
    pub background: bool,
}

/// Result of a successful load
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadResponse {
    pub recommendations: RecommendationSet,
    /// True when the set is an expired entry served after a failed generation
    pub stale: bool,
    pub loading_state: LoadingState,
    pub source: RecommendationSource,
    /// A newer load for the same user started before this one finished; the
    /// per-user view was left untouched
    pub superseded: bool,
}

/// Engine counters exposed to the UI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hot_hits: u64,
    pub background_hits: u64,
    pub misses: u64,
    pub generations: u64,
    pub stale_served: u64,
    pub errors: u64,
    pub outbound_requests: u64,
    pub in_flight_attached: u64,
    pub refreshes_scheduled: u64,
    pub refreshes_dropped: u64,
    pub refreshes_pending: u64,
}

/// What the UI renders for one user
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendationView {
    pub recommendations: Option<RecommendationSet>,
    pub stale: bool,
    pub loading_state: LoadingState,
    pub cache_stats: CacheStats,
}

#[derive(Default)]
struct Counters {
    hot_hits: AtomicU64,
    background_hits: AtomicU64,
    misses: AtomicU64,
    generations: AtomicU64,
    stale_served: AtomicU64,
    errors: AtomicU64,
}

/// Latest foreground load per user
struct UserView {
    ticket: u64,
    key: RequestKey,
    state: LoadingState,
    recommendations: Option<RecommendationSet>,
    stale: bool,
}

/// Public facade of the recommendation engine.
///
/// Serves hot-tier hits, falls back to the background tier, generates on a
/// miss and degrades to stale cache when generation fails. Owns the
/// background scheduler loop for its lifetime.
pub struct Orchestrator {
    inner: Arc<OrchestratorInner>,
    scheduler_handle: Mutex<Option<SchedulerHandle>>,
}

struct OrchestratorInner {
    config: EngineConfig,
    store: Arc<TieredCacheStore>,
    client: GenerationClient,
    scheduler: BackgroundScheduler,
    assessor: QualityAssessor,
    clock: Arc<dyn Clock>,
    counters: Counters,
    views: Mutex<HashMap<String, UserView>>,
    next_ticket: AtomicU64,
}

impl Orchestrator {
    /// Builds the engine and starts its background scheduler
    pub fn new(
        config: EngineConfig,
        store: Arc<TieredCacheStore>,
        client: GenerationClient,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let scheduler = BackgroundScheduler::new();
        let inner = Arc::new(OrchestratorInner {
            config,
            store,
            client,
            scheduler: scheduler.clone(),
            assessor: QualityAssessor::default(),
            clock,
            counters: Counters::default(),
            views: Mutex::new(HashMap::new()),
            next_ticket: AtomicU64::new(1),
        });

        // The loop task keeps `inner` alive; dropping the handle aborts it.
        let handle = scheduler.spawn(inner.clone());

        Self {
            inner,
            scheduler_handle: Mutex::new(Some(handle)),
        }
    }

    /// Loads recommendations, from cache when possible
    pub async fn load(
        &self,
        request: &RecommendationRequest,
        options: LoadOptions,
    ) -> Result<LoadResponse, GenerationError> {
        self.inner.load(request, options).await
    }

    /// Regenerates regardless of cache state
    pub async fn refresh(
        &self,
        request: &RecommendationRequest,
    ) -> Result<LoadResponse, GenerationError> {
        let options = LoadOptions {
            force: true,
            background: false,
        };
        self.inner.load(request, options).await
    }

    /// Current state and recommendations for `user_id`
    pub fn view(&self, user_id: &str) -> RecommendationView {
        let cache_stats = self.cache_stats();
        let views = self.inner.lock_views();

        match views.get(user_id) {
            Some(view) => RecommendationView {
                recommendations: view.recommendations.clone(),
                stale: view.stale,
                loading_state: view.state,
                cache_stats,
            },
            None => RecommendationView {
                recommendations: None,
                stale: false,
                loading_state: LoadingState::Idle,
                cache_stats,
            },
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache_stats()
    }

    /// Drops the pending background refresh for `(user_id, filters)`
    pub fn cancel_refresh(&self, user_id: &str, filters: &RecommendationFilters) -> bool {
        self.inner.scheduler.cancel(&derive_key(user_id, filters))
    }

    pub fn scheduler(&self) -> &BackgroundScheduler {
        &self.inner.scheduler
    }

    pub fn store(&self) -> &Arc<TieredCacheStore> {
        &self.inner.store
    }

    pub fn client(&self) -> &GenerationClient {
        &self.inner.client
    }

    /// Stops the background scheduler loop
    pub async fn shutdown(&self) {
        let handle = self
            .scheduler_handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            handle.shutdown().await;
        }
    }
}

impl OrchestratorInner {
    async fn load(
        &self,
        request: &RecommendationRequest,
        options: LoadOptions,
    ) -> Result<LoadResponse, GenerationError> {
        let key = derive_key(&request.user_id, &request.filters);
        let ticket = if options.background {
            None
        } else {
            Some(self.begin(&request.user_id, &key))
        };

        if !options.force {
            if let Some(entry) = self.store.get(&key, CacheTier::Hot).await {
                self.counters.hot_hits.fetch_add(1, Ordering::Relaxed);

                let age = entry.age(self.clock.now());
                if age > self.config.stale_after && self.needs_refresh(&key, &entry).await {
                    tracing::info!(
                        key = %key,
                        age_secs = age.as_secs(),
                        "Serving aging cache entry, scheduling background refresh"
                    );
                    self.scheduler.schedule(
                        &key,
                        request.clone(),
                        ScheduleOptions {
                            delay: self.config.stale_refresh_delay,
                            trigger: RefreshTrigger::CacheRefresh,
                            priority: RefreshPriority::Low,
                        },
                    );
                }

                return Ok(self.finish(
                    &request.user_id,
                    ticket,
                    entry.payload,
                    LoadingState::CacheHit,
                    RecommendationSource::HotCache,
                ));
            }

            if let Some(entry) = self.store.get(&key, CacheTier::Background).await {
                let quality = entry.payload.quality.value();
                if quality >= self.config.min_background_quality {
                    self.counters.background_hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(self.finish(
                        &request.user_id,
                        ticket,
                        entry.payload,
                        LoadingState::BackgroundCacheHit,
                        RecommendationSource::BackgroundCache,
                    ));
                }
                tracing::debug!(
                    key = %key,
                    quality,
                    threshold = self.config.min_background_quality,
                    "Background entry below quality threshold, regenerating"
                );
            }

            self.counters.misses.fetch_add(1, Ordering::Relaxed);
        }

        self.transition(&request.user_id, ticket, LoadingState::ApiGeneration);
        let started_at = self.clock.now();

        match self
            .client
            .generate(&key, &request.history, &request.filters)
            .await
        {
            Ok(mut set) => {
                set.quality = self.assessor.assess(&set);
                set.source_filters = request.filters.clone();
                self.counters.generations.fetch_add(1, Ordering::Relaxed);

                let (tier, ttl) = if options.background {
                    (CacheTier::Background, self.config.background_ttl)
                } else {
                    (CacheTier::Hot, self.config.hot_ttl)
                };
                self.store
                    .set_at(&key, set.clone(), tier, ttl, started_at)
                    .await;

                tracing::info!(
                    key = %key,
                    tier = %tier,
                    quality = set.quality.value(),
                    items = set.total_items(),
                    "Recommendations generated"
                );

                if !options.background {
                    self.scheduler.schedule(
                        &key,
                        request.clone(),
                        ScheduleOptions {
                            delay: self.config.periodic_refresh,
                            trigger: RefreshTrigger::Periodic,
                            priority: RefreshPriority::Low,
                        },
                    );
                }

                Ok(self.finish(
                    &request.user_id,
                    ticket,
                    set,
                    LoadingState::Complete,
                    RecommendationSource::Generated,
                ))
            }
            Err(error) if options.background => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    key = %key,
                    kind = %error.kind,
                    "Background generation failed, keeping existing cache"
                );
                Err(error)
            }
            Err(error) => match self.store.get_stale_fallback(&key).await {
                Some(entry) => {
                    self.counters.stale_served.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        key = %key,
                        kind = %error.kind,
                        tier = %entry.tier,
                        created_at = %entry.created_at,
                        "Generation failed, serving stale cache"
                    );
                    Ok(self.finish(
                        &request.user_id,
                        ticket,
                        entry.payload,
                        LoadingState::Complete,
                        RecommendationSource::StaleFallback,
                    ))
                }
                None => {
                    self.counters.errors.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(
                        key = %key,
                        kind = %error.kind,
                        "Generation failed and no cached recommendations exist"
                    );
                    self.transition(&request.user_id, ticket, LoadingState::Error);
                    Err(error)
                }
            },
        }
    }

    /// Whether an aging hot entry still needs a background refresh. Not when
    /// one is already queued, or when the background tier already holds a
    /// fresh copy generated after `hot`.
    async fn needs_refresh(&self, key: &RequestKey, hot: &CacheEntry) -> bool {
        if let Some(pending) = self.scheduler.pending(key) {
            if pending.trigger == RefreshTrigger::CacheRefresh {
                return false;
            }
        }

        match self.store.get(key, CacheTier::Background).await {
            Some(background) if background.created_at > hot.created_at => {
                tracing::debug!(
                    key = %key,
                    refreshed_at = %background.created_at,
                    "Background tier already refreshed, not scheduling"
                );
                false
            }
            _ => true,
        }
    }

    fn lock_views(&self) -> MutexGuard<'_, HashMap<String, UserView>> {
        self.views.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers a new foreground load as the latest for its user
    fn begin(&self, user_id: &str, key: &RequestKey) -> u64 {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let mut views = self.lock_views();

        let view = views.entry(user_id.to_string()).or_insert_with(|| UserView {
            ticket,
            key: key.clone(),
            state: LoadingState::Idle,
            recommendations: None,
            stale: false,
        });
        view.ticket = ticket;
        view.key = key.clone();
        view.state = LoadingState::Loading;
        ticket
    }

    /// Updates the view state if `ticket` is still the user's latest load
    fn transition(&self, user_id: &str, ticket: Option<u64>, state: LoadingState) {
        let Some(ticket) = ticket else {
            return;
        };
        if let Some(view) = self.lock_views().get_mut(user_id) {
            if view.ticket == ticket {
                view.state = state;
            }
        }
    }

    fn finish(
        &self,
        user_id: &str,
        ticket: Option<u64>,
        recommendations: RecommendationSet,
        state: LoadingState,
        source: RecommendationSource,
    ) -> LoadResponse {
        let stale = source == RecommendationSource::StaleFallback;
        let mut superseded = false;

        if let Some(ticket) = ticket {
            let mut views = self.lock_views();
            match views.get_mut(user_id) {
                Some(view) if view.ticket == ticket => {
                    view.state = state;
                    view.recommendations = Some(recommendations.clone());
                    view.stale = stale;
                }
                Some(view) => {
                    superseded = true;
                    tracing::debug!(
                        user_id = %user_id,
                        latest_key = %view.key,
                        "Discarding result of superseded load"
                    );
                }
                None => superseded = true,
            }
        }

        LoadResponse {
            recommendations,
            stale,
            loading_state: state,
            source,
            superseded,
        }
    }

    fn cache_stats(&self) -> CacheStats {
        CacheStats {
            hot_hits: self.counters.hot_hits.load(Ordering::Relaxed),
            background_hits: self.counters.background_hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            generations: self.counters.generations.load(Ordering::Relaxed),
            stale_served: self.counters.stale_served.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
            outbound_requests: self.client.dispatch_count(),
            in_flight_attached: self.client.attached_count(),
            refreshes_scheduled: self.scheduler.scheduled_count(),
            refreshes_dropped: self.scheduler.dropped_count(),
            refreshes_pending: self.scheduler.pending_len() as u64,
        }
    }
}

#[async_trait::async_trait]
impl RefreshHandler for OrchestratorInner {
    fn is_in_flight(&self, key: &RequestKey) -> bool {
        self.client.is_in_flight(key)
    }

    async fn run_refresh(&self, refresh: ScheduledRefresh) {
        let options = LoadOptions {
            force: true,
            background: true,
        };

        match self.load(&refresh.context, options).await {
            Ok(response) => tracing::info!(
                key = %refresh.key,
                trigger = ?refresh.trigger,
                source = ?response.source,
                "Background refresh finished"
            ),
            Err(e) => tracing::warn!(
                key = %refresh.key,
                trigger = ?refresh.trigger,
                kind = %e.kind,
                "Background refresh failed"
            ),
        }
    }
}
