#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::time::Instant;

use reelcast::clock::{Clock, TokioClock};
use reelcast::config::EngineConfig;
use reelcast::db::InMemoryBackingStore;
use reelcast::error::GenerationError;
use reelcast::models::{
    RatedTitle, RecommendationFilters, RecommendationRequest, WatchHistorySummary,
};
use reelcast::services::providers::GenerationService;
use reelcast::services::{GenerationClient, Orchestrator, RetryPolicy, Throttle, TieredCacheStore};

/// Response body with `movies` + `tv_series` complete suggestions
pub fn recommendation_body(movies: usize, tv_series: usize) -> String {
    let item = |i: usize| {
        json!({
            "title": format!("Title {}", i),
            "imdbID": format!("tt{:07}", i),
            "reason": "Close to what you rated highly",
        })
    };
    json!({
        "movies": (0..movies).map(item).collect::<Vec<_>>(),
        "tv_series": (movies..movies + tv_series).map(item).collect::<Vec<_>>(),
    })
    .to_string()
}

/// Generation service that replays scripted outcomes and records every call
pub struct FakeGenerationService {
    script: Mutex<VecDeque<Result<String, GenerationError>>>,
    fallback: Result<String, GenerationError>,
    latency: Duration,
    calls: Mutex<Vec<Instant>>,
    prompts: Mutex<Vec<String>>,
}

impl FakeGenerationService {
    pub fn succeeding() -> Self {
        Self::with_fallback(Ok(recommendation_body(10, 10)))
    }

    pub fn failing(error: GenerationError) -> Self {
        Self::with_fallback(Err(error))
    }

    fn with_fallback(fallback: Result<String, GenerationError>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            latency: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Outcome of the next unscripted call, after which the fallback applies
    pub fn then(self, outcome: Result<String, GenerationError>) -> Self {
        self.script.lock().unwrap().push_back(outcome);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().clone()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationService for FakeGenerationService {
    async fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
        self.calls.lock().unwrap().push(Instant::now());
        self.prompts.lock().unwrap().push(prompt.to_string());

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| self.fallback.clone())
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Fully wired engine over an in-memory backing store
pub struct TestEngine {
    pub orchestrator: Orchestrator,
    pub service: Arc<FakeGenerationService>,
    pub backing: Arc<InMemoryBackingStore>,
    pub clock: Arc<dyn Clock>,
}

impl TestEngine {
    pub fn new(service: FakeGenerationService) -> Self {
        Self::with_backing(service, Arc::new(InMemoryBackingStore::new()))
    }

    /// Engine sharing `backing` with a previous one, as after a restart
    pub fn with_backing(service: FakeGenerationService, backing: Arc<InMemoryBackingStore>) -> Self {
        let config = EngineConfig::default();
        let service = Arc::new(service);
        let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());

        let store = Arc::new(TieredCacheStore::new(backing.clone(), clock.clone()));
        let client = GenerationClient::new(
            service.clone(),
            Arc::new(Throttle::new(config.min_request_interval)),
            RetryPolicy::new(config.max_retries, config.retry_base_delay),
        );
        let orchestrator = Orchestrator::new(config, store, client, clock.clone());

        Self {
            orchestrator,
            service,
            backing,
            clock,
        }
    }
}

/// Five rated movies and no series
pub fn movie_history() -> WatchHistorySummary {
    WatchHistorySummary {
        movies: vec![
            RatedTitle::new("Heat", Some("tt0113277"), 9.0),
            RatedTitle::new("Arrival", Some("tt2543164"), 8.5),
            RatedTitle::new("Sicario", Some("tt3397884"), 8.0),
            RatedTitle::new("Drive", None, 7.5),
            RatedTitle::new("Prisoners", Some("tt1392214"), 7.0),
        ],
        tv_series: vec![],
    }
}

pub fn request(user_id: &str) -> RecommendationRequest {
    RecommendationRequest::new(
        user_id,
        RecommendationFilters::new().with("genre", "thriller"),
        movie_history(),
    )
}
