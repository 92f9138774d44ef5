use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, AppResult},
    middleware::request_id::RequestId,
    models::{
        RecommendationFilters, RecommendationRequest, RecommendationSet, WatchHistorySummary,
    },
    routes::AppState,
    services::{
        CacheStats, LoadOptions, LoadResponse, LoadingState, RecommendationSource,
        RecommendationView,
    },
};

#[derive(Debug, Deserialize)]
pub struct LoadBody {
    pub user_id: String,
    #[serde(default)]
    pub filters: RecommendationFilters,
    #[serde(default)]
    pub history: WatchHistorySummary,
    #[serde(default)]
    pub force: bool,
}

impl LoadBody {
    fn into_request(self) -> AppResult<(RecommendationRequest, bool)> {
        let user_id = self.user_id.trim();
        if user_id.is_empty() {
            return Err(AppError::InvalidInput("user_id must not be empty".to_string()));
        }
        let request = RecommendationRequest::new(user_id, self.filters, self.history);
        Ok((request, self.force))
    }
}

#[derive(Debug, Deserialize)]
pub struct CancelBody {
    pub user_id: String,
    #[serde(default)]
    pub filters: RecommendationFilters,
}

#[derive(Debug, Serialize)]
pub struct LoadReply {
    pub recommendations: RecommendationSet,
    pub stale: bool,
    pub loading_state: LoadingState,
    pub source: RecommendationSource,
    pub superseded: bool,
    pub cache_stats: CacheStats,
}

impl LoadReply {
    fn new(response: LoadResponse, cache_stats: CacheStats) -> Self {
        Self {
            recommendations: response.recommendations,
            stale: response.stale,
            loading_state: response.loading_state,
            source: response.source,
            superseded: response.superseded,
            cache_stats,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CancelReply {
    pub cancelled: bool,
}

/// Loads recommendations, serving cache when fresh
pub async fn load(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(body): Json<LoadBody>,
) -> AppResult<Json<LoadReply>> {
    let (request, force) = body.into_request()?;

    tracing::info!(
        request_id = %request_id,
        user_id = %request.user_id,
        filters = request.filters.len(),
        force,
        "Processing recommendation request"
    );

    let options = LoadOptions {
        force,
        background: false,
    };
    let response = state.orchestrator.load(&request, options).await?;

    tracing::info!(
        request_id = %request_id,
        source = ?response.source,
        stale = response.stale,
        "Recommendation request completed"
    );

    Ok(Json(LoadReply::new(response, state.orchestrator.cache_stats())))
}

/// Regenerates regardless of cache state
pub async fn refresh(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(body): Json<LoadBody>,
) -> AppResult<Json<LoadReply>> {
    let (request, _) = body.into_request()?;

    tracing::info!(
        request_id = %request_id,
        user_id = %request.user_id,
        "Processing forced refresh"
    );

    let response = state.orchestrator.refresh(&request).await?;
    Ok(Json(LoadReply::new(response, state.orchestrator.cache_stats())))
}

/// Drops a pending background refresh
pub async fn cancel_refresh(
    State(state): State<AppState>,
    Json(body): Json<CancelBody>,
) -> AppResult<Json<CancelReply>> {
    if body.user_id.trim().is_empty() {
        return Err(AppError::InvalidInput("user_id must not be empty".to_string()));
    }

    let cancelled = state
        .orchestrator
        .cancel_refresh(body.user_id.trim(), &body.filters);
    Ok(Json(CancelReply { cancelled }))
}

/// Current view for one user
pub async fn view(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<Json<RecommendationView>> {
    if user_id.trim().is_empty() {
        return Err(AppError::InvalidInput("user_id must not be empty".to_string()));
    }
    Ok(Json(state.orchestrator.view(user_id.trim())))
}

pub async fn cache_stats(State(state): State<AppState>) -> Json<CacheStats> {
    Json(state.orchestrator.cache_stats())
}
