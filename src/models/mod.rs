use serde::{Deserialize, Serialize};

pub mod filters;
pub mod recommendation;
pub mod watch_history;

pub use filters::RecommendationFilters;
pub use recommendation::{QualityScore, RecommendationSet, Suggestion};
pub use watch_history::{RatedTitle, WatchHistorySummary};

/// Everything the engine needs to produce recommendations for one user.
///
/// Also carried as the context of a scheduled background refresh, so the
/// refresh can regenerate without calling back into the UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationRequest {
    pub user_id: String,
    #[serde(default)]
    pub filters: RecommendationFilters,
    #[serde(default)]
    pub history: WatchHistorySummary,
}

impl RecommendationRequest {
    pub fn new(
        user_id: impl Into<String>,
        filters: RecommendationFilters,
        history: WatchHistorySummary,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            filters,
            history,
        }
    }
}
