use serde::{Deserialize, Serialize};

use super::RecommendationFilters;

/// A single recommended title
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub title: String,
    /// IMDB ID when the generation service supplied one (e.g., "tt0133093")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    pub reason: String,
}

/// Bounded heuristic score of a recommendation set, always within `[0, 1]`
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QualityScore(f64);

impl QualityScore {
    pub fn new(value: f64) -> Self {
        if value.is_nan() {
            return Self(0.0);
        }
        Self(value.clamp(0.0, 1.0))
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

/// Ranked movies and TV series produced by one generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationSet {
    pub movies: Vec<Suggestion>,
    pub tv_series: Vec<Suggestion>,
    pub generation_time_ms: u64,
    pub quality: QualityScore,
    #[serde(default)]
    pub source_filters: RecommendationFilters,
}

impl RecommendationSet {
    pub fn new(movies: Vec<Suggestion>, tv_series: Vec<Suggestion>) -> Self {
        Self {
            movies,
            tv_series,
            generation_time_ms: 0,
            quality: QualityScore::default(),
            source_filters: RecommendationFilters::default(),
        }
    }

    pub fn total_items(&self) -> usize {
        self.movies.len() + self.tv_series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total_items() == 0
    }
}
