use crate::models::{QualityScore, RecommendationSet, Suggestion};

/// Number of suggestions a complete set is expected to carry
pub const EXPECTED_ITEMS: usize = 20;

/// Scores a recommendation set as field completeness times item count, normalized to `[0, 1]`.
///
/// Only feeds logging and the decision whether a background-tier hit is good
/// enough to serve without regenerating; it never fails.
#[derive(Debug, Clone, Copy)]
pub struct QualityAssessor {
    expected_items: usize,
}

impl Default for QualityAssessor {
    fn default() -> Self {
        Self {
            expected_items: EXPECTED_ITEMS,
        }
    }
}

impl QualityAssessor {
    pub fn new(expected_items: usize) -> Self {
        Self {
            expected_items: expected_items.max(1),
        }
    }

    pub fn assess(&self, set: &RecommendationSet) -> QualityScore {
        let items: Vec<&Suggestion> = set.movies.iter().chain(set.tv_series.iter()).collect();
        if items.is_empty() {
            return QualityScore::new(0.0);
        }

        let completeness =
            items.iter().map(|item| completeness(item)).sum::<f64>() / items.len() as f64;
        let coverage = (items.len() as f64 / self.expected_items as f64).min(1.0);

        QualityScore::new(completeness * coverage)
    }
}

/// Title and reason are required, an external id earns the remainder
fn completeness(item: &Suggestion) -> f64 {
    let mut score = 0.0;
    if !item.title.trim().is_empty() {
        score += 0.4;
    }
    if !item.reason.trim().is_empty() {
        score += 0.4;
    }
    if item.external_id.is_some() {
        score += 0.2;
    }
    score
}
