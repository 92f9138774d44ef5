use serde::{Deserialize, Serialize};

use super::RecommendationFilters;

/// A title the user has watched and rated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatedTitle {
    pub title: String,
    #[serde(default)]
    pub external_id: Option<String>,
    /// User rating, 1-10
    pub rating: f32,
}

impl RatedTitle {
    pub fn new(title: impl Into<String>, external_id: Option<&str>, rating: f32) -> Self {
        Self {
            title: title.into(),
            external_id: external_id.map(str::to_string),
            rating,
        }
    }
}

/// Rated watch history, split by content type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WatchHistorySummary {
    #[serde(default)]
    pub movies: Vec<RatedTitle>,
    #[serde(default)]
    pub tv_series: Vec<RatedTitle>,
}

impl WatchHistorySummary {
    pub fn is_empty(&self) -> bool {
        self.movies.is_empty() && self.tv_series.is_empty()
    }

    /// Renders the textual prompt sent to the generation service
    pub fn to_prompt(&self, filters: &RecommendationFilters) -> String {
        let mut prompt = String::from(
            "Based on the user's rated watch history below, recommend movies and TV series \
             they have not seen yet.\n",
        );

        render_section(&mut prompt, "Movies", &self.movies);
        render_section(&mut prompt, "TV series", &self.tv_series);

        if !filters.is_empty() {
            prompt.push_str("\nOnly recommend titles matching these filters:\n");
            for (field, value) in filters.sorted_entries() {
                prompt.push_str(&format!("- {}: {}\n", field, value));
            }
        }

        prompt.push_str(
            "\nRespond with JSON only, in the shape \
             {\"movies\": [{\"title\", \"imdbID\", \"reason\"}], \
             \"tv_series\": [{\"title\", \"imdbID\", \"reason\"}]}.\n",
        );
        prompt
    }
}

fn render_section(prompt: &mut String, heading: &str, titles: &[RatedTitle]) {
    prompt.push_str(&format!("\n{} ({} rated):\n", heading, titles.len()));
    if titles.is_empty() {
        prompt.push_str("- none yet\n");
        return;
    }

    let mut ranked: Vec<&RatedTitle> = titles.iter().collect();
    ranked.sort_by(|a, b| b.rating.total_cmp(&a.rating));

    for title in ranked {
        match &title.external_id {
            Some(id) => prompt.push_str(&format!(
                "- {} [{}] rated {}/10\n",
                title.title, id, title.rating
            )),
            None => prompt.push_str(&format!("- {} rated {}/10\n", title.title, title.rating)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_lists_highest_rated_first() {
        let history = WatchHistorySummary {
            movies: vec![
                RatedTitle::new("Cats", None, 2.0),
                RatedTitle::new("The Matrix", Some("tt0133093"), 9.5),
            ],
            tv_series: vec![],
        };

        let prompt = history.to_prompt(&RecommendationFilters::new());
        let matrix = prompt.find("The Matrix [tt0133093] rated 9.5/10").unwrap();
        let cats = prompt.find("Cats rated 2/10").unwrap();
        assert!(matrix < cats);
        assert!(prompt.contains("TV series (0 rated):\n- none yet"));
    }

    #[test]
    fn test_prompt_includes_filters_in_field_order() {
        let filters = RecommendationFilters::new()
            .with("language", "ko")
            .with("genre", "thriller");
        let prompt = WatchHistorySummary::default().to_prompt(&filters);

        let genre = prompt.find("- genre: \"thriller\"").unwrap();
        let language = prompt.find("- language: \"ko\"").unwrap();
        assert!(genre < language);
    }

    #[test]
    fn test_history_deserializes_with_missing_sections() {
        let history: WatchHistorySummary =
            serde_json::from_str(r#"{"movies": [{"title": "Up", "rating": 8}]}"#).unwrap();
        assert_eq!(history.movies.len(), 1);
        assert!(history.tv_series.is_empty());
        assert!(!history.is_empty());
    }
}
