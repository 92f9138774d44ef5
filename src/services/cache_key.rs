use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Display;

use crate::models::RecommendationFilters;

/// Deterministic cache key for one user's recommendations under one filter set
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestKey(String);

impl RequestKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key under which the background tier copy is stored
    pub fn background(&self) -> String {
        format!("{}#background", self.0)
    }
}

impl Display for RequestKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Derives the cache key for `(user_id, filters)`.
///
/// Filter fields are sorted before concatenation so field order never changes
/// the key. The user id and field names are written as JSON strings and values
/// as compact JSON, so separators inside them cannot merge two inputs.
pub fn derive_key(user_id: &str, filters: &RecommendationFilters) -> RequestKey {
    let canonical = filters
        .sorted_entries()
        .into_iter()
        .map(|(field, value)| format!("{}={}", Value::from(field), value))
        .collect::<Vec<_>>()
        .join("&");

    RequestKey(format!("recs:{}|{}", Value::from(user_id), canonical))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_key_ignores_field_order() {
        let a: RecommendationFilters = serde_json::from_value(json!({"a": 1, "b": 2})).unwrap();
        let b: RecommendationFilters = serde_json::from_value(json!({"b": 2, "a": 1})).unwrap();

        assert_eq!(derive_key("user-1", &a), derive_key("user-1", &b));
    }

    #[test]
    fn test_key_format() {
        let filters = RecommendationFilters::new()
            .with("year", 1999)
            .with("genre", "sci-fi");
        let key = derive_key("u42", &filters);
        assert_eq!(key.as_str(), r#"recs:"u42"|"genre"="sci-fi"&"year"=1999"#);
        assert_eq!(
            key.background(),
            r#"recs:"u42"|"genre"="sci-fi"&"year"=1999#background"#
        );
    }

    #[test]
    fn test_key_without_filters() {
        let key = derive_key("u42", &RecommendationFilters::new());
        assert_eq!(format!("{}", key), r#"recs:"u42"|"#);
    }

    #[test]
    fn test_key_differs_by_user_and_value() {
        let filters = RecommendationFilters::new().with("genre", "drama");
        let other = RecommendationFilters::new().with("genre", "comedy");

        assert_ne!(derive_key("u1", &filters), derive_key("u2", &filters));
        assert_ne!(derive_key("u1", &filters), derive_key("u1", &other));
    }

    #[test]
    fn test_key_distinguishes_value_types() {
        let number = RecommendationFilters::new().with("year", 2001);
        let string = RecommendationFilters::new().with("year", Value::String("2001".into()));
        assert_ne!(derive_key("u1", &number), derive_key("u1", &string));
    }

    #[test]
    fn test_separators_in_field_names_do_not_collide() {
        let plain = RecommendationFilters::new().with("a", 1).with("b", 2);
        let packed = RecommendationFilters::new().with("a=1&b", 2);

        assert_ne!(derive_key("u", &plain), derive_key("u", &packed));
    }

    #[test]
    fn test_separators_in_user_id_do_not_collide() {
        let shifted = RecommendationFilters::new().with("b", 2);
        let plain = RecommendationFilters::new().with("a", 1).with("b", 2);

        assert_ne!(
            derive_key("u|\"a\"=1", &shifted),
            derive_key("u", &plain)
        );
        assert_ne!(
            derive_key("u|x", &RecommendationFilters::new()),
            derive_key("u", &RecommendationFilters::new().with("x", Value::Null))
        );
    }
}
