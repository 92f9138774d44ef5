//! Schema-checked parsing of generation service responses
//!
//! The service is asked for `{"movies": [...], "tv_series": [...]}` but
//! generative output is not always well formed. Parsing is lenient per field:
//! a missing or malformed array becomes empty instead of failing the whole
//! response, and malformed items inside an array are skipped. Only a body with
//! no usable array at all is reported as `MalformedResponse`.
use serde_json::{Map, Value};

use crate::error::GenerationError;
use crate::models::{RecommendationSet, Suggestion};

/// Envelope fields some gateways wrap the generated text in
const TEXT_ENVELOPE_FIELDS: [&str; 3] = ["output", "text", "content"];

/// Parses a raw response body into a recommendation set
pub fn parse_recommendations(body: &str) -> Result<RecommendationSet, GenerationError> {
    let object = parse_object(body)?;
    let object = unwrap_envelope(object)?;

    let movies = parse_suggestions(&object, &["movies"]);
    let tv_series = parse_suggestions(&object, &["tv_series", "tvSeries"]);

    if movies.is_none() && tv_series.is_none() {
        return Err(GenerationError::malformed(
            "response contains neither a movies nor a tv_series array",
        ));
    }

    if movies.is_none() || tv_series.is_none() {
        tracing::warn!(
            movies_present = movies.is_some(),
            tv_series_present = tv_series.is_some(),
            "Partial generation response, defaulting missing array to empty"
        );
    }

    Ok(RecommendationSet::new(
        movies.unwrap_or_default(),
        tv_series.unwrap_or_default(),
    ))
}

/// Top-level JSON object of `body`, tolerating prose or code fences around it
fn parse_object(body: &str) -> Result<Map<String, Value>, GenerationError> {
    let trimmed = body.trim();

    let value = match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => value,
        Err(_) => {
            let embedded = match (trimmed.find('{'), trimmed.rfind('}')) {
                (Some(start), Some(end)) if start < end => &trimmed[start..=end],
                _ => {
                    return Err(GenerationError::malformed(
                        "response body does not contain a JSON object",
                    ))
                }
            };
            serde_json::from_str::<Value>(embedded).map_err(|e| {
                GenerationError::malformed(format!("response body is not valid JSON: {}", e))
            })?
        }
    };

    match value {
        Value::Object(object) => Ok(object),
        other => Err(GenerationError::malformed(format!(
            "expected a JSON object, got {}",
            json_type(&other)
        ))),
    }
}

/// Unwraps `{"output": "<generated text>"}` style envelopes, one level deep
fn unwrap_envelope(object: Map<String, Value>) -> Result<Map<String, Value>, GenerationError> {
    let has_payload = ["movies", "tv_series", "tvSeries"]
        .iter()
        .any(|field| object.contains_key(*field));
    if has_payload {
        return Ok(object);
    }

    let inner = TEXT_ENVELOPE_FIELDS
        .iter()
        .find_map(|field| object.get(*field).and_then(Value::as_str));

    match inner {
        Some(text) => parse_object(text),
        None => Ok(object),
    }
}

/// `None` when no field in `names` holds an array
fn parse_suggestions(object: &Map<String, Value>, names: &[&str]) -> Option<Vec<Suggestion>> {
    let (name, items) = names
        .iter()
        .find_map(|name| object.get(*name).map(|value| (*name, value)))?;

    let Some(items) = items.as_array() else {
        tracing::warn!(field = name, found = json_type(items), "Expected an array in generation response");
        return None;
    };

    let suggestions: Vec<Suggestion> = items.iter().filter_map(parse_suggestion).collect();

    if suggestions.len() < items.len() {
        tracing::debug!(
            field = name,
            skipped = items.len() - suggestions.len(),
            "Skipped malformed suggestions"
        );
    }

    Some(suggestions)
}

fn parse_suggestion(item: &Value) -> Option<Suggestion> {
    let title = item.get("title")?.as_str()?.trim();
    if title.is_empty() {
        return None;
    }

    let external_id = ["imdbID", "imdb_id", "externalId"]
        .iter()
        .find_map(|field| item.get(*field).and_then(Value::as_str))
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string);

    let reason = item
        .get("reason")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string();

    Some(Suggestion {
        title: title.to_string(),
        external_id,
        reason,
    })
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GenerationErrorKind;

    #[test]
    fn test_parse_complete_response() {
        let body = r#"{
            "movies": [
                {"title": "Arrival", "imdbID": "tt2543164", "reason": "Cerebral sci-fi"},
                {"title": "Sicario", "reason": "Tense thriller"}
            ],
            "tv_series": [
                {"title": "Dark", "imdbID": "tt5753856", "reason": "Time travel puzzle"}
            ]
        }"#;

        let set = parse_recommendations(body).unwrap();

        assert_eq!(set.movies.len(), 2);
        assert_eq!(set.movies[0].external_id.as_deref(), Some("tt2543164"));
        assert_eq!(set.movies[1].external_id, None);
        assert_eq!(set.tv_series[0].title, "Dark");
    }

    #[test]
    fn test_malformed_tv_series_yields_partial_result() {
        let body = r#"{
            "movies": [{"title": "Arrival", "reason": "Sci-fi"}],
            "tv_series": "sorry, I could not think of any"
        }"#;

        let set = parse_recommendations(body).unwrap();
        assert_eq!(set.movies.len(), 1);
        assert!(set.tv_series.is_empty());
    }

    #[test]
    fn test_missing_movies_defaults_to_empty() {
        let body = r#"{"tv_series": [{"title": "Fargo", "reason": "Dark comedy"}]}"#;

        let set = parse_recommendations(body).unwrap();
        assert!(set.movies.is_empty());
        assert_eq!(set.tv_series.len(), 1);
    }

    #[test]
    fn test_no_usable_arrays_is_malformed() {
        let err = parse_recommendations(r#"{"message": "hello"}"#).unwrap_err();
        assert_eq!(err.kind, GenerationErrorKind::MalformedResponse);
    }

    #[test]
    fn test_garbage_is_malformed() {
        let err = parse_recommendations("the server is on fire").unwrap_err();
        assert_eq!(err.kind, GenerationErrorKind::MalformedResponse);

        let err = parse_recommendations("[1, 2, 3]").unwrap_err();
        assert_eq!(err.kind, GenerationErrorKind::MalformedResponse);
    }

    #[test]
    fn test_json_inside_code_fence() {
        let body = "Here you go:\n```json\n{\"movies\": [{\"title\": \"Heat\", \"reason\": \"Mann\"}], \"tv_series\": []}\n```";

        let set = parse_recommendations(body).unwrap();
        assert_eq!(set.movies[0].title, "Heat");
    }

    #[test]
    fn test_text_envelope_is_unwrapped() {
        let body = r#"{"output": "{\"movies\": [], \"tv_series\": [{\"title\": \"Severance\", \"reason\": \"Office horror\"}]}"}"#;

        let set = parse_recommendations(body).unwrap();
        assert_eq!(set.tv_series[0].title, "Severance");
    }

    #[test]
    fn test_malformed_items_are_skipped() {
        let body = r#"{
            "movies": [
                {"title": "", "reason": "empty title"},
                {"reason": "no title"},
                42,
                {"title": "Memento", "imdb_id": " tt0209144 "}
            ],
            "tv_series": []
        }"#;

        let set = parse_recommendations(body).unwrap();
        assert_eq!(set.movies.len(), 1);
        assert_eq!(set.movies[0].title, "Memento");
        assert_eq!(set.movies[0].external_id.as_deref(), Some("tt0209144"));
        assert_eq!(set.movies[0].reason, "");
    }

    #[test]
    fn test_camel_case_tv_series_alias() {
        let body = r#"{"movies": [], "tvSeries": [{"title": "Lost", "reason": "Island"}]}"#;
        let set = parse_recommendations(body).unwrap();
        assert_eq!(set.tv_series.len(), 1);
    }
}
