//! HTTP generation provider
//!
//! POSTs `{"model", "input"}` to the configured endpoint with the static API
//! key in the `x-api-key` header and hands the body back untouched.
use reqwest::{Client as HttpClient, StatusCode};
use serde::Serialize;
use std::time::Duration;

use crate::error::GenerationError;
use crate::services::providers::GenerationService;

/// Header carrying the API key
pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Serialize)]
struct GenerationRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Clone)]
pub struct HttpGenerationService {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
    model: String,
}

impl HttpGenerationService {
    pub fn new(
        api_key: String,
        api_url: String,
        model: String,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let http_client = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GenerationError::network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            api_key,
            api_url,
            model,
        })
    }
}

/// Maps a non-success HTTP status onto a generation error
pub fn classify_status(status: StatusCode, body: &str) -> GenerationError {
    let detail = format!("generation service returned status {}: {}", status, body);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GenerationError::auth_invalid(detail),
        StatusCode::TOO_MANY_REQUESTS => GenerationError::rate_limited(detail),
        s if s.is_server_error() => GenerationError::service_unavailable(detail),
        _ => GenerationError::malformed(detail),
    }
}

/// Maps a reqwest failure that happened before a status was received
fn classify_transport(error: reqwest::Error) -> GenerationError {
    if error.is_timeout() {
        GenerationError::network(format!("generation request timed out: {}", error))
    } else {
        GenerationError::network(format!("generation request failed: {}", error))
    }
}

#[async_trait::async_trait]
impl GenerationService for HttpGenerationService {
    async fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
        let request = GenerationRequest {
            model: &self.model,
            input: prompt,
        };

        let response = self
            .http_client
            .post(&self.api_url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                status = %status,
                provider = self.name(),
                "Generation request failed"
            );
            return Err(classify_status(status, &body));
        }

        let body = response.text().await.map_err(classify_transport)?;
        tracing::debug!(bytes = body.len(), provider = self.name(), "Generation response received");

        Ok(body)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GenerationErrorKind;

    #[test]
    fn test_classify_auth_failures() {
        assert_eq!(
            classify_status(StatusCode::UNAUTHORIZED, "").kind,
            GenerationErrorKind::AuthInvalid
        );
        assert_eq!(
            classify_status(StatusCode::FORBIDDEN, "").kind,
            GenerationErrorKind::AuthInvalid
        );
    }

    #[test]
    fn test_classify_rate_limit() {
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, "slow down").kind,
            GenerationErrorKind::RateLimited
        );
    }

    #[test]
    fn test_classify_server_errors() {
        for status in [
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::BAD_GATEWAY,
            StatusCode::SERVICE_UNAVAILABLE,
        ] {
            assert_eq!(
                classify_status(status, "").kind,
                GenerationErrorKind::ServiceUnavailable
            );
        }
    }

    #[test]
    fn test_classify_other_client_errors() {
        let err = classify_status(StatusCode::BAD_REQUEST, "bad prompt");
        assert_eq!(err.kind, GenerationErrorKind::MalformedResponse);
        assert!(err.message.contains("bad prompt"));
    }

    #[test]
    fn test_request_serialization() {
        let request = GenerationRequest {
            model: "m1",
            input: "recommend things",
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "m1");
        assert_eq!(json["input"], "recommend things");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_network_error() {
        let service = HttpGenerationService::new(
            "key".to_string(),
            "http://127.0.0.1:9/v1/generate".to_string(),
            "m1".to_string(),
            Duration::from_secs(2),
        )
        .unwrap();

        let err = service.complete("prompt").await.unwrap_err();
        assert_eq!(err.kind, GenerationErrorKind::NetworkError);
    }
}
