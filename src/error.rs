use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt::Display;

/// Classified failure of a call to the recommendation generation service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationErrorKind {
    /// 401/403 from the service. Never retried.
    AuthInvalid,
    /// 429 from the service.
    RateLimited,
    /// 5xx from the service.
    ServiceUnavailable,
    /// Connection, DNS or timeout failure before a response arrived.
    NetworkError,
    /// Response body could not be turned into a usable recommendation set. Never retried.
    MalformedResponse,
}

impl GenerationErrorKind {
    /// Whether a failure of this kind is worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GenerationErrorKind::RateLimited
                | GenerationErrorKind::ServiceUnavailable
                | GenerationErrorKind::NetworkError
        )
    }

    /// Human-readable category shown to end users instead of diagnostic text
    pub fn user_message(&self) -> &'static str {
        match self {
            GenerationErrorKind::AuthInvalid => "recommendation service is not configured correctly",
            GenerationErrorKind::RateLimited => "too many recommendation requests, try again shortly",
            GenerationErrorKind::ServiceUnavailable => "service temporarily unavailable",
            GenerationErrorKind::NetworkError => "could not reach the recommendation service",
            GenerationErrorKind::MalformedResponse => {
                "recommendation service returned an unusable response"
            }
        }
    }
}

impl Display for GenerationErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            GenerationErrorKind::AuthInvalid => "auth_invalid",
            GenerationErrorKind::RateLimited => "rate_limited",
            GenerationErrorKind::ServiceUnavailable => "service_unavailable",
            GenerationErrorKind::NetworkError => "network_error",
            GenerationErrorKind::MalformedResponse => "malformed_response",
        };
        write!(f, "{}", name)
    }
}

/// Error returned by the generation path.
///
/// `Clone` so a single failed generation can be handed to every caller
/// attached to the same in-flight request.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct GenerationError {
    pub kind: GenerationErrorKind,
    pub message: String,
}

impl GenerationError {
    pub fn new(kind: GenerationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn auth_invalid(message: impl Into<String>) -> Self {
        Self::new(GenerationErrorKind::AuthInvalid, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(GenerationErrorKind::RateLimited, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(GenerationErrorKind::ServiceUnavailable, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(GenerationErrorKind::NetworkError, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(GenerationErrorKind::MalformedResponse, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// Application-level errors
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match &self {
            AppError::Generation(e) => {
                let status = match e.kind {
                    GenerationErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
                    GenerationErrorKind::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
                    GenerationErrorKind::AuthInvalid
                    | GenerationErrorKind::NetworkError
                    | GenerationErrorKind::MalformedResponse => StatusCode::BAD_GATEWAY,
                };
                (status, e.kind.to_string(), e.kind.user_message().to_string())
            }
            AppError::InvalidInput(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_input".to_string(), msg.clone())
            }
            AppError::Cache(_) | AppError::Serialization(_) | AppError::Internal(_) => {
                tracing::error!(error = %self, "Internal error while serving request");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal".to_string(),
                    "internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message,
            "kind": kind,
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
