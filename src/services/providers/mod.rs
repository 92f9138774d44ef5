//! Recommendation generation backends
//!
//! A provider only moves a prompt to the external service and brings the raw
//! body back, classifying transport and HTTP failures. Throttling, retries,
//! deduplication and response validation live in
//! [`GenerationClient`](crate::services::generation::GenerationClient).
use crate::error::GenerationError;

pub mod http;

pub use http::HttpGenerationService;

/// Trait for generation service backends
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait GenerationService: Send + Sync {
    /// Sends `prompt` and returns the raw response body
    async fn complete(&self, prompt: &str) -> Result<String, GenerationError>;

    /// Provider name for logging and debugging
    fn name(&self) -> &'static str;
}
