use serde::Deserialize;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// API key sent to the recommendation generation service
    pub generation_api_key: String,

    /// Generation service endpoint
    #[serde(default = "default_generation_api_url")]
    pub generation_api_url: String,

    /// Model identifier forwarded to the generation service
    #[serde(default = "default_generation_model")]
    pub generation_model: String,

    /// Redis connection URL. Without one the cache is mirrored to process memory only.
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_hot_ttl_secs")]
    pub hot_ttl_secs: u64,

    #[serde(default = "default_background_ttl_secs")]
    pub background_ttl_secs: u64,

    /// Age after which a hot hit triggers a background refresh
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,

    #[serde(default = "default_periodic_refresh_secs")]
    pub periodic_refresh_secs: u64,

    #[serde(default = "default_stale_refresh_delay_secs")]
    pub stale_refresh_delay_secs: u64,

    /// Minimum spacing between any two outbound generation calls
    #[serde(default = "default_min_request_interval_ms")]
    pub min_request_interval_ms: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_base_delay_secs")]
    pub retry_base_delay_secs: u64,

    /// Quality score a background-tier hit needs to be served without regenerating
    #[serde(default = "default_min_background_quality")]
    pub min_background_quality: f64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_generation_api_url() -> String {
    "http://localhost:8787/v1/generate".to_string()
}

fn default_generation_model() -> String {
    "recommendation-default".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_hot_ttl_secs() -> u64 {
    60 * 60
}

fn default_background_ttl_secs() -> u64 {
    120 * 60
}

fn default_stale_after_secs() -> u64 {
    30 * 60
}

fn default_periodic_refresh_secs() -> u64 {
    45 * 60
}

fn default_stale_refresh_delay_secs() -> u64 {
    1
}

fn default_min_request_interval_ms() -> u64 {
    2000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_secs() -> u64 {
    2
}

fn default_min_background_quality() -> f64 {
    0.3
}

fn default_request_timeout_secs() -> u64 {
    60
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        envy::from_env::<Config>().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }

    /// Engine tunables derived from this configuration
    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            hot_ttl: Duration::from_secs(self.hot_ttl_secs),
            background_ttl: Duration::from_secs(self.background_ttl_secs),
            stale_after: Duration::from_secs(self.stale_after_secs),
            periodic_refresh: Duration::from_secs(self.periodic_refresh_secs),
            stale_refresh_delay: Duration::from_secs(self.stale_refresh_delay_secs),
            min_request_interval: Duration::from_millis(self.min_request_interval_ms),
            max_retries: self.max_retries,
            retry_base_delay: Duration::from_secs(self.retry_base_delay_secs),
            min_background_quality: self.min_background_quality,
        }
    }
}

/// Timing and policy knobs consumed by the recommendation engine
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub hot_ttl: Duration,
    pub background_ttl: Duration,
    pub stale_after: Duration,
    pub periodic_refresh: Duration,
    pub stale_refresh_delay: Duration,
    pub min_request_interval: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub min_background_quality: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            hot_ttl: Duration::from_secs(default_hot_ttl_secs()),
            background_ttl: Duration::from_secs(default_background_ttl_secs()),
            stale_after: Duration::from_secs(default_stale_after_secs()),
            periodic_refresh: Duration::from_secs(default_periodic_refresh_secs()),
            stale_refresh_delay: Duration::from_secs(default_stale_refresh_delay_secs()),
            min_request_interval: Duration::from_millis(default_min_request_interval_ms()),
            max_retries: default_max_retries(),
            retry_base_delay: Duration::from_secs(default_retry_base_delay_secs()),
            min_background_quality: default_min_background_quality(),
        }
    }
}
