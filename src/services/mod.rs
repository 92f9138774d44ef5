pub mod cache_key;
pub mod generation;
pub mod providers;
pub mod quality;
pub mod recommendations;
pub mod response;
pub mod retry;
pub mod scheduler;
pub mod throttle;
pub mod tiered_cache;

pub use cache_key::{derive_key, RequestKey};
pub use generation::GenerationClient;
pub use quality::QualityAssessor;
pub use recommendations::{
    CacheStats, LoadOptions, LoadResponse, LoadingState, Orchestrator, RecommendationSource,
    RecommendationView,
};
pub use retry::RetryPolicy;
pub use scheduler::{BackgroundScheduler, RefreshPriority, RefreshTrigger};
pub use throttle::Throttle;
pub use tiered_cache::{CacheEntry, CacheTier, TieredCacheStore};
