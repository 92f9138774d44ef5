use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reelcast::clock::{Clock, TokioClock};
use reelcast::config::Config;
use reelcast::db::{
    create_redis_client, BackingStore, BackingWriterHandle, InMemoryBackingStore,
    RedisBackingStore,
};
use reelcast::routes::{create_router, AppState};
use reelcast::services::providers::HttpGenerationService;
use reelcast::services::{GenerationClient, Orchestrator, RetryPolicy, Throttle, TieredCacheStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reelcast=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let engine_config = config.engine();

    let (backing, writer_handle): (Arc<dyn BackingStore>, Option<BackingWriterHandle>) =
        match &config.redis_url {
            Some(url) => {
                let client = create_redis_client(url)?;
                let (store, handle) = RedisBackingStore::new(client);
                tracing::info!("Using Redis backing store");
                (Arc::new(store), Some(handle))
            }
            None => {
                tracing::warn!("REDIS_URL not set, cache will not survive restarts");
                (Arc::new(InMemoryBackingStore::new()), None)
            }
        };

    let service = HttpGenerationService::new(
        config.generation_api_key.clone(),
        config.generation_api_url.clone(),
        config.generation_model.clone(),
        Duration::from_secs(config.request_timeout_secs),
    )?;

    let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());
    let store = Arc::new(TieredCacheStore::new(backing, clock.clone()));
    let client = GenerationClient::new(
        Arc::new(service),
        Arc::new(Throttle::new(engine_config.min_request_interval)),
        RetryPolicy::new(engine_config.max_retries, engine_config.retry_base_delay),
    );
    let orchestrator = Arc::new(Orchestrator::new(engine_config, store, client, clock));

    let app = create_router(AppState::new(orchestrator.clone()));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    orchestrator.shutdown().await;
    if let Some(handle) = writer_handle {
        let handled = handle.shutdown().await;
        tracing::info!(handled, "Backing writer stopped");
    }
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
