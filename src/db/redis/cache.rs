use redis::AsyncCommands;
use redis::Client;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::db::{BackingStore, TtlMeta};
use crate::error::AppResult;

/// Creates a Redis client for the durable cache mirror
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

/// Message for asynchronous backing writes
struct BackingWriteMessage {
    key: String,
    value: String,
}

/// Redis mirror of the tiered recommendation cache
///
/// Reads go straight to Redis. Writes are queued to a background task so a
/// cache write never delays the response that produced it. Keys are written
/// without expiry; freshness is judged from the entry's own timestamp.
#[derive(Clone)]
pub struct RedisBackingStore {
    redis_client: Client,
    write_tx: mpsc::UnboundedSender<BackingWriteMessage>,
}

/// Handle for gracefully shutting down the backing writer
pub struct BackingWriterHandle {
    shutdown_tx: mpsc::Sender<()>,
    join: JoinHandle<usize>,
}

impl BackingWriterHandle {
    /// Signals the writer task to flush pending writes and waits until it has.
    ///
    /// Returns the number of queued writes the task handled over its lifetime,
    /// failed ones included.
    pub async fn shutdown(self) -> usize {
        let _ = self.shutdown_tx.send(()).await;
        match self.join.await {
            Ok(handled) => handled,
            Err(e) => {
                tracing::error!(error = %e, "Backing writer task ended abnormally");
                0
            }
        }
    }
}

impl RedisBackingStore {
    /// Creates the store and spawns its writer task
    pub fn new(redis_client: Client) -> (Self, BackingWriterHandle) {
        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let client = redis_client.clone();
        let join = tokio::spawn(async move {
            Self::writer_task(client, write_rx, shutdown_rx).await
        });

        let store = Self {
            redis_client,
            write_tx,
        };

        (store, BackingWriterHandle { shutdown_tx, join })
    }

    /// Drains queued writes into Redis until shutdown, then flushes what is left
    async fn writer_task(
        client: Client,
        mut write_rx: mpsc::UnboundedReceiver<BackingWriteMessage>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) -> usize {
        tracing::info!("Backing writer task started");
        let mut handled = 0usize;

        loop {
            tokio::select! {
                Some(msg) = write_rx.recv() => {
                    handled += 1;
                    if let Err(e) = Self::write_to_redis(&client, msg).await {
                        tracing::error!(error = %e, "Failed to mirror cache entry to Redis");
                    }
                }
                Some(()) = shutdown_rx.recv() => {
                    write_rx.close();
                    let mut flushed = 0usize;
                    while let Some(msg) = write_rx.recv().await {
                        handled += 1;
                        if let Err(e) = Self::write_to_redis(&client, msg).await {
                            tracing::error!(error = %e, "Failed to flush cache entry during shutdown");
                        } else {
                            flushed += 1;
                        }
                    }

                    tracing::info!(flushed, "Backing writer task stopped");
                    break;
                }
                else => break,
            }
        }

        handled
    }

    async fn write_to_redis(client: &Client, msg: BackingWriteMessage) -> AppResult<()> {
        let mut conn = client.get_multiplexed_async_connection().await?;
        let _: () = conn.set(msg.key, msg.value).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl BackingStore for RedisBackingStore {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let cached: Option<String> = conn.get(key).await?;
        Ok(cached)
    }

    async fn set(&self, key: &str, value: String, meta: TtlMeta) -> AppResult<()> {
        tracing::debug!(
            key = %key,
            ttl_secs = meta.ttl.as_secs(),
            "Queueing backing write"
        );

        let msg = BackingWriteMessage {
            key: key.to_string(),
            value,
        };

        if let Err(e) = self.write_tx.send(msg) {
            tracing::error!(error = %e, "Backing writer is gone, dropping write");
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
