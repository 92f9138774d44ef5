use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{BackingStore, TtlMeta};
use crate::error::AppResult;

/// Process-local backing store used when no Redis URL is configured
#[derive(Default)]
pub struct InMemoryBackingStore {
    values: RwLock<HashMap<String, (String, TtlMeta)>>,
}

impl InMemoryBackingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.values.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.values.read().await.is_empty()
    }

    pub async fn meta(&self, key: &str) -> Option<TtlMeta> {
        self.values.read().await.get(key).map(|(_, meta)| *meta)
    }
}

#[async_trait::async_trait]
impl BackingStore for InMemoryBackingStore {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self
            .values
            .read()
            .await
            .get(key)
            .map(|(value, _)| value.clone()))
    }

    async fn set(&self, key: &str, value: String, meta: TtlMeta) -> AppResult<()> {
        self.values
            .write()
            .await
            .insert(key.to_string(), (value, meta));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
