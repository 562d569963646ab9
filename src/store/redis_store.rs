use redis::AsyncCommands;
use redis::Client;

use super::{Store, StoreKey};
use crate::error::AppResult;

/// Creates a Redis client for the collection store
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    let client = Client::open(redis_url)?;
    Ok(client)
}

/// Redis-backed store
///
/// Keys are prefixed with a namespace (`<namespace>:<key>`) so several
/// collections can share one server.
#[derive(Clone)]
pub struct RedisStore {
    client: Client,
    namespace: String,
}

impl RedisStore {
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    fn redis_key(&self, key: StoreKey) -> String {
        format!("{}:{}", self.namespace, key)
    }
}

#[async_trait::async_trait]
impl Store for RedisStore {
    async fn read(&self, key: StoreKey) -> AppResult<Option<String>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let value: Option<String> = conn.get(self.redis_key(key)).await?;
        Ok(value)
    }

    async fn write(&self, key: StoreKey, value: String) -> AppResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: () = conn.set(self.redis_key(key), value).await?;
        Ok(())
    }

    async fn clear(&self, key: StoreKey) -> AppResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: () = conn.del(self.redis_key(key)).await?;
        Ok(())
    }

    /// Single multi-key DEL, so readers never observe a partial clear
    async fn clear_all(&self, keys: &[StoreKey]) -> AppResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let redis_keys: Vec<String> = keys.iter().map(|k| self.redis_key(*k)).collect();
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: () = conn.del(redis_keys).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
