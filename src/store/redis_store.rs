use async_trait::async_trait;
use redis::AsyncCommands;

use crate::config::StoreSettings;
use crate::error::{AppError, Result};
use crate::observability::get_metrics;
use crate::observability::metrics::LatencyTimer;
use crate::store::RecordStore;

/// Redis-backed record store.
///
/// Keys are namespaced with the configured prefix; expiration is delegated to
/// Redis TTLs, and the conditional insert maps to `SET NX EX`.
pub struct RedisRecordStore {
    client: redis::Client,
    key_prefix: String,
}

impl RedisRecordStore {
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    /// Connects using the store settings and verifies the server responds.
    pub async fn connect(settings: &StoreSettings) -> Result<Self> {
        let client = redis::Client::open(settings.url.as_str())?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        let _: () = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(Self::new(client, settings.key_prefix.clone()))
    }

    fn make_key(&self, key: &str) -> String {
        format!("{}:{}", self.key_prefix, key)
    }
}

#[async_trait]
impl RecordStore for RedisRecordStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let timer = LatencyTimer::new();
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(AppError::Redis)?;

        let value: Option<Vec<u8>> = conn.get(self.make_key(key)).await.map_err(AppError::Redis)?;
        get_metrics().record_store_operation("get", timer.elapsed_ms(), true);
        Ok(value)
    }

    async fn put(&self, key: &str, value: &[u8], ttl_seconds: u64) -> Result<()> {
        let timer = LatencyTimer::new();
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(AppError::Redis)?;

        let _: () = conn
            .set_ex(self.make_key(key), value, ttl_seconds)
            .await
            .map_err(AppError::Redis)?;
        get_metrics().record_store_operation("put", timer.elapsed_ms(), true);
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, value: &[u8], ttl_seconds: u64) -> Result<bool> {
        let timer = LatencyTimer::new();
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(AppError::Redis)?;

        let result: Option<String> = conn
            .set_options(
                self.make_key(key),
                value,
                redis::SetOptions::default()
                    .conditional_set(redis::ExistenceCheck::NX)
                    .with_expiration(redis::SetExpiry::EX(ttl_seconds as usize)),
            )
            .await
            .map_err(AppError::Redis)?;

        get_metrics().record_store_operation("put_if_absent", timer.elapsed_ms(), true);
        Ok(result.is_some())
    }
}
