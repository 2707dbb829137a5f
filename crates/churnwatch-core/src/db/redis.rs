//! Redis connection and prediction cache

use std::time::Duration;

use deadpool_redis::{Config as RedisConfig, Pool, Runtime};
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::{Error, Result};

const PREDICTION_PREFIX: &str = "churnwatch:predict:";

/// Redis connection pool
#[derive(Clone)]
pub struct RedisPool {
    pool: Pool,
}

impl RedisPool {
    /// Create a new Redis connection pool
    pub fn new(url: &str) -> Result<Self> {
        let cfg = RedisConfig::from_url(url);
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| Error::Redis(e.to_string()))?;

        Ok(Self { pool })
    }

    /// Health check
    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.pool.get().await.map_err(|e| Error::Redis(e.to_string()))?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::Redis(e.to_string()))?;
        Ok(())
    }
}

/// Caches prediction responses keyed by a hash of the request body.
///
/// Cache failures never fail a prediction: reads miss and writes are dropped,
/// both with a warning.
#[derive(Clone)]
pub struct PredictionCache {
    pool: Pool,
    ttl: Duration,
}

impl PredictionCache {
    pub fn new(pool: &RedisPool, ttl: Duration) -> Self {
        Self {
            pool: pool.pool.clone(),
            ttl,
        }
    }

    /// Stable key for a request payload
    pub fn key_for<T: Serialize>(request: &T) -> Result<String> {
        let canonical = serde_json::to_vec(request)?;
        let digest = Sha256::digest(&canonical);
        Ok(format!("{PREDICTION_PREFIX}{}", hex::encode(digest)))
    }

    pub async fn get<V: DeserializeOwned>(&self, key: &str) -> Option<V> {
        match self.try_get(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, key, "Prediction cache read failed");
                None
            }
        }
    }

    pub async fn put<V: Serialize>(&self, key: &str, value: &V) {
        if let Err(e) = self.try_put(key, value).await {
            warn!(error = %e, key, "Prediction cache write failed");
        }
    }

    async fn try_get<V: DeserializeOwned>(&self, key: &str) -> Result<Option<V>> {
        let mut conn = self.pool.get().await.map_err(|e| Error::Redis(e.to_string()))?;
        let raw: Option<String> = conn.get(key).await.map_err(|e| Error::Redis(e.to_string()))?;

        raw.map(|s| serde_json::from_str(&s).map_err(Error::from))
            .transpose()
    }

    async fn try_put<V: Serialize>(&self, key: &str, value: &V) -> Result<()> {
        let payload = serde_json::to_string(value)?;
        let mut conn = self.pool.get().await.map_err(|e| Error::Redis(e.to_string()))?;
        let _: () = conn
            .set_ex(key, payload, self.ttl.as_secs().max(1))
            .await
            .map_err(|e| Error::Redis(e.to_string()))?;
        Ok(())
    }
}
