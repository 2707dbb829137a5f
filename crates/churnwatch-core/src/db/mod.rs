//! Database layer for ChurnWatch
//!
//! Provides connections to PostgreSQL and Redis, plus the storage traits the
//! monitor and API are written against.

mod memory;
mod postgres;
mod redis;
mod store;

pub use memory::MemoryStore;
pub use postgres::{CustomerRepository, PostgresPool, SnapshotRepository};
pub use redis::{PredictionCache, RedisPool};
pub use store::{AlertLog, ConfigStore, CustomerStore, SnapshotStore, Stores};

use std::sync::Arc;

use crate::alerting::AlertRepository;
use crate::config::Config;
use crate::error::Result;

/// Database connections bundle
#[derive(Clone)]
pub struct Database {
    /// PostgreSQL connection pool
    pub postgres: PostgresPool,
    /// Redis connection pool, absent when no URL is configured
    pub redis: Option<RedisPool>,
}

impl Database {
    /// Create a new database connection bundle
    pub async fn new(config: &Config) -> Result<Self> {
        let postgres = PostgresPool::new(&config.database).await?;
        let redis = config.redis.url.as_deref().map(RedisPool::new).transpose()?;

        Ok(Self { postgres, redis })
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<()> {
        self.postgres.migrate().await
    }

    /// Check database health
    pub async fn health_check(&self) -> Result<()> {
        self.postgres.health_check().await?;
        if let Some(redis) = &self.redis {
            redis.health_check().await?;
        }
        Ok(())
    }

    /// Postgres-backed stores
    pub fn stores(&self) -> Stores {
        let alerts = Arc::new(AlertRepository::new(&self.postgres));
        Stores {
            customers: Arc::new(CustomerRepository::new(&self.postgres)),
            snapshots: Arc::new(SnapshotRepository::new(&self.postgres)),
            alerts: alerts.clone(),
            config: alerts,
        }
    }

    /// Prediction cache, when Redis is configured
    pub fn prediction_cache(&self, config: &Config) -> Option<PredictionCache> {
        self.redis
            .as_ref()
            .map(|redis| PredictionCache::new(redis, config.redis.prediction_ttl))
    }
}
