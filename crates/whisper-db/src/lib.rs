//! # whisper-db
//!
//! Durable storage for the relay: PostgreSQL for everything the protocol
//! calls durable (identities, devices, the pending queue, groups,
//! attachment metadata, contact backups), optional Redis for the session
//! store and multi-node counters, and an S3/MinIO client for attachment
//! presigning.

pub mod postgres;
pub mod redis_pool;
pub mod repository;
pub mod sessions;
pub mod storage;

use anyhow::Result;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use whisper_common::config::{DatabaseConfig, RedisConfig};

/// Shared database state passed through service constructors.
#[derive(Clone)]
pub struct Database {
    pub pg: PgPool,
    /// Redis connection (`None` in single-node mode).
    pub redis: Option<redis::aio::ConnectionManager>,
}

impl Database {
    /// Connect using the configured URLs.
    pub async fn connect(db: &DatabaseConfig, redis_cfg: &RedisConfig) -> Result<Self> {
        tracing::info!("Connecting to PostgreSQL…");
        let pg = PgPoolOptions::new()
            .max_connections(db.max_connections)
            .min_connections(db.min_connections)
            .connect(&db.url)
            .await?;

        let redis = match &redis_cfg.url {
            Some(url) => {
                tracing::info!("Connecting to Redis…");
                let client = redis::Client::open(url.as_str())?;
                let mgr = redis::aio::ConnectionManager::new(client).await?;
                tracing::info!("Connected to Redis");
                Some(mgr)
            }
            None => {
                tracing::info!("REDIS_URL not set — sessions and counters stay in-process");
                None
            }
        };

        Ok(Self { pg, redis })
    }

    /// Run embedded migrations.
    pub async fn migrate(&self) -> Result<()> {
        tracing::info!("Running database migrations…");
        sqlx::migrate!("./migrations").run(&self.pg).await?;
        tracing::info!("Migrations complete");
        Ok(())
    }
}
