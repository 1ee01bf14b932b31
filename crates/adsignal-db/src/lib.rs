//! Postgres persistence for ad digests, pulse reports and webhook
//! subscriptions.

pub mod ad_digests;
pub mod pulse_reports;
pub mod store;
pub mod webhooks;

use std::time::Duration;

use adsignal_core::AppConfig;
use sqlx::{postgres::PgPoolOptions, PgPool};
use thiserror::Error;

pub use ad_digests::{
    flag_anomaly, get_ad_digest, list_brand_embeddings, list_processed_digests,
    set_embedding_if_absent, AdDigestRow,
};
pub use pulse_reports::{insert_pulse_report, list_pulse_reports, PulseReportRow};
pub use store::PgStore;
pub use webhooks::{list_active_webhooks, WebhookRow};

// Resolved relative to this crate's Cargo.toml.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

#[derive(Debug, Error)]
pub enum DbError {
    #[error("record not found")]
    NotFound,
    #[error("invalid stored value: {0}")]
    InvalidValue(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Pool sizing. Defaults match the `ADSIGNAL_DB_*` defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(10),
        }
    }
}

impl PoolConfig {
    /// `min_connections` never exceeds `max_connections`.
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        let max_connections = config.db_max_connections.max(1);
        Self {
            max_connections,
            min_connections: config.db_min_connections.min(max_connections),
            acquire_timeout: Duration::from_secs(config.db_acquire_timeout_secs),
        }
    }
}

/// # Errors
///
/// Returns [`sqlx::Error`] if no connection can be established.
pub async fn connect_pool(database_url: &str, config: PoolConfig) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect(database_url)
        .await?;
    tracing::debug!(
        max = config.max_connections,
        min = config.min_connections,
        "database pool connected"
    );
    Ok(pool)
}

/// Apply pending migrations and return how many were pending.
///
/// # Errors
///
/// Returns [`DbError`] if the applied set cannot be read or a migration fails.
pub async fn run_migrations(pool: &PgPool) -> Result<usize, DbError> {
    let applied = applied_versions(pool).await?;
    let pending = MIGRATOR
        .iter()
        .filter(|m| !m.migration_type.is_down_migration() && !applied.contains(&m.version))
        .count();

    MIGRATOR.run(pool).await?;
    Ok(pending)
}

// The bookkeeping table is absent on a fresh database.
async fn applied_versions(pool: &PgPool) -> Result<Vec<i64>, DbError> {
    let exists: bool = sqlx::query_scalar("SELECT to_regclass('_sqlx_migrations') IS NOT NULL")
        .fetch_one(pool)
        .await?;
    if !exists {
        return Ok(Vec::new());
    }
    let versions =
        sqlx::query_scalar::<_, i64>("SELECT version FROM _sqlx_migrations WHERE success")
            .fetch_all(pool)
            .await?;
    Ok(versions)
}

/// Round-trip a trivial query.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the database does not answer.
pub async fn health_check(pool: &PgPool) -> Result<(), DbError> {
    sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(pool).await?;
    Ok(())
}
