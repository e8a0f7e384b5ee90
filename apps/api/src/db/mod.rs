//! PostgreSQL access. One module per table family; each implements the store
//! traits the pipeline depends on for `PgStore`.

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use thiserror::Error;
use tracing::info;

pub mod batch_jobs;
pub mod metrics;
pub mod profiles;
pub mod sessions;
pub mod templates;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("object storage error: {0}")]
    ObjectStorage(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("subject already has an active ingestion session")]
    ActiveSession,

    #[error("duplicate key: {0}")]
    Duplicate(&'static str),

    #[error("store call timed out after {0}s")]
    Timeout(u64),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Unique-constraint violations carry the constraint name so callers can
    /// tell which key collided.
    pub fn violated_constraint(err: &sqlx::Error) -> Option<&str> {
        match err {
            sqlx::Error::Database(db) if db.is_unique_violation() => db.constraint(),
            _ => None,
        }
    }
}

/// Postgres-backed implementation of every relational store trait.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Creates and returns a PostgreSQL connection pool.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    info!("Connecting to PostgreSQL...");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    info!("PostgreSQL connection pool established");
    Ok(pool)
}

/// Applies pending migrations from `apps/api/migrations`.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("Database migrations applied");
    Ok(())
}
