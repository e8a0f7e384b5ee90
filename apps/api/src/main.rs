mod analysis;
mod batch;
mod config;
mod db;
mod documents;
mod errors;
mod extraction;
mod ingestion;
mod llm_client;
mod models;
mod routes;
mod sanitize;
mod skills;
mod state;
#[cfg(test)]
mod testing;

use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::batch::processor::BatchProcessor;
use crate::config::Config;
use crate::db::{create_pool, run_migrations, PgStore};
use crate::documents::S3DocumentStore;
use crate::ingestion::coordinator::IngestionCoordinator;
use crate::llm_client::LlmClient;
use crate::routes::build_router;
use crate::state::{AppState, Stores};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting ingest API v{}", env!("CARGO_PKG_VERSION"));

    // PostgreSQL
    let pool = create_pool(&config.database_url).await?;
    run_migrations(&pool).await?;
    let pg = Arc::new(PgStore::new(pool));

    // S3 / MinIO
    let s3 = build_s3_client(&config).await;
    let documents = Arc::new(S3DocumentStore::new(s3, config.s3_bucket.clone()));
    info!(bucket = %config.s3_bucket, "S3 client initialized");

    // Reasoning service
    let llm = Arc::new(LlmClient::new(config.anthropic_api_key.clone()));
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    let stores = Stores {
        profiles: pg.clone(),
        sessions: pg.clone(),
        metrics: pg.clone(),
        templates: pg.clone(),
        batch_jobs: pg.clone(),
        documents,
    };

    let coordinator = Arc::new(IngestionCoordinator::new(
        stores.profiles.clone(),
        stores.sessions.clone(),
        stores.metrics.clone(),
        stores.documents.clone(),
        stores.templates.clone(),
        llm,
        config.ingestion(),
    ));

    if config.batch_worker_enabled {
        let processor = Arc::new(BatchProcessor::new(
            stores.batch_jobs.clone(),
            coordinator.clone(),
            config.batch(),
        ));
        tokio::spawn(processor.run_worker());
    } else {
        info!("Batch worker disabled");
    }

    let state = AppState {
        config: config.clone(),
        stores,
        coordinator,
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
async fn build_s3_client(config: &Config) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &config.aws_access_key_id,
        &config.aws_secret_access_key,
        None,
        None,
        "ingest-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials)
        .endpoint_url(&config.s3_endpoint)
        .load()
        .await;

    aws_sdk_s3::Client::new(&s3_config)
}
