mod archive;
mod config;
mod db;
mod errors;
mod extraction;
mod ingestion;
mod llm_client;
mod orchestrator;
mod progress;
mod resilience;
mod routes;
mod state;
mod store;
mod tailoring;

#[cfg(test)]
mod testing;

use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::archive::S3ResumeArchive;
use crate::config::Config;
use crate::db::create_pool;
use crate::extraction::{DocumentExtractor, WebFetcher};
use crate::ingestion::scheduler::spawn_scheduler;
use crate::ingestion::{IngestSettings, IngestionPipeline, LlmListingEnricher};
use crate::llm_client::{LlmClient, StructuredCompletion};
use crate::progress::ProgressRegistry;
use crate::resilience::ResultCache;
use crate::routes::build_router;
use crate::state::AppState;
use crate::store::PgDocumentStore;
use crate::tailoring::{TailoringService, TailoringSettings};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Tailor API v{}", env!("CARGO_PKG_VERSION"));

    // Document store on PostgreSQL
    let store = Arc::new(PgDocumentStore::new(create_pool(&config.database_url).await?));
    store.ensure_schema().await?;
    info!("Document store ready");

    // Resume archive on S3 / MinIO
    let s3 = build_s3_client(&config).await;
    let archive = Arc::new(S3ResumeArchive::new(s3, config.s3_bucket.clone()));
    info!("S3 client initialized");

    // Generation client and the shared result cache
    let llm = LlmClient::new(config.anthropic_api_key.clone())?;
    info!("LLM client initialized (model: {})", llm_client::MODEL);
    let cache = Arc::new(ResultCache::new(Duration::from_secs(
        config.generation_cache_ttl_secs,
    )));
    let completion = StructuredCompletion::new(Arc::new(llm), cache, config.call_timeout());

    let progress = Arc::new(ProgressRegistry::new(
        config.progress_queue_capacity,
        Duration::from_secs(config.progress_keep_alive_secs),
    ));

    let tailoring = TailoringService {
        store: store.clone(),
        extractor: Arc::new(DocumentExtractor),
        fetcher: Arc::new(WebFetcher::new()?),
        completion: completion.clone(),
        archive: Some(archive),
        progress: progress.clone(),
        settings: TailoringSettings {
            retry: config.retry_policy(),
            call_timeout: config.call_timeout(),
            request_deadline: Duration::from_secs(config.request_deadline_secs),
        },
    };

    let ingestion = Arc::new(IngestionPipeline {
        store,
        enricher: Arc::new(LlmListingEnricher::new(completion)),
        settings: IngestSettings {
            retry: config.retry_policy(),
            call_timeout: config.call_timeout(),
            enrichment_concurrency: config.enrichment_concurrency,
        },
    });

    // Background work stops when `shutdown` fires
    let shutdown = CancellationToken::new();
    let sweeper = progress.spawn_sweeper(
        Duration::from_secs(config.progress_sweep_interval_secs),
        Duration::from_secs(config.progress_retention_secs),
        shutdown.clone(),
    );
    let scheduler = config.scraper_enabled.then(|| {
        spawn_scheduler(
            ingestion.clone(),
            config.scraper_jobs_file.clone(),
            Duration::from_secs(config.scraper_interval_secs),
            shutdown.clone(),
        )
    });

    // Build app state
    let state = AppState {
        tailoring: Arc::new(tailoring),
        ingestion,
        progress,
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    if let Err(e) = sweeper.await {
        warn!("Progress sweeper ended abnormally: {e}");
    }
    if let Some(scheduler) = scheduler {
        if let Err(e) = scheduler.await {
            warn!("Ingestion scheduler ended abnormally: {e}");
        }
    }
    info!("Shut down cleanly");

    Ok(())
}

/// Resolves on Ctrl-C and cancels `shutdown` so background tasks wind down
/// alongside the server.
async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not listen for Ctrl-C: {e}");
        // keep serving; the process is stopped some other way
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
    shutdown.cancel();
}

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
async fn build_s3_client(config: &Config) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &config.aws_access_key_id,
        &config.aws_secret_access_key,
        None,
        None,
        "tailor-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials)
        .endpoint_url(&config.s3_endpoint)
        .load()
        .await;

    aws_sdk_s3::Client::new(&s3_config)
}
