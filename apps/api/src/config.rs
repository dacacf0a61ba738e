use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::resilience::RetryPolicy;

/// Application configuration loaded from environment variables.
/// Start-up fails if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub s3_bucket: String,
    pub s3_endpoint: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub anthropic_api_key: String,
    pub port: u16,
    pub rust_log: String,

    pub retry_max_attempts: u32,
    pub retry_initial_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub external_call_timeout_secs: u64,
    pub request_deadline_secs: u64,
    pub generation_cache_ttl_secs: u64,

    pub progress_queue_capacity: usize,
    pub progress_keep_alive_secs: u64,
    pub progress_retention_secs: u64,
    pub progress_sweep_interval_secs: u64,

    pub max_upload_bytes: usize,

    pub scraper_enabled: bool,
    pub scraper_interval_secs: u64,
    pub scraper_jobs_file: PathBuf,
    pub enrichment_concurrency: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            s3_bucket: require_env("S3_BUCKET")?,
            s3_endpoint: require_env("S3_ENDPOINT")?,
            aws_access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
            aws_secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            port: env_or("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),

            retry_max_attempts: env_or("RETRY_MAX_ATTEMPTS", 3)?,
            retry_initial_delay_ms: env_or("RETRY_INITIAL_DELAY_MS", 1_000)?,
            retry_max_delay_ms: env_or("RETRY_MAX_DELAY_MS", 10_000)?,
            external_call_timeout_secs: env_or("EXTERNAL_CALL_TIMEOUT_SECS", 120)?,
            request_deadline_secs: env_or("REQUEST_DEADLINE_SECS", 300)?,
            generation_cache_ttl_secs: env_or("GENERATION_CACHE_TTL_SECS", 3_600)?,

            progress_queue_capacity: env_or("PROGRESS_QUEUE_CAPACITY", 100)?,
            progress_keep_alive_secs: env_or("PROGRESS_KEEP_ALIVE_SECS", 30)?,
            progress_retention_secs: env_or("PROGRESS_RETENTION_SECS", 3_600)?,
            progress_sweep_interval_secs: env_or("PROGRESS_SWEEP_INTERVAL_SECS", 300)?,

            max_upload_bytes: env_or("MAX_UPLOAD_BYTES", 10 * 1024 * 1024)?,

            scraper_enabled: env_or("SCRAPER_ENABLED", false)?,
            scraper_interval_secs: env_or("SCRAPER_INTERVAL_SECS", 600)?,
            scraper_jobs_file: std::env::var("SCRAPER_JOBS_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./scraper/new_jobs.json")),
            enrichment_concurrency: env_or("ENRICHMENT_CONCURRENCY", 4)?,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_max_attempts,
            Duration::from_millis(self.retry_initial_delay_ms),
            Duration::from_millis(self.retry_max_delay_ms),
        )
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.external_call_timeout_secs)
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value: {raw:?}")),
        Err(_) => Ok(default),
    }
}
