//! Collaborator doubles shared by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::config::Config;
use crate::extraction::{ContentKind, ReferenceFetcher, TextExtractor};
use crate::ingestion::enrichment::{placeholder_details, ListingEnricher};
use crate::ingestion::models::ListingDetails;
use crate::ingestion::{IngestSettings, IngestionPipeline};
use crate::llm_client::{GenerationService, StructuredCompletion};
use crate::progress::ProgressRegistry;
use crate::resilience::{ResultCache, TaskError};
use crate::state::AppState;
use crate::store::memory::MemoryStore;
use crate::tailoring::{TailoringService, TailoringSettings};

enum Script {
    Always(String),
    Sequence(Mutex<VecDeque<Result<String, TaskError>>>),
    Routed(Vec<(String, String)>),
    Hanging,
}

/// A `GenerationService` that answers from a script and counts its calls.
pub struct ScriptedGenerator {
    script: Script,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    fn with(script: Script) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always(text: &str) -> Self {
        Self::with(Script::Always(text.to_string()))
    }

    /// Answers in order; once exhausted every call fails unrecoverably.
    pub fn sequence(responses: Vec<Result<String, TaskError>>) -> Self {
        Self::with(Script::Sequence(Mutex::new(responses.into())))
    }

    /// Picks the response whose needle appears in the system prompt.
    pub fn routed(routes: &[(&str, &str)]) -> Self {
        Self::with(Script::Routed(
            routes
                .iter()
                .map(|(needle, response)| (needle.to_string(), response.to_string()))
                .collect(),
        ))
    }

    /// Never answers.
    pub fn hanging() -> Self {
        Self::with(Script::Hanging)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationService for ScriptedGenerator {
    async fn complete(&self, system: &str, _user: &str) -> Result<String, TaskError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::Always(text) => Ok(text.clone()),
            Script::Sequence(queue) => queue
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(TaskError::unrecoverable("script exhausted"))),
            Script::Routed(routes) => routes
                .iter()
                .find(|(needle, _)| system.contains(needle.as_str()))
                .map(|(_, response)| Ok(response.clone()))
                .unwrap_or_else(|| Err(TaskError::unrecoverable("no scripted route"))),
            Script::Hanging => std::future::pending().await,
        }
    }
}

pub struct StaticExtractor(Result<String, TaskError>);

impl StaticExtractor {
    pub fn ok(text: &str) -> Self {
        Self(Ok(text.to_string()))
    }

    pub fn err(err: TaskError) -> Self {
        Self(Err(err))
    }
}

#[async_trait]
impl TextExtractor for StaticExtractor {
    async fn extract_text(&self, _bytes: Bytes, _kind: ContentKind) -> Result<String, TaskError> {
        self.0.clone()
    }
}

pub struct StaticFetcher(Result<String, TaskError>);

impl StaticFetcher {
    pub fn ok(text: &str) -> Self {
        Self(Ok(text.to_string()))
    }

    pub fn err(err: TaskError) -> Self {
        Self(Err(err))
    }
}

#[async_trait]
impl ReferenceFetcher for StaticFetcher {
    async fn fetch_reference(&self, _locator: &str) -> Result<String, TaskError> {
        self.0.clone()
    }
}

/// A `ListingEnricher` that tags each description with a fixed industry,
/// failing for descriptions that contain a chosen marker.
pub struct ScriptedEnricher {
    failing_marker: Option<(String, TaskError)>,
    transient_budget: AtomicUsize,
    calls: AtomicUsize,
}

impl ScriptedEnricher {
    pub fn new() -> Self {
        Self {
            failing_marker: None,
            transient_budget: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    /// Every description containing `marker` fails with `err`.
    pub fn failing_on(mut self, marker: &str, err: TaskError) -> Self {
        self.failing_marker = Some((marker.to_string(), err));
        self
    }

    /// The first `n` calls fail transiently before any succeed.
    pub fn flaky(self, n: usize) -> Self {
        self.transient_budget.store(n, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ListingEnricher for ScriptedEnricher {
    async fn enrich(&self, description: &str) -> Result<ListingDetails, TaskError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let flaky = self
            .transient_budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if flaky {
            return Err(TaskError::transient("model overloaded"));
        }

        if let Some((marker, err)) = &self.failing_marker {
            if description.contains(marker.as_str()) {
                return Err(err.clone());
            }
        }

        let mut details = placeholder_details();
        details.industry = serde_json::json!("Finance");
        Ok(details)
    }
}

pub fn test_config() -> Config {
    Config {
        database_url: "postgres://localhost/tailor_test".into(),
        s3_bucket: "resumes".into(),
        s3_endpoint: "http://localhost:9000".into(),
        aws_access_key_id: "test".into(),
        aws_secret_access_key: "test".into(),
        anthropic_api_key: "test".into(),
        port: 0,
        rust_log: "debug".into(),
        retry_max_attempts: 2,
        retry_initial_delay_ms: 10,
        retry_max_delay_ms: 20,
        external_call_timeout_secs: 30,
        request_deadline_secs: 120,
        generation_cache_ttl_secs: 60,
        progress_queue_capacity: 16,
        progress_keep_alive_secs: 30,
        progress_retention_secs: 600,
        progress_sweep_interval_secs: 60,
        max_upload_bytes: 64 * 1024,
        scraper_enabled: false,
        scraper_interval_secs: 600,
        scraper_jobs_file: "./scraper/new_jobs.json".into(),
        enrichment_concurrency: 2,
    }
}

/// Application state wired to in-memory doubles.
pub fn app_state(generator: ScriptedGenerator) -> (AppState, Arc<MemoryStore>) {
    let config = test_config();
    let store = Arc::new(MemoryStore::default());
    let progress = Arc::new(ProgressRegistry::new(
        config.progress_queue_capacity,
        Duration::from_secs(config.progress_keep_alive_secs),
    ));
    let completion = StructuredCompletion::new(
        Arc::new(generator),
        Arc::new(ResultCache::new(Duration::from_secs(
            config.generation_cache_ttl_secs,
        ))),
        config.call_timeout(),
    );

    let tailoring = TailoringService {
        store: store.clone(),
        extractor: Arc::new(StaticExtractor::ok("Jane Banda, CPA")),
        fetcher: Arc::new(StaticFetcher::ok("Accountant wanted at Press Corp")),
        completion,
        archive: None,
        progress: progress.clone(),
        settings: TailoringSettings {
            retry: config.retry_policy(),
            call_timeout: config.call_timeout(),
            request_deadline: Duration::from_secs(config.request_deadline_secs),
        },
    };
    let ingestion = IngestionPipeline {
        store: store.clone(),
        enricher: Arc::new(ScriptedEnricher::new()),
        settings: IngestSettings {
            retry: config.retry_policy(),
            call_timeout: config.call_timeout(),
            enrichment_concurrency: config.enrichment_concurrency,
        },
    };

    let state = AppState {
        tailoring: Arc::new(tailoring),
        ingestion: Arc::new(ingestion),
        progress,
        config,
    };
    (state, store)
}
