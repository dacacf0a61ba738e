use std::sync::Arc;

use crate::config::Config;
use crate::ingestion::IngestionPipeline;
use crate::progress::ProgressRegistry;
use crate::tailoring::TailoringService;

/// Shared application state injected into all route handlers via Axum extractors.
/// Built once in `main`; every long-lived component hangs off it.
#[derive(Clone)]
pub struct AppState {
    pub tailoring: Arc<TailoringService>,
    pub ingestion: Arc<IngestionPipeline>,
    pub progress: Arc<ProgressRegistry>,
    pub config: Config,
}
