use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ingestion::models::IngestRecord;
use crate::ingestion::pipeline::{IngestReport, IngestionPipeline};
use crate::resilience::TaskError;

/// Reads the scraper's output file. A missing file means the scraper has
/// not produced anything yet and yields `Ok(None)`.
pub async fn load_batch(path: &Path) -> Result<Option<Vec<IngestRecord>>, TaskError> {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(TaskError::transient(format!(
                "reading {}: {e}",
                path.display()
            )))
        }
    };

    serde_json::from_slice(&raw).map(Some).map_err(|e| {
        TaskError::invalid_input(format!("{} is not a listing array: {e}", path.display()))
    })
}

/// One scheduled run: load the batch and ingest it.
pub async fn run_once(
    pipeline: &IngestionPipeline,
    path: &Path,
    cancel: &CancellationToken,
) -> Option<IngestReport> {
    let records = match load_batch(path).await {
        Ok(Some(records)) => records,
        Ok(None) => {
            debug!(path = %path.display(), "No scraped listings to ingest");
            return None;
        }
        Err(e) => {
            warn!(error = %e, "Could not load scraped listings");
            return None;
        }
    };

    match pipeline.ingest(records, cancel).await {
        Ok(report) => Some(report),
        Err(e) => {
            warn!(error = %e, "Scheduled ingestion failed");
            None
        }
    }
}

/// Runs `run_once` every `every`, starting immediately, until `shutdown`
/// fires.
pub fn spawn_scheduler(
    pipeline: Arc<IngestionPipeline>,
    path: PathBuf,
    every: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(path = %path.display(), every_secs = every.as_secs(), "Listing ingestion scheduled");
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    run_once(&pipeline, &path, &shutdown).await;
                }
            }
        }
        debug!("Listing ingestion scheduler stopped");
    })
}
