use axum::{extract::State, Json};
use tokio_util::sync::CancellationToken;

use crate::errors::AppError;
use crate::ingestion::models::IngestRecord;
use crate::ingestion::pipeline::IngestReport;
use crate::state::AppState;

/// POST /api/v1/jobs/ingest
pub async fn handle_ingest_listings(
    State(state): State<AppState>,
    Json(records): Json<Vec<IngestRecord>>,
) -> Result<Json<IngestReport>, AppError> {
    if records.is_empty() {
        return Err(AppError::Validation("no listings supplied".to_string()));
    }

    let cancel = CancellationToken::new();
    let _disconnect = cancel.clone().drop_guard();

    let report = state.ingestion.ingest(records, &cancel).await?;
    Ok(Json(report))
}
