pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::ingestion::handlers::handle_ingest_listings;
use crate::progress::handlers::handle_subscribe;
use crate::state::AppState;
use crate::tailoring::handlers::{handle_get_history, handle_upload};

/// Room for the multipart framing and text fields around the file itself.
const FORM_OVERHEAD_BYTES: usize = 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    let upload_limit = state.config.max_upload_bytes + FORM_OVERHEAD_BYTES;

    Router::new()
        .route("/health", get(health::health_handler))
        // Tailoring
        .route(
            "/upload",
            post(handle_upload).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/events/:session_id", get(handle_subscribe))
        .route("/history/:user_id/:history_id", get(handle_get_history))
        // Listing ingestion
        .route("/api/v1/jobs/ingest", post(handle_ingest_listings))
        .with_state(state)
}
