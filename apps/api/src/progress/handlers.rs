//! Server-Sent Events transport for the progress registry.

use axum::{
    extract::{Path, State},
    response::sse::{Event, Sse},
};
use futures::{stream, Stream, StreamExt};

use crate::errors::AppError;
use crate::progress::ProgressEvent;
use crate::state::AppState;

/// GET /events/:session_id
///
/// Registers the session and streams `data: <json>` frames: a `connection`
/// event first, then every published event and periodic heartbeats. Closing
/// the connection removes the session.
pub async fn handle_subscribe(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, AppError> {
    let session_id = session_id.trim();
    if session_id.is_empty() {
        return Err(AppError::Validation("session id cannot be empty".to_string()));
    }

    tracing::info!(session_id, "Progress subscriber connected");

    let channel = state.progress.register(session_id);
    let events = stream::once(async { ProgressEvent::connected() })
        .chain(state.progress.consume(channel))
        .map(|event| Event::default().json_data(&event));

    Ok(Sse::new(events))
}
