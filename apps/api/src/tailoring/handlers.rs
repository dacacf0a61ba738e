use axum::extract::{Multipart, Path, State};
use axum::Json;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::errors::AppError;
use crate::extraction::ContentKind;
use crate::progress::{ProgressEvent, ProgressStep};
use crate::resilience::TaskError;
use crate::state::AppState;
use crate::tailoring::models::{ProcessingRequest, UploadResponse};

/// Raw multipart fields of an upload, before validation.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub session_id: String,
    pub user_id: String,
    pub weblink: String,
    pub file: Option<(String, Bytes)>,
    pub template: Option<String>,
    pub colors: Option<String>,
}

/// Reads fields into `form` as they arrive, so whatever came before a broken
/// part (usually the session id) is still available to the caller.
async fn read_form(mut multipart: Multipart, form: &mut UploadForm) -> Result<(), TaskError> {
    let invalid = |e: axum::extract::multipart::MultipartError| {
        TaskError::invalid_input(format!("Failed to read upload form: {e}"))
    };

    while let Some(field) = multipart.next_field().await.map_err(invalid)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(invalid)?;
                form.file = Some((file_name, bytes));
            }
            "sessionId" | "channelId" => form.session_id = field.text().await.map_err(invalid)?,
            "userId" => form.user_id = field.text().await.map_err(invalid)?,
            "weblink" => form.weblink = field.text().await.map_err(invalid)?,
            "selectedTemplate" => form.template = Some(field.text().await.map_err(invalid)?),
            "selectedColors" => form.colors = Some(field.text().await.map_err(invalid)?),
            other => debug!(field = other, "Ignoring unknown upload field"),
        }
    }

    Ok(())
}

fn parse_optional<T: DeserializeOwned + Default>(raw: Option<&str>, field: &str) -> Result<T, TaskError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(T::default()),
        Some(raw) => serde_json::from_str(raw)
            .map_err(|e| TaskError::invalid_input(format!("{field} is not valid JSON: {e}"))),
    }
}

/// Validates an upload form into a processing request.
pub fn build_request(form: UploadForm, max_bytes: usize) -> Result<ProcessingRequest, TaskError> {
    let user_id = form.user_id.trim();
    let job_link = form.weblink.trim();
    if user_id.is_empty() {
        return Err(TaskError::invalid_input("userId is required"));
    }
    if job_link.is_empty() {
        return Err(TaskError::invalid_input("weblink is required"));
    }

    let (file_name, payload) = form
        .file
        .ok_or_else(|| TaskError::invalid_input("a resume file is required"))?;
    let kind = ContentKind::from_filename(&file_name)?;
    if payload.len() > max_bytes {
        return Err(TaskError::invalid_input(format!(
            "file is {} bytes, the limit is {max_bytes}",
            payload.len()
        )));
    }

    Ok(ProcessingRequest {
        session_id: form.session_id.trim().to_string(),
        user_id: user_id.to_string(),
        job_link: job_link.to_string(),
        file_name,
        kind,
        payload,
        template: parse_optional(form.template.as_deref(), "selectedTemplate")?,
        colors: parse_optional(form.colors.as_deref(), "selectedColors")?,
    })
}

/// POST /upload
///
/// Runs the whole tailoring flow inside the request. Dropping the request
/// (client disconnect) cancels the work through the drop guard.
pub async fn handle_upload(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut form = UploadForm::default();
    let read = read_form(multipart, &mut form).await;
    let session_id = form.session_id.trim().to_string();
    if let Err(e) = read {
        if !session_id.is_empty() {
            state
                .progress
                .publish(&session_id, ProgressEvent::failed(ProgressStep::Upload, &e));
        }
        return Err(e.into());
    }
    if session_id.is_empty() {
        return Err(AppError::Validation("sessionId is required".to_string()));
    }

    state
        .progress
        .publish(&session_id, ProgressEvent::active(ProgressStep::Upload));

    let request = match build_request(form, state.config.max_upload_bytes) {
        Ok(request) => request,
        Err(e) => {
            state
                .progress
                .publish(&session_id, ProgressEvent::failed(ProgressStep::Upload, &e));
            return Err(e.into());
        }
    };

    info!(
        session_id = %session_id,
        user_id = %request.user_id,
        file_name = %request.file_name,
        bytes = request.payload.len(),
        "Upload accepted"
    );
    state
        .progress
        .publish(&session_id, ProgressEvent::complete(ProgressStep::Upload));

    let cancel = CancellationToken::new();
    let _disconnect = cancel.clone().drop_guard();

    let outcome = state.tailoring.process(request, &cancel).await?;
    Ok(Json(outcome.into()))
}

/// GET /history/:user_id/:history_id
pub async fn handle_get_history(
    State(state): State<AppState>,
    Path((user_id, history_id)): Path<(String, String)>,
) -> Result<Json<Value>, AppError> {
    match state.tailoring.history(&user_id, &history_id).await? {
        Some(record) => Ok(Json(record)),
        None => Err(AppError::NotFound(format!("history record {history_id} not found"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::ErrorKind;

    fn form() -> UploadForm {
        UploadForm {
            session_id: "session-1".into(),
            user_id: " user-1 ".into(),
            weblink: "https://careersmw.com/jobs/1".into(),
            file: Some(("cv.pdf".into(), Bytes::from_static(b"%PDF-1.4"))),
            template: None,
            colors: Some(r##"{"primary": "#0f172a"}"##.into()),
        }
    }

    #[test]
    fn test_valid_form_builds_request() {
        let request = build_request(form(), 1024).unwrap();

        assert_eq!(request.user_id, "user-1");
        assert_eq!(request.kind, ContentKind::Pdf);
        assert_eq!(request.colors.primary, "#0f172a");
        assert_eq!(request.template.html_content, "");
    }

    #[test]
    fn test_missing_fields_are_invalid_input() {
        let mut no_user = form();
        no_user.user_id = "  ".into();
        assert_eq!(build_request(no_user, 1024).unwrap_err().kind, ErrorKind::InvalidInput);

        let mut no_link = form();
        no_link.weblink.clear();
        assert_eq!(build_request(no_link, 1024).unwrap_err().kind, ErrorKind::InvalidInput);

        let mut no_file = form();
        no_file.file = None;
        assert_eq!(build_request(no_file, 1024).unwrap_err().kind, ErrorKind::InvalidInput);
    }

    #[test]
    fn test_unsupported_file_type_is_rejected() {
        let mut upload = form();
        upload.file = Some(("cv.odt".into(), Bytes::from_static(b"odt")));

        let err = build_request(upload, 1024).unwrap_err();

        assert_eq!(err.kind, ErrorKind::InvalidInput);
        assert!(err.message.contains("unsupported file type"));
    }

    #[test]
    fn test_oversized_file_is_rejected() {
        let err = build_request(form(), 4).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidInput);
    }

    #[test]
    fn test_malformed_template_is_rejected() {
        let mut upload = form();
        upload.template = Some("{not json".into());

        let err = build_request(upload, 1024).unwrap_err();

        assert!(err.message.contains("selectedTemplate"));
    }
}
