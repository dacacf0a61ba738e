//! Text extraction collaborators: uploaded documents and job-posting pages.

pub mod document;
pub mod web;

pub use document::DocumentExtractor;
pub use web::WebFetcher;

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;

use crate::resilience::TaskError;

/// Declared kind of an uploaded resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Pdf,
    Docx,
    PlainText,
}

impl ContentKind {
    /// Resolves the kind from the uploaded file name's extension.
    pub fn from_filename(filename: &str) -> Result<Self, TaskError> {
        let extension = Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "pdf" => Ok(ContentKind::Pdf),
            "docx" => Ok(ContentKind::Docx),
            "txt" => Ok(ContentKind::PlainText),
            other => Err(TaskError::invalid_input(format!(
                "unsupported file type '.{other}', expected one of .pdf, .docx, .txt"
            ))),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ContentKind::Pdf => "pdf",
            ContentKind::Docx => "docx",
            ContentKind::PlainText => "txt",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ContentKind::Pdf => "application/pdf",
            ContentKind::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            ContentKind::PlainText => "text/plain; charset=utf-8",
        }
    }
}

/// Turns raw document bytes into plain text. Must be safe to call again with
/// the same input.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract_text(&self, bytes: Bytes, kind: ContentKind) -> Result<String, TaskError>;
}

/// Fetches the readable text behind a job-posting locator.
#[async_trait]
pub trait ReferenceFetcher: Send + Sync {
    async fn fetch_reference(&self, locator: &str) -> Result<String, TaskError>;
}
