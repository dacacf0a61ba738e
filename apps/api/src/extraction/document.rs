use std::io::{Cursor, Read};

use async_trait::async_trait;
use bytes::Bytes;
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::debug;

use crate::extraction::{ContentKind, TextExtractor};
use crate::resilience::TaskError;

const DOCX_BODY: &str = "word/document.xml";

/// Extracts text from PDF, DOCX and plain-text uploads. Parsing runs on the
/// blocking pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentExtractor;

#[async_trait]
impl TextExtractor for DocumentExtractor {
    async fn extract_text(&self, bytes: Bytes, kind: ContentKind) -> Result<String, TaskError> {
        if bytes.is_empty() {
            return Err(TaskError::invalid_input("uploaded document is empty"));
        }

        let size = bytes.len();
        let text = tokio::task::spawn_blocking(move || match kind {
            ContentKind::Pdf => pdf_text(&bytes),
            ContentKind::Docx => docx_text(&bytes),
            ContentKind::PlainText => plain_text(&bytes),
        })
        .await
        .map_err(|e| TaskError::unrecoverable(format!("extraction task failed: {e}")))??;

        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(TaskError::unrecoverable(format!(
                "no text could be extracted from the {} document",
                kind.extension()
            )));
        }

        debug!(kind = kind.extension(), bytes = size, chars = text.len(), "Extracted document text");
        Ok(text)
    }
}

fn pdf_text(bytes: &[u8]) -> Result<String, TaskError> {
    pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| TaskError::unrecoverable(format!("failed to parse PDF: {e}")))
}

fn plain_text(bytes: &[u8]) -> Result<String, TaskError> {
    String::from_utf8(bytes.to_vec())
        .map_err(|_| TaskError::unrecoverable("text file is not valid UTF-8"))
}

/// Reads the paragraphs of a DOCX body, one line per paragraph.
fn docx_text(bytes: &[u8]) -> Result<String, TaskError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| TaskError::unrecoverable(format!("failed to open DOCX archive: {e}")))?;

    let mut xml = String::new();
    archive
        .by_name(DOCX_BODY)
        .map_err(|e| TaskError::unrecoverable(format!("DOCX has no {DOCX_BODY}: {e}")))?
        .read_to_string(&mut xml)
        .map_err(|e| TaskError::unrecoverable(format!("failed to read {DOCX_BODY}: {e}")))?;

    let mut reader = Reader::from_str(&xml);
    let mut text = String::new();
    let mut in_run_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(tag)) if tag.name().as_ref() == b"w:t" => in_run_text = true,
            Ok(Event::End(tag)) => match tag.name().as_ref() {
                b"w:t" => in_run_text = false,
                b"w:p" => text.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(tag)) => match tag.name().as_ref() {
                b"w:tab" => text.push('\t'),
                b"w:br" => text.push('\n'),
                _ => {}
            },
            Ok(Event::Text(run)) if in_run_text => {
                let unescaped = run
                    .unescape()
                    .map_err(|e| TaskError::unrecoverable(format!("malformed DOCX text: {e}")))?;
                text.push_str(&unescaped);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(TaskError::unrecoverable(format!(
                    "malformed DOCX XML at position {}: {e}",
                    reader.buffer_position()
                )))
            }
            _ => {}
        }
    }

    Ok(text)
}
