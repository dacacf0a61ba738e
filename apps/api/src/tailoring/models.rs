use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::extraction::ContentKind;
use crate::resilience::TaskError;

// ────────────────────────────────────────────────────────────────────────────
// Request types
// ────────────────────────────────────────────────────────────────────────────

/// Document template chosen by the user. Only `html_content` reaches the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Template {
    pub id: String,
    pub name: String,
    pub category: String,
    pub description: String,
    pub html_content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Colors {
    pub id: String,
    pub name: String,
    pub primary: String,
    pub secondary: String,
    pub accent: String,
    pub text: String,
}

/// One inbound tailoring request. Immutable once built.
#[derive(Debug, Clone)]
pub struct ProcessingRequest {
    pub session_id: String,
    pub user_id: String,
    pub job_link: String,
    pub file_name: String,
    pub kind: ContentKind,
    pub payload: Bytes,
    pub template: Template,
    pub colors: Colors,
}

// ────────────────────────────────────────────────────────────────────────────
// Generation outputs
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedDocuments {
    #[serde(rename = "generated_resume")]
    pub resume: String,
    #[serde(rename = "generated_cover_letter")]
    pub cover_letter: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDetails {
    pub title: String,
    #[serde(rename = "company_name")]
    pub company: String,
    #[serde(rename = "source_site", default)]
    pub source: String,
}

/// Everything a completed request produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TailoringOutcome {
    pub history_id: String,
    pub documents: GeneratedDocuments,
    pub details: JobDetails,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub resume: String,
    pub cover_letter: String,
    pub history_id: String,
    pub job_title: String,
    pub job_company: String,
}

impl From<TailoringOutcome> for UploadResponse {
    fn from(outcome: TailoringOutcome) -> Self {
        Self {
            success: true,
            resume: outcome.documents.resume,
            cover_letter: outcome.documents.cover_letter,
            history_id: outcome.history_id,
            job_title: outcome.details.title,
            job_company: outcome.details.company,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Durable history record
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryStatus {
    Processing,
    Completed,
    Failed,
}

pub const PLACEHOLDER: &str = "Processing...";

pub fn history_collection(user_id: &str) -> String {
    format!("users/{user_id}/history")
}

/// The record as created when a request starts.
pub fn seed_record(job_link: &str, source: &str, now: DateTime<Utc>) -> Value {
    json!({
        "status": HistoryStatus::Processing,
        "original": {
            "jobLink": job_link,
            "resumePath": "",
        },
        "jobDetails": {
            "title": PLACEHOLDER,
            "company": PLACEHOLDER,
            "source": source,
        },
        "createdAt": now,
    })
}

pub fn completion_patch(
    resume_text: &str,
    resume_path: &str,
    documents: &GeneratedDocuments,
    details: &JobDetails,
    now: DateTime<Utc>,
) -> Value {
    json!({
        "status": HistoryStatus::Completed,
        "original": {
            "resumeText": resume_text,
            "resumePath": resume_path,
        },
        "generated": {
            "resumeText": documents.resume,
            "coverLetterText": documents.cover_letter,
        },
        "jobDetails": {
            "title": details.title,
            "company": details.company,
            "source": details.source,
        },
        "completedAt": now,
    })
}

pub fn failure_patch(err: &TaskError, now: DateTime<Utc>) -> Value {
    json!({
        "status": HistoryStatus::Failed,
        "failure": {
            "kind": err.kind,
            "message": err.message,
        },
        "failedAt": now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_details_source_is_optional() {
        let details: JobDetails =
            serde_json::from_str(r#"{"title":"Data Scientist Acme Corp","company_name":"Acme Corp"}"#)
                .unwrap();
        assert_eq!(details.company, "Acme Corp");
        assert!(details.source.is_empty());
    }

    #[test]
    fn test_template_fields_default_when_missing() {
        let template: Template = serde_json::from_str(r#"{"htmlContent":"<html></html>"}"#).unwrap();
        assert_eq!(template.html_content, "<html></html>");
        assert!(template.name.is_empty());
    }

    #[test]
    fn test_seed_record_has_placeholders() {
        let record = seed_record("https://glassdoor.com/job/1", "Glassdoor", Utc::now());
        assert_eq!(record["status"], "processing");
        assert_eq!(record["jobDetails"]["title"], PLACEHOLDER);
        assert_eq!(record["jobDetails"]["source"], "Glassdoor");
        assert_eq!(record["original"]["resumePath"], "");
    }

    #[test]
    fn test_upload_response_is_camel_case() {
        let response = UploadResponse::from(TailoringOutcome {
            history_id: "h1".into(),
            documents: GeneratedDocuments {
                resume: "<html>r</html>".into(),
                cover_letter: "<html>c</html>".into(),
            },
            details: JobDetails {
                title: "Nurse".into(),
                company: "Kamuzu Central Hospital".into(),
                source: "Other".into(),
            },
        });
        let json = serde_json::to_value(response).unwrap();
        assert_eq!(json["coverLetter"], "<html>c</html>");
        assert_eq!(json["historyId"], "h1");
        assert_eq!(json["jobCompany"], "Kamuzu Central Hospital");
    }
}
