use async_trait::async_trait;
use serde_json::{json, Value};

use crate::ingestion::models::ListingDetails;
use crate::ingestion::prompts::LISTING_DETAILS_SYSTEM;
use crate::llm_client::prompts::json_system;
use crate::llm_client::StructuredCompletion;
use crate::resilience::TaskError;

/// Turns a free-text job description into structured details. One attempt
/// per call; the pipeline owns retrying.
#[async_trait]
pub trait ListingEnricher: Send + Sync {
    async fn enrich(&self, description: &str) -> Result<ListingDetails, TaskError>;
}

const PLACEHOLDER_DESCRIPTIONS: &[&str] = &["", "N/A", "No description found"];

/// Scrapers emit these when a listing had no readable description.
pub fn is_placeholder_description(description: &str) -> bool {
    PLACEHOLDER_DESCRIPTIONS.contains(&description.trim())
}

/// Details for a listing with nothing to extract from.
pub fn placeholder_details() -> ListingDetails {
    let na = || json!("N/A");
    ListingDetails {
        job_title: na(),
        organization: na(),
        grade: na(),
        reporting_to: na(),
        responsible_for: json!([]),
        department: na(),
        purpose: na(),
        key_responsibilities: json!([]),
        required_qualifications: json!([]),
        required_experience: na(),
        required_memberships: json!([]),
        contact_details: na(),
        additional_notes: na(),
        tags: json!([]),
        industry: na(),
        domain: na(),
    }
}

pub struct LlmListingEnricher {
    completion: StructuredCompletion,
}

impl LlmListingEnricher {
    pub fn new(completion: StructuredCompletion) -> Self {
        Self { completion }
    }
}

#[async_trait]
impl ListingEnricher for LlmListingEnricher {
    async fn enrich(&self, description: &str) -> Result<ListingDetails, TaskError> {
        let system = json_system(LISTING_DETAILS_SYSTEM);
        let raw = self
            .completion
            .complete_once::<serde_json::Map<String, Value>>("listing_details", &system, description)
            .await?;

        let details: ListingDetails = serde_json::from_str(&raw).map_err(|e| {
            TaskError::transient(format!("listing_details returned an unexpected shape: {e}"))
        })?;
        Ok(details.normalized())
    }
}
