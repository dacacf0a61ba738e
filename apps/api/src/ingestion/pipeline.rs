//! Deduplicating bulk ingestion of scraped job listings.
//!
//! A listing's document id is the content identity of its link, so the same
//! listing scraped twice lands on the same id. Records are deduplicated within
//! the batch, checked against the store once per source partition, enriched
//! with bounded concurrency and queued as create-only writes. Every per-record
//! problem is logged, counted and skipped; only a failed flush fails the call.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::{stream, StreamExt};
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::ingestion::enrichment::{is_placeholder_description, placeholder_details, ListingEnricher};
use crate::ingestion::models::{listing_document, parse_listing_date, IngestRecord, ListingDetails};
use crate::resilience::{execute_with_retry, identity_of, with_timeout, ContentId, RetryPolicy, TaskError};
use crate::store::{BulkWriter, DocumentStore, PendingCreate, StoreError};

/// Partition for listings that arrive without a source.
pub const DEFAULT_PARTITION: &str = "unknown_source";

pub fn listings_collection(source: &str) -> String {
    format!("jobs/{source}/listings")
}

fn partition_key(source: &str) -> String {
    match source.trim() {
        "" => DEFAULT_PARTITION.to_string(),
        source => source.to_string(),
    }
}

/// What happened to each record of one batch.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub received: usize,
    /// Missing link or company name.
    pub invalid: usize,
    pub duplicates_in_batch: usize,
    pub already_stored: usize,
    /// Records skipped because their partition's existence lookup failed.
    pub lookup_failures: usize,
    pub enrichment_failures: usize,
    pub queue_failures: usize,
    /// Records queued for writing.
    pub succeeded: usize,
    /// Queued records the store rejected at flush time.
    pub write_failures: usize,
    pub partitions: usize,
}

/// The batch could not be committed. `report` describes how far it got.
#[derive(Debug, Error)]
#[error("flushing {} queued listings failed: {cause}", .report.succeeded)]
pub struct IngestError {
    pub report: IngestReport,
    #[source]
    pub cause: StoreError,
}

#[derive(Debug, Clone, Copy)]
pub struct IngestSettings {
    pub retry: RetryPolicy,
    pub call_timeout: Duration,
    pub enrichment_concurrency: usize,
}

struct Candidate {
    id: ContentId,
    record: IngestRecord,
}

pub struct IngestionPipeline {
    pub store: Arc<dyn DocumentStore>,
    pub enricher: Arc<dyn ListingEnricher>,
    pub settings: IngestSettings,
}

impl IngestionPipeline {
    pub async fn ingest(
        &self,
        records: Vec<IngestRecord>,
        cancel: &CancellationToken,
    ) -> Result<IngestReport, IngestError> {
        let mut report = IngestReport {
            received: records.len(),
            ..IngestReport::default()
        };

        let partitions = Self::partition(records, &mut report);
        report.partitions = partitions.len();

        let mut writer = BulkWriter::new(Arc::clone(&self.store));
        for (source, candidates) in partitions {
            self.ingest_partition(&source, candidates, &mut writer, &mut report, cancel)
                .await;
        }

        match writer.flush().await {
            Ok(flushed) => {
                report.write_failures = flushed.failed.len();
                info!(
                    received = report.received,
                    succeeded = report.succeeded,
                    already_stored = report.already_stored,
                    skipped = report.invalid
                        + report.lookup_failures
                        + report.enrichment_failures
                        + report.queue_failures,
                    write_failures = report.write_failures,
                    "Listing batch ingested"
                );
                Ok(report)
            }
            Err(cause) => {
                error!(queued = report.succeeded, error = %cause, "Listing batch flush failed");
                Err(IngestError { report, cause })
            }
        }
    }

    /// Drops records without a link or company name and repeats within the
    /// batch, then groups the rest by source. Only a valid record claims its
    /// identity, so a later well-formed copy of a rejected one is kept.
    fn partition(
        records: Vec<IngestRecord>,
        report: &mut IngestReport,
    ) -> BTreeMap<String, Vec<Candidate>> {
        let mut seen = HashSet::new();
        let mut partitions: BTreeMap<String, Vec<Candidate>> = BTreeMap::new();

        for record in records {
            let id = match identity_of(&record.link) {
                Ok(id) => id,
                Err(e) => {
                    warn!(position = %record.position, error = %e, "Skipping listing without a link");
                    report.invalid += 1;
                    continue;
                }
            };
            if record.company_name.trim().is_empty() {
                warn!(link = %record.link, "Skipping listing without a company name");
                report.invalid += 1;
                continue;
            }
            if !seen.insert(id.clone()) {
                debug!(link = %record.link, "Skipping listing repeated within the batch");
                report.duplicates_in_batch += 1;
                continue;
            }

            partitions
                .entry(partition_key(&record.source))
                .or_default()
                .push(Candidate { id, record });
        }

        partitions
    }

    async fn ingest_partition(
        &self,
        source: &str,
        candidates: Vec<Candidate>,
        writer: &mut BulkWriter,
        report: &mut IngestReport,
        cancel: &CancellationToken,
    ) {
        let collection = listings_collection(source);

        let ids: Vec<String> = candidates
            .iter()
            .map(|candidate| candidate.id.as_str().to_string())
            .collect();
        let existing = match self.store.existing_ids(&collection, &ids).await {
            Ok(existing) => existing,
            Err(e) => {
                warn!(
                    source,
                    skipped = candidates.len(),
                    error = %e,
                    "Existence lookup failed, skipping partition"
                );
                report.lookup_failures += candidates.len();
                return;
            }
        };

        let mut fresh = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if existing.contains(candidate.id.as_str()) {
                report.already_stored += 1;
            } else {
                if candidate.record.position.trim().is_empty() {
                    warn!(link = %candidate.record.link, "Listing has no position");
                }
                fresh.push(candidate);
            }
        }

        let concurrency = self.settings.enrichment_concurrency.max(1);
        let enriched: Vec<(Candidate, Result<ListingDetails, TaskError>)> = stream::iter(fresh)
            .map(|candidate| async move {
                let details = self.enrich(&candidate.record, cancel).await;
                (candidate, details)
            })
            .buffered(concurrency)
            .collect()
            .await;

        let uploaded_at = Utc::now();
        for (candidate, details) in enriched {
            let details = match details {
                Ok(details) => details,
                Err(e) => {
                    if e.is_cancelled() {
                        debug!(link = %candidate.record.link, "Enrichment cancelled");
                    } else {
                        warn!(link = %candidate.record.link, error = %e, "Enrichment failed, skipping listing");
                    }
                    report.enrichment_failures += 1;
                    continue;
                }
            };

            let record = &candidate.record;
            let document = listing_document(
                record,
                &details,
                listing_date(record, "datePosted", &record.date_posted),
                listing_date(record, "applicationDeadline", &record.application_deadline),
                uploaded_at,
            );

            let queued = writer.queue(PendingCreate {
                collection: collection.clone(),
                id: candidate.id.into_string(),
                data: document,
            });
            match queued {
                Ok(()) => report.succeeded += 1,
                Err(e) => {
                    warn!(source, error = %e, "Could not queue listing");
                    report.queue_failures += 1;
                }
            }
        }
    }

    async fn enrich(
        &self,
        record: &IngestRecord,
        cancel: &CancellationToken,
    ) -> Result<ListingDetails, TaskError> {
        if is_placeholder_description(&record.job_description) {
            return Ok(placeholder_details());
        }

        let timeout = self.settings.call_timeout;
        execute_with_retry(&self.settings.retry, cancel, "listing enrichment", || {
            with_timeout(
                timeout,
                "listing enrichment",
                self.enricher.enrich(&record.job_description),
            )
        })
        .await
    }
}

/// Unparseable dates are stored as null rather than rejecting the listing.
fn listing_date(record: &IngestRecord, field: &str, raw: &str) -> Option<DateTime<Utc>> {
    parse_listing_date(raw).unwrap_or_else(|e| {
        warn!(link = %record.link, field, error = %e, "Storing listing date as null");
        None
    })
}
