//! The processing request flow: intake round, generation round, finalize.
//!
//! Every stage reports to the session's progress channel. The durable history
//! record is created once with placeholders and then merged exactly once more,
//! either with the generated documents or with the failure.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::archive::ResumeArchive;
use crate::extraction::{ReferenceFetcher, TextExtractor};
use crate::llm_client::prompts::json_system;
use crate::llm_client::StructuredCompletion;
use crate::orchestrator::{run_concurrent, Subtask};
use crate::progress::{ProgressEvent, ProgressRegistry, ProgressStep};
use crate::resilience::{execute_with_retry, with_timeout, RetryPolicy, TaskError};
use crate::store::DocumentStore;
use crate::tailoring::models::{
    completion_patch, failure_patch, history_collection, seed_record, GeneratedDocuments,
    JobDetails, ProcessingRequest, TailoringOutcome,
};
use crate::tailoring::prompts::{build_documents_message, DOCUMENTS_SYSTEM, JOB_DETAILS_SYSTEM};
use crate::tailoring::source::source_from_url;

/// Subtasks of the first round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IntakeRole {
    Resume,
    JobPosting,
}

/// Subtasks of the second round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum GenerationRole {
    Documents,
    JobDetails,
}

enum Generated {
    Documents(GeneratedDocuments),
    Details(JobDetails),
}

#[derive(Debug, Clone, Copy)]
pub struct TailoringSettings {
    pub retry: RetryPolicy,
    /// Bound on each extraction or fetch attempt.
    pub call_timeout: Duration,
    /// Bound on the whole request, enforced through cancellation.
    pub request_deadline: Duration,
}

pub struct TailoringService {
    pub store: Arc<dyn DocumentStore>,
    pub extractor: Arc<dyn TextExtractor>,
    pub fetcher: Arc<dyn ReferenceFetcher>,
    pub completion: StructuredCompletion,
    pub archive: Option<Arc<dyn ResumeArchive>>,
    pub progress: Arc<ProgressRegistry>,
    pub settings: TailoringSettings,
}

/// A stage failure: where it happened and why.
type StageError = (ProgressStep, TaskError);

impl TailoringService {
    /// The stored history record of one request, as the client reads it back.
    pub async fn history(
        &self,
        user_id: &str,
        history_id: &str,
    ) -> Result<Option<Value>, TaskError> {
        self.store
            .get(&history_collection(user_id), history_id)
            .await
            .map_err(|e| TaskError::from(e).context("reading history record"))
    }

    /// Runs one request to completion. `cancel` fires on client disconnect; the
    /// request deadline cancels a child of it.
    pub async fn process(
        &self,
        request: ProcessingRequest,
        cancel: &CancellationToken,
    ) -> Result<TailoringOutcome, TaskError> {
        let cancel = cancel.child_token();
        let _deadline = self.arm_deadline(&cancel, &request.session_id);

        let history_id = Uuid::new_v4().to_string();
        let collection = history_collection(&request.user_id);
        let session = request.session_id.as_str();

        self.progress
            .publish(session, ProgressEvent::active(ProgressStep::Processing));

        let seed = seed_record(&request.job_link, source_from_url(&request.job_link), Utc::now());
        if let Err(e) = self.store.create(&collection, &history_id, &seed).await {
            let err = TaskError::from(e).context("creating history record");
            self.progress
                .publish(session, ProgressEvent::failed(ProgressStep::Processing, &err));
            return Err(err);
        }

        match self
            .run_stages(&request, &collection, &history_id, &cancel)
            .await
        {
            Ok(outcome) => {
                info!(history_id = %history_id, user_id = %request.user_id, "Tailoring completed");
                Ok(outcome)
            }
            Err((step, err)) => {
                self.record_failure(session, &collection, &history_id, step, &err)
                    .await;
                Err(err)
            }
        }
    }

    async fn run_stages(
        &self,
        request: &ProcessingRequest,
        collection: &str,
        history_id: &str,
        cancel: &CancellationToken,
    ) -> Result<TailoringOutcome, StageError> {
        let session = request.session_id.as_str();

        let (resume_text, job_posting) = self
            .intake(request, cancel)
            .await
            .map_err(|e| (ProgressStep::Processing, e))?;
        self.progress
            .publish(session, ProgressEvent::complete(ProgressStep::Processing));

        self.progress
            .publish(session, ProgressEvent::active(ProgressStep::Analysis));
        let (documents, mut details) = self
            .generate(request, &resume_text, &job_posting, cancel)
            .await
            .map_err(|e| (ProgressStep::Analysis, e))?;
        self.progress
            .publish(session, ProgressEvent::complete(ProgressStep::Analysis));

        self.progress
            .publish(session, ProgressEvent::active(ProgressStep::Finalizing));
        if details.source.trim().is_empty() {
            details.source = source_from_url(&request.job_link).to_string();
        }
        let resume_path = self.archive_resume(request, history_id).await;

        let patch = completion_patch(&resume_text, &resume_path, &documents, &details, Utc::now());
        self.store
            .merge(collection, history_id, &patch)
            .await
            .map_err(|e| {
                (
                    ProgressStep::Finalizing,
                    TaskError::from(e).context("saving generated documents"),
                )
            })?;

        self.progress.publish(
            session,
            ProgressEvent::complete(ProgressStep::Finalizing).with_message("Your documents are ready!"),
        );

        Ok(TailoringOutcome {
            history_id: history_id.to_string(),
            documents,
            details,
        })
    }

    /// Round one: resume text and job posting, side by side.
    async fn intake(
        &self,
        request: &ProcessingRequest,
        cancel: &CancellationToken,
    ) -> Result<(String, String), TaskError> {
        let policy = self.settings.retry;
        let timeout = self.settings.call_timeout;

        let resume: Subtask<String> = {
            let extractor = Arc::clone(&self.extractor);
            let payload = request.payload.clone();
            let kind = request.kind;
            let cancel = cancel.clone();
            async move {
                execute_with_retry(&policy, &cancel, "resume extraction", || {
                    with_timeout(
                        timeout,
                        "resume extraction",
                        extractor.extract_text(payload.clone(), kind),
                    )
                })
                .await
            }
            .boxed()
        };

        let job_posting: Subtask<String> = {
            let fetcher = Arc::clone(&self.fetcher);
            let link = request.job_link.clone();
            let cancel = cancel.clone();
            async move {
                execute_with_retry(&policy, &cancel, "job posting fetch", || {
                    with_timeout(timeout, "job posting fetch", fetcher.fetch_reference(&link))
                })
                .await
            }
            .boxed()
        };

        let subtasks = BTreeMap::from([
            (IntakeRole::Resume, resume),
            (IntakeRole::JobPosting, job_posting),
        ]);
        let mut values = run_concurrent("intake", subtasks, cancel)
            .await
            .into_values()?;

        Ok((
            values.take(IntakeRole::Resume)?,
            values.take(IntakeRole::JobPosting)?,
        ))
    }

    /// Round two: tailored documents and job metadata, side by side.
    async fn generate(
        &self,
        request: &ProcessingRequest,
        resume_text: &str,
        job_posting: &str,
        cancel: &CancellationToken,
    ) -> Result<(GeneratedDocuments, JobDetails), TaskError> {
        let policy = self.settings.retry;

        let documents: Subtask<Generated> = {
            let completion = self.completion.clone();
            let system = json_system(DOCUMENTS_SYSTEM);
            let user = build_documents_message(
                job_posting,
                resume_text,
                &request.template.html_content,
                &request.colors,
            );
            let cancel = cancel.clone();
            async move {
                completion
                    .complete::<GeneratedDocuments>("documents", &system, &user, &policy, &cancel)
                    .await
                    .map(Generated::Documents)
            }
            .boxed()
        };

        let details: Subtask<Generated> = {
            let completion = self.completion.clone();
            let system = json_system(JOB_DETAILS_SYSTEM);
            let user = job_posting.to_string();
            let cancel = cancel.clone();
            async move {
                completion
                    .complete::<JobDetails>("job_details", &system, &user, &policy, &cancel)
                    .await
                    .map(Generated::Details)
            }
            .boxed()
        };

        let subtasks = BTreeMap::from([
            (GenerationRole::Documents, documents),
            (GenerationRole::JobDetails, details),
        ]);
        let mut values = run_concurrent("generation", subtasks, cancel)
            .await
            .into_values()?;

        match (
            values.take(GenerationRole::Documents)?,
            values.take(GenerationRole::JobDetails)?,
        ) {
            (Generated::Documents(documents), Generated::Details(details)) => {
                Ok((documents, details))
            }
            _ => Err(TaskError::unrecoverable("generation results arrived under the wrong role")),
        }
    }

    /// Archiving is best effort: a failure leaves `resumePath` empty.
    async fn archive_resume(&self, request: &ProcessingRequest, history_id: &str) -> String {
        let Some(archive) = &self.archive else {
            return String::new();
        };

        let stored = with_timeout(
            self.settings.call_timeout,
            "resume archive",
            archive.store_resume(
                &request.user_id,
                history_id,
                request.kind,
                request.payload.clone(),
            ),
        )
        .await;

        match stored {
            Ok(key) => key,
            Err(e) => {
                warn!(history_id, error = %e, "Failed to archive resume");
                String::new()
            }
        }
    }

    async fn record_failure(
        &self,
        session: &str,
        collection: &str,
        history_id: &str,
        step: ProgressStep,
        err: &TaskError,
    ) {
        if err.is_cancelled() {
            info!(history_id, step = ?step, "Tailoring cancelled");
        } else {
            warn!(history_id, step = ?step, kind = %err.kind, error = %err.message, "Tailoring failed");
        }

        self.progress
            .publish(session, ProgressEvent::failed(step, err));

        let patch = failure_patch(err, Utc::now());
        if let Err(e) = self.store.merge(collection, history_id, &patch).await {
            error!(history_id, error = %e, "Failed to mark history record as failed");
        }
    }

    /// Cancels `cancel` once the request deadline passes. The returned guard
    /// stops the timer when the request finishes first.
    fn arm_deadline(
        &self,
        cancel: &CancellationToken,
        session: &str,
    ) -> tokio_util::sync::DropGuard {
        let limit = self.settings.request_deadline;
        let timer = CancellationToken::new();
        let stop = timer.clone();
        let deadline = cancel.clone();
        let session = session.to_string();

        tokio::spawn(async move {
            tokio::select! {
                _ = stop.cancelled() => {}
                _ = tokio::time::sleep(limit) => {
                    warn!(session_id = %session, deadline_secs = limit.as_secs(), "Request deadline exceeded");
                    deadline.cancel();
                }
            }
        });

        timer.drop_guard()
    }
}
