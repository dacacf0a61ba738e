pub mod handlers;
pub mod registry;

pub use registry::ProgressRegistry;

use serde::Serialize;

use crate::resilience::{ErrorKind, TaskError};

/// Stage of a processing request, as reported to the subscribed client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStep {
    Upload,
    Processing,
    Analysis,
    Finalizing,
    Heartbeat,
    Connection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Active,
    Complete,
    Failed,
}

/// One state transition on the progress stream. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub step: ProgressStep,
    pub status: ProgressStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(rename = "errorKind", skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl ProgressEvent {
    pub fn new(step: ProgressStep, status: ProgressStatus) -> Self {
        Self {
            step,
            status,
            message: None,
            error_kind: None,
        }
    }

    pub fn active(step: ProgressStep) -> Self {
        Self::new(step, ProgressStatus::Active)
    }

    pub fn complete(step: ProgressStep) -> Self {
        Self::new(step, ProgressStatus::Complete)
    }

    pub fn failed(step: ProgressStep, err: &TaskError) -> Self {
        Self {
            step,
            status: ProgressStatus::Failed,
            message: Some(err.message.clone()),
            error_kind: Some(err.kind),
        }
    }

    pub fn heartbeat() -> Self {
        Self::active(ProgressStep::Heartbeat).with_message("Connection alive")
    }

    pub fn connected() -> Self {
        Self::complete(ProgressStep::Connection).with_message("Connected to progress stream")
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}
