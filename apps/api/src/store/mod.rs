//! Durable document store: JSON documents addressed by `(collection, id)`.

#[cfg(test)]
pub mod memory;
pub mod postgres;

pub use postgres::PgDocumentStore;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::resilience::{ErrorKind, TaskError};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document {collection}/{id} already exists")]
    AlreadyExists { collection: String, id: String },

    #[error("document {collection}/{id} not found")]
    NotFound { collection: String, id: String },

    #[error("a write for {collection}/{id} is already queued")]
    DuplicateQueued { collection: String, id: String },

    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::AlreadyExists { .. }
            | StoreError::DuplicateQueued { .. }
            | StoreError::InvalidDocument(_) => ErrorKind::InvalidInput,
            StoreError::NotFound { .. } | StoreError::Serialization(_) => {
                ErrorKind::Unrecoverable
            }
            StoreError::Database(
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed,
            ) => ErrorKind::Transient,
            StoreError::Database(_) => ErrorKind::Unrecoverable,
        }
    }
}

impl From<StoreError> for TaskError {
    fn from(err: StoreError) -> Self {
        TaskError::new(err.kind(), err.to_string())
    }
}

/// A create-only write waiting in a `BulkWriter`.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCreate {
    pub collection: String,
    pub id: String,
    pub data: Value,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fails with `AlreadyExists` when the id is taken.
    async fn create(&self, collection: &str, id: &str, data: &Value) -> Result<(), StoreError>;

    /// Deep-merges `patch` into an existing document.
    async fn merge(&self, collection: &str, id: &str, patch: &Value) -> Result<(), StoreError>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError>;

    /// Which of `ids` already exist in `collection`, in one round trip.
    async fn existing_ids(
        &self,
        collection: &str,
        ids: &[String],
    ) -> Result<HashSet<String>, StoreError>;

    /// Commits every create together. The outer error means nothing was
    /// committed; the inner results report each write on its own.
    async fn commit_creates(
        &self,
        writes: &[PendingCreate],
    ) -> Result<Vec<Result<(), StoreError>>, StoreError>;
}

/// Outcome of one `BulkWriter::flush`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FlushReport {
    pub written: usize,
    /// `collection/id` of each write the store rejected.
    pub failed: Vec<String>,
}

/// Collects create-only writes and commits them in one go.
pub struct BulkWriter {
    store: Arc<dyn DocumentStore>,
    pending: Vec<PendingCreate>,
    targets: HashSet<(String, String)>,
}

impl BulkWriter {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            pending: Vec::new(),
            targets: HashSet::new(),
        }
    }

    pub fn queue(&mut self, write: PendingCreate) -> Result<(), StoreError> {
        if write.id.trim().is_empty() || write.collection.trim().is_empty() {
            return Err(StoreError::InvalidDocument(
                "collection and id must not be empty".to_string(),
            ));
        }
        if !write.data.is_object() {
            return Err(StoreError::InvalidDocument(format!(
                "{}/{} is not a JSON object",
                write.collection, write.id
            )));
        }

        let target = (write.collection.clone(), write.id.clone());
        if !self.targets.insert(target) {
            return Err(StoreError::DuplicateQueued {
                collection: write.collection,
                id: write.id,
            });
        }

        self.pending.push(write);
        Ok(())
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Commits everything queued. Individual rejections are logged and
    /// reported; only a failure of the commit itself is an error.
    pub async fn flush(&mut self) -> Result<FlushReport, StoreError> {
        let writes = std::mem::take(&mut self.pending);
        self.targets.clear();
        if writes.is_empty() {
            return Ok(FlushReport::default());
        }

        let outcomes = self.store.commit_creates(&writes).await?;

        let mut report = FlushReport::default();
        for (write, outcome) in writes.iter().zip(outcomes) {
            match outcome {
                Ok(()) => report.written += 1,
                Err(e) => {
                    warn!(
                        collection = %write.collection,
                        id = %write.id,
                        error = %e,
                        "Bulk write rejected"
                    );
                    report.failed.push(format!("{}/{}", write.collection, write.id));
                }
            }
        }

        info!(
            written = report.written,
            failed = report.failed.len(),
            "Bulk writer flushed"
        );
        Ok(report)
    }
}

/// Recursively merges `patch` into `target`. Objects merge key by key; any
/// other value replaces what was there.
pub fn merge_json(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                match target.get_mut(key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        target.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}
