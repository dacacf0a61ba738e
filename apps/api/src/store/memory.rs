use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use super::{merge_json, DocumentStore, PendingCreate, StoreError};

/// In-process `DocumentStore` for tests, with switches to inject failures.
#[derive(Default)]
pub struct MemoryStore {
    documents: Mutex<BTreeMap<(String, String), Value>>,
    fail_commits: AtomicBool,
    fail_lookups_for: Mutex<HashSet<String>>,
    rejected_ids: Mutex<HashSet<String>>,
    lookups: AtomicUsize,
}

impl MemoryStore {
    pub fn fail_commits(&self) {
        self.fail_commits.store(true, Ordering::SeqCst);
    }

    pub fn fail_lookups_for(&self, collection: &str) {
        self.fail_lookups_for
            .lock()
            .unwrap()
            .insert(collection.to_string());
    }

    /// Makes a bulk commit reject the write for `id` while the rest of the
    /// batch goes through.
    pub fn reject_writes_for(&self, id: &str) {
        self.rejected_ids.lock().unwrap().insert(id.to_string());
    }

    pub fn count(&self, collection: &str) -> usize {
        self.documents
            .lock()
            .unwrap()
            .keys()
            .filter(|(c, _)| c == collection)
            .count()
    }

    pub fn total(&self) -> usize {
        self.documents.lock().unwrap().len()
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn document(&self, collection: &str, id: &str) -> Option<Value> {
        self.documents
            .lock()
            .unwrap()
            .get(&(collection.to_string(), id.to_string()))
            .cloned()
    }

    /// The first document stored under `collection`, for tests that do not
    /// know the generated id.
    pub fn document_in(&self, collection: &str) -> Option<Value> {
        self.documents
            .lock()
            .unwrap()
            .iter()
            .find(|((c, _), _)| c == collection)
            .map(|(_, value)| value.clone())
    }

    fn key(collection: &str, id: &str) -> (String, String) {
        (collection.to_string(), id.to_string())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create(&self, collection: &str, id: &str, data: &Value) -> Result<(), StoreError> {
        let mut documents = self.documents.lock().unwrap();
        let key = Self::key(collection, id);
        if documents.contains_key(&key) {
            return Err(StoreError::AlreadyExists {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
        documents.insert(key, data.clone());
        Ok(())
    }

    async fn merge(&self, collection: &str, id: &str, patch: &Value) -> Result<(), StoreError> {
        let mut documents = self.documents.lock().unwrap();
        let document = documents
            .get_mut(&Self::key(collection, id))
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;
        merge_json(document, patch);
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.document(collection, id))
    }

    async fn existing_ids(
        &self,
        collection: &str,
        ids: &[String],
    ) -> Result<HashSet<String>, StoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_lookups_for.lock().unwrap().contains(collection) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }

        let documents = self.documents.lock().unwrap();
        Ok(ids
            .iter()
            .filter(|id| documents.contains_key(&Self::key(collection, id)))
            .cloned()
            .collect())
    }

    async fn commit_creates(
        &self,
        writes: &[PendingCreate],
    ) -> Result<Vec<Result<(), StoreError>>, StoreError> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolClosed));
        }

        let mut results = Vec::with_capacity(writes.len());
        for write in writes {
            if self.rejected_ids.lock().unwrap().contains(&write.id) {
                results.push(Err(StoreError::Database(sqlx::Error::Protocol(format!(
                    "cannot store {}/{}",
                    write.collection, write.id
                )))));
                continue;
            }
            results.push(self.create(&write.collection, &write.id, &write.data).await);
        }
        Ok(results)
    }
}
