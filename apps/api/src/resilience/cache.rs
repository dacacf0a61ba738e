use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::resilience::error::TaskError;
use crate::resilience::identity::identity_of;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Instant,
}

/// In-memory memo of generation outputs keyed by content identity.
///
/// Entries expire `ttl` after they were written. Expired entries are evicted
/// lazily on lookup; there is no background sweep. Concurrent misses for the
/// same key may both compute; the last write wins.
#[derive(Debug)]
pub struct ResultCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl ResultCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Stable key for an (operation, input) pair.
    pub fn key_for(operation: &str, input: &str) -> Result<String, TaskError> {
        let id = identity_of(&format!("{operation}\n{input}"))?;
        Ok(format!("{operation}:{id}"))
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.lock();
        let now = Instant::now();

        match entries.get(key) {
            Some(entry) if now > entry.expires_at => {
                entries.remove(key);
                debug!(key, "Cache entry expired");
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        let entry = CacheEntry {
            value: value.into(),
            expires_at: Instant::now() + self.ttl,
        };
        self.lock().insert(key.into(), entry);
    }

    /// Number of stored entries, including ones that have expired but not yet
    /// been looked up.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        // A panic while holding the lock cannot leave a half-written entry.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_get_returns_value_before_ttl() {
        let cache = ResultCache::new(Duration::from_secs(60));
        cache.set("k", "v");

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(cache.get("k").as_deref(), Some("v"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_evicted_on_lookup() {
        let cache = ResultCache::new(Duration::from_secs(60));
        cache.set("k", "v");

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_overwrites_and_refreshes_expiry() {
        let cache = ResultCache::new(Duration::from_secs(10));
        cache.set("k", "old");
        tokio::time::advance(Duration::from_secs(8)).await;
        cache.set("k", "new");
        tokio::time::advance(Duration::from_secs(8)).await;

        assert_eq!(cache.get("k").as_deref(), Some("new"));
    }

    #[test]
    fn test_missing_key_is_none() {
        let cache = ResultCache::new(Duration::from_secs(1));
        assert_eq!(cache.get("absent"), None);
    }

    #[test]
    fn test_key_for_separates_operations() {
        let a = ResultCache::key_for("documents", "same input").unwrap();
        let b = ResultCache::key_for("job_details", "same input").unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with("documents:"));
        assert_eq!(a, ResultCache::key_for("documents", "same input").unwrap());
    }
}
