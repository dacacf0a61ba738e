use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::llm_client::{extract_json_object, GenerationService};
use crate::resilience::{execute_with_retry, with_timeout, ResultCache, RetryPolicy, TaskError};

/// JSON-returning generation calls with per-call timeout, retry and a shared
/// result cache.
///
/// Output that does not parse as `T` counts as a transient failure, so a
/// malformed answer is retried like a dropped connection would be.
#[derive(Clone)]
pub struct StructuredCompletion {
    generator: Arc<dyn GenerationService>,
    cache: Arc<ResultCache>,
    call_timeout: Duration,
}

impl StructuredCompletion {
    pub fn new(
        generator: Arc<dyn GenerationService>,
        cache: Arc<ResultCache>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            generator,
            cache,
            call_timeout,
        }
    }

    /// One timed attempt. Returns the cleaned JSON text once it is known to
    /// deserialize as `T`.
    pub async fn complete_once<T: DeserializeOwned>(
        &self,
        operation: &str,
        system: &str,
        user: &str,
    ) -> Result<String, TaskError> {
        let raw = with_timeout(
            self.call_timeout,
            operation,
            self.generator.complete(system, user),
        )
        .await?;

        let cleaned = extract_json_object(&raw);
        serde_json::from_str::<T>(cleaned).map_err(|e| {
            TaskError::transient(format!("{operation} returned invalid JSON: {e}"))
        })?;
        Ok(cleaned.to_string())
    }

    /// Serves `operation` from the cache when the same prompts were answered
    /// within the TTL; otherwise retries `complete_once` under `policy` and
    /// caches the result.
    pub async fn complete<T: DeserializeOwned>(
        &self,
        operation: &str,
        system: &str,
        user: &str,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
    ) -> Result<T, TaskError> {
        let key = ResultCache::key_for(operation, &format!("{system}\n{user}"))?;

        let json = match self.cache.get(&key) {
            Some(hit) => {
                debug!(operation, "Generation served from cache");
                hit
            }
            None => {
                let fresh = execute_with_retry(policy, cancel, operation, || {
                    self.complete_once::<T>(operation, system, user)
                })
                .await?;
                self.cache.set(key, fresh.clone());
                fresh
            }
        };

        serde_json::from_str(&json).map_err(|e| {
            TaskError::unrecoverable(format!("{operation} produced unreadable JSON: {e}"))
        })
    }
}
