use std::fmt;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::resilience::error::TaskError;

/// Number of hex characters kept from the digest.
pub const IDENTITY_LEN: usize = 32;

/// Deterministic identifier derived from a content key (a listing URL, a cache
/// input). Always `IDENTITY_LEN` lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ContentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Hashes the trimmed key. Keys that differ only in surrounding whitespace map
/// to the same identity; a blank key is rejected.
pub fn identity_of(key: &str) -> Result<ContentId, TaskError> {
    let normalized = key.trim();
    if normalized.is_empty() {
        return Err(TaskError::invalid_input("identity key must not be empty"));
    }

    let digest = Sha256::digest(normalized.as_bytes());
    let mut encoded = hex::encode(digest);
    encoded.truncate(IDENTITY_LEN);
    Ok(ContentId(encoded))
}
