// Shared building blocks for every external call the service makes:
// error classification, bounded retry, TTL memoization and content identity.

pub mod cache;
pub mod error;
pub mod identity;
pub mod retry;

pub use cache::ResultCache;
pub use error::{ErrorKind, TaskError};
pub use identity::{identity_of, ContentId};
pub use retry::{execute_with_retry, with_timeout, RetryPolicy};
