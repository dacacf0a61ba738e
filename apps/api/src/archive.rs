use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use tracing::info;

use crate::extraction::ContentKind;
use crate::resilience::TaskError;

/// Keeps a copy of each uploaded resume.
#[async_trait]
pub trait ResumeArchive: Send + Sync {
    /// Stores the file and returns its object key.
    async fn store_resume(
        &self,
        user_id: &str,
        history_id: &str,
        kind: ContentKind,
        bytes: Bytes,
    ) -> Result<String, TaskError>;
}

pub fn resume_key(user_id: &str, history_id: &str, kind: ContentKind) -> String {
    format!("resumes/{user_id}/{history_id}.{}", kind.extension())
}

/// `ResumeArchive` backed by S3 (or MinIO locally).
#[derive(Clone)]
pub struct S3ResumeArchive {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3ResumeArchive {
    pub fn new(client: aws_sdk_s3::Client, bucket: String) -> Self {
        Self { client, bucket }
    }
}

#[async_trait]
impl ResumeArchive for S3ResumeArchive {
    async fn store_resume(
        &self,
        user_id: &str,
        history_id: &str,
        kind: ContentKind,
        bytes: Bytes,
    ) -> Result<String, TaskError> {
        let key = resume_key(user_id, history_id, kind);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(bytes))
            .content_type(kind.content_type())
            .send()
            .await
            .map_err(|e| TaskError::transient(format!("S3 upload failed: {e}")))?;

        info!("Archived resume to s3://{}/{}", self.bucket, key);
        Ok(key)
    }
}
