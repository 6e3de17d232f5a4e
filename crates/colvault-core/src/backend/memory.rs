//! In-process [`ObjectBackend`] used for tests and embedding.
//!
//! Buckets must be created before objects can be written to them; reads and
//! writes against a missing bucket or key fail with a 404 [`BackendError`],
//! matching what an S3-compatible store reports.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::{DashMap, DashSet};
use md5::{Digest, Md5};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::{
    BackendError, GetObjectOutput, GetObjectRequest, ObjectBackend, PutObjectOutput,
    PutObjectRequest, UploadBody,
};

type ObjectKey = (String, String);

/// A stored object and its metadata.
#[derive(Debug, Clone)]
pub struct StoredObject {
    /// Object content.
    pub data: Bytes,
    /// Content type given at upload.
    pub content_type: String,
    /// User metadata given at upload.
    pub metadata: HashMap<String, String>,
    /// Quoted hex MD5 of the content.
    pub e_tag: String,
    /// Version identifier assigned on write.
    pub version_id: String,
    /// Write time as an HTTP date.
    pub last_modified: String,
}

/// Thread-safe in-memory object store.
///
/// # Examples
///
/// ```
/// use colvault_core::backend::memory::MemoryBackend;
///
/// let backend = MemoryBackend::new();
/// backend.create_bucket("reports");
/// backend.insert("reports", "a.txt", "hello", "text/plain");
/// assert_eq!(backend.object("reports", "a.txt").map(|o| o.data.len()), Some(5));
/// ```
#[derive(Debug, Default)]
pub struct MemoryBackend {
    buckets: DashSet<String>,
    objects: DashMap<ObjectKey, StoredObject>,
    next_version: AtomicU64,
}

impl MemoryBackend {
    /// Create an empty store with no buckets.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a bucket. Creating an existing bucket is a no-op.
    pub fn create_bucket(&self, bucket: &str) {
        self.buckets.insert(bucket.to_owned());
    }

    /// Store an object directly, creating its bucket if needed.
    pub fn insert(
        &self,
        bucket: &str,
        key: &str,
        data: impl Into<Bytes>,
        content_type: &str,
    ) -> StoredObject {
        self.create_bucket(bucket);
        self.store(bucket, key, data.into(), content_type, HashMap::new())
    }

    /// A copy of the stored object, if present.
    #[must_use]
    pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.objects
            .get(&(bucket.to_owned(), key.to_owned()))
            .map(|entry| entry.value().clone())
    }

    fn store(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
        metadata: HashMap<String, String>,
    ) -> StoredObject {
        let version = self.next_version.fetch_add(1, Ordering::Relaxed) + 1;
        let stored = StoredObject {
            e_tag: format!("\"{}\"", hex::encode(Md5::digest(&data))),
            version_id: format!("v{version}"),
            last_modified: chrono::Utc::now()
                .format("%a, %d %b %Y %H:%M:%S GMT")
                .to_string(),
            content_type: content_type.to_owned(),
            metadata,
            data,
        };
        trace!(bucket, key, size = stored.data.len(), "stored object");
        self.objects
            .insert((bucket.to_owned(), key.to_owned()), stored.clone());
        stored
    }

    fn require_bucket(&self, bucket: &str) -> Result<(), BackendError> {
        if self.buckets.contains(bucket) {
            Ok(())
        } else {
            Err(BackendError::not_found(format!(
                "NoSuchBucket: The specified bucket does not exist: {bucket}"
            )))
        }
    }
}

#[async_trait]
impl ObjectBackend for MemoryBackend {
    async fn get_object(
        &self,
        request: GetObjectRequest,
        cancel: &CancellationToken,
    ) -> Result<GetObjectOutput, BackendError> {
        if cancel.is_cancelled() {
            return Err(BackendError::new(None, "request cancelled"));
        }
        self.require_bucket(&request.bucket)?;

        let stored = self
            .object(&request.bucket, &request.key)
            .filter(|o| {
                request
                    .version_id
                    .as_deref()
                    .is_none_or(|v| v == o.version_id)
            })
            .ok_or_else(|| {
                BackendError::not_found("NoSuchKey: The specified key does not exist.")
            })?;

        Ok(GetObjectOutput {
            content_length: i64::try_from(stored.data.len()).ok(),
            content_type: Some(stored.content_type),
            e_tag: Some(stored.e_tag),
            last_modified: Some(stored.last_modified),
            body: Box::pin(std::io::Cursor::new(stored.data)),
        })
    }

    async fn put_object(
        &self,
        request: PutObjectRequest,
        cancel: &CancellationToken,
    ) -> Result<PutObjectOutput, BackendError> {
        if cancel.is_cancelled() {
            return Err(BackendError::new(None, "request cancelled"));
        }
        self.require_bucket(&request.bucket)?;

        let data = match request.body {
            UploadBody::Memory(bytes) => bytes,
            UploadBody::File { mut file, length } => {
                let capacity = usize::try_from(length).unwrap_or_default();
                let mut buf = Vec::with_capacity(capacity);
                file.read_to_end(&mut buf).await.map_err(|e| {
                    BackendError::new(None, format!("failed to read upload body: {e}"))
                })?;
                Bytes::from(buf)
            }
        };

        let stored = self.store(
            &request.bucket,
            &request.key,
            data,
            &request.content_type,
            request.metadata,
        );
        Ok(PutObjectOutput {
            e_tag: Some(stored.e_tag),
            version_id: Some(stored.version_id),
        })
    }
}
