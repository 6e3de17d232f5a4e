//! Object-storage backend abstraction.
//!
//! The gateway talks to storage only through [`ObjectBackend`]. The production
//! implementation is [`S3Backend`](s3::S3Backend), which wraps an
//! `aws_sdk_s3::Client`; [`MemoryBackend`](memory::MemoryBackend) keeps
//! objects in process for tests and embedding.
//!
//! Per-request backends are produced by a [`BackendFactory`] from
//! [`BackendSettings`] assembled by the
//! [`ClientResolver`](crate::resolver::ClientResolver).

pub mod memory;
pub mod s3;

use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use http::StatusCode;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

use crate::credentials::ParsedCredentials;

/// Streaming object body returned by [`ObjectBackend::get_object`].
pub type ObjectBody = Pin<Box<dyn AsyncRead + Send>>;

/// Error reported by a storage backend.
///
/// `status` is the HTTP status of the backend's response, or `None` when no
/// response was received (DNS, connect, dispatch or timeout failures).
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct BackendError {
    /// HTTP status reported by the backend, if any.
    pub status: Option<u16>,
    /// Backend-provided message.
    pub message: String,
}

impl BackendError {
    /// Create a new backend error.
    #[must_use]
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Create a not-found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(Some(404), message)
    }

    /// The HTTP status the gateway responds with for this error.
    ///
    /// Not-found, forbidden, unauthorized and bad-request pass through;
    /// everything else, including a missing status, becomes 500.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self.status {
            Some(400) => StatusCode::BAD_REQUEST,
            Some(401) => StatusCode::UNAUTHORIZED,
            Some(403) => StatusCode::FORBIDDEN,
            Some(404) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Input for [`ObjectBackend::get_object`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetObjectRequest {
    /// Bucket name.
    pub bucket: String,
    /// Object key.
    pub key: String,
    /// Optional version to fetch.
    pub version_id: Option<String>,
}

/// Output of [`ObjectBackend::get_object`].
pub struct GetObjectOutput {
    /// Streaming object content.
    pub body: ObjectBody,
    /// Length reported by the backend.
    pub content_length: Option<i64>,
    /// Stored content type.
    pub content_type: Option<String>,
    /// Entity tag, as returned by the backend (usually quoted).
    pub e_tag: Option<String>,
    /// Last-modified timestamp, already formatted as an HTTP date.
    pub last_modified: Option<String>,
}

impl fmt::Debug for GetObjectOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GetObjectOutput")
            .field("content_length", &self.content_length)
            .field("content_type", &self.content_type)
            .field("e_tag", &self.e_tag)
            .field("last_modified", &self.last_modified)
            .finish_non_exhaustive()
    }
}

/// Content handed to [`ObjectBackend::put_object`].
///
/// Both variants carry an exact length so the backend never has to probe
/// the source.
#[derive(Debug)]
pub enum UploadBody {
    /// Fully materialised content.
    Memory(Bytes),
    /// A read handle on a closed temp file.
    File {
        /// Independent read handle, positioned at the start of the file.
        file: tokio::fs::File,
        /// Number of bytes in the file.
        length: u64,
    },
}

impl UploadBody {
    /// Exact number of bytes this body yields.
    #[must_use]
    pub fn len(&self) -> u64 {
        match self {
            Self::Memory(bytes) => bytes.len() as u64,
            Self::File { length, .. } => *length,
        }
    }

    /// Whether the body is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Input for [`ObjectBackend::put_object`].
#[derive(Debug)]
pub struct PutObjectRequest {
    /// Bucket name.
    pub bucket: String,
    /// Object key.
    pub key: String,
    /// Content type stored with the object.
    pub content_type: String,
    /// User metadata (`x-amz-meta-*` without the prefix).
    pub metadata: HashMap<String, String>,
    /// Content to upload.
    pub body: UploadBody,
}

/// Output of [`ObjectBackend::put_object`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutObjectOutput {
    /// Entity tag of the stored object.
    pub e_tag: Option<String>,
    /// Version id of the stored object.
    pub version_id: Option<String>,
}

/// An object store the gateway reads from and writes to.
///
/// Implementations must abort promptly once `cancel` fires.
#[async_trait]
pub trait ObjectBackend: Send + Sync + fmt::Debug {
    /// Fetch an object.
    async fn get_object(
        &self,
        request: GetObjectRequest,
        cancel: &CancellationToken,
    ) -> Result<GetObjectOutput, BackendError>;

    /// Store an object.
    async fn put_object(
        &self,
        request: PutObjectRequest,
        cancel: &CancellationToken,
    ) -> Result<PutObjectOutput, BackendError>;
}

/// Connection settings for a per-request backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendSettings {
    /// Normalised endpoint URL (scheme present, no trailing slash).
    pub endpoint: Option<String>,
    /// Recognised region; `None` means "use the signing default".
    pub region: Option<String>,
    /// Explicit credentials.
    pub credentials: Option<ParsedCredentials>,
    /// Application name reported to the backend.
    pub app_name: Option<String>,
}

/// Builds per-request backends.
pub trait BackendFactory: Send + Sync + fmt::Debug {
    /// Build a backend exclusively owned by one request.
    fn build(&self, settings: &BackendSettings) -> Box<dyn ObjectBackend>;
}
