//! Gateway error types.
//!
//! Defines [`GatewayError`], the error enum shared by the core engines and the
//! HTTP layer. Each variant maps to an HTTP status code and, for the paths that
//! return a body, to the message placed in the `{"error": "..."}` JSON body.
//!
//! # Usage
//!
//! ```
//! use colvault_core::error::GatewayError;
//!
//! let err = GatewayError::UploadTooLarge { limit: 1024 };
//! assert_eq!(err.status_code(), http::StatusCode::PAYLOAD_TOO_LARGE);
//! assert_eq!(err.body_message().as_deref(), Some("Upload exceeds max buffer size"));
//! ```

use http::StatusCode;

use crate::backend::BackendError;
use crate::columnar::CodecError;

/// Message returned for any backend not-found response.
pub const NOT_FOUND_MESSAGE: &str = "Bucket or object not found";

/// Gateway error type.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    // -----------------------------------------------------------------------
    // Validation errors
    // -----------------------------------------------------------------------
    /// The request did not name a bucket.
    #[error("Bucket name is required")]
    MissingBucket,

    /// The request did not name an object key.
    #[error("{}", missing_key_message(.operation))]
    MissingKey {
        /// The operation that needed the key (`GET` or `PUT`).
        operation: &'static str,
    },

    // -----------------------------------------------------------------------
    // Range errors
    // -----------------------------------------------------------------------
    /// The `Range` header could not be parsed.
    #[error("Invalid Range header")]
    InvalidRange,

    /// The parsed range does not overlap the content.
    #[error("The requested range is not satisfiable")]
    RangeNotSatisfiable {
        /// Length of the content the range was resolved against.
        content_length: i64,
    },

    // -----------------------------------------------------------------------
    // Upload errors
    // -----------------------------------------------------------------------
    /// The buffered upload grew past the configured maximum.
    #[error("Upload exceeds max buffer size")]
    UploadTooLarge {
        /// The configured maximum in bytes.
        limit: u64,
    },

    // -----------------------------------------------------------------------
    // Backend / codec errors
    // -----------------------------------------------------------------------
    /// The storage backend rejected the call.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Encrypting an uploaded columnar file failed.
    #[error("Failed to encrypt parquet file: {0}")]
    Encrypt(#[source] CodecError),

    /// Decrypting a stored columnar file failed.
    #[error("Failed to decrypt parquet file: {0}")]
    Decrypt(#[source] CodecError),

    // -----------------------------------------------------------------------
    // Internal / catch-all
    // -----------------------------------------------------------------------
    /// The request was cancelled before the operation finished.
    #[error("Request cancelled")]
    Cancelled,

    /// Unexpected I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error with context.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

fn missing_key_message(operation: &str) -> &'static str {
    if operation.eq_ignore_ascii_case("PUT") {
        "Key is required for object PUT"
    } else {
        "Key is required"
    }
}

impl GatewayError {
    /// HTTP status code this error is reported with.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingBucket | Self::MissingKey { .. } | Self::InvalidRange => {
                StatusCode::BAD_REQUEST
            }
            Self::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            Self::UploadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Backend(err) => err.status_code(),
            Self::Encrypt(_) => StatusCode::BAD_REQUEST,
            Self::Decrypt(_) | Self::Cancelled | Self::Io(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message for the JSON error body, or `None` when the response carries
    /// a status code only.
    #[must_use]
    pub fn body_message(&self) -> Option<String> {
        match self {
            Self::RangeNotSatisfiable { .. } => None,
            Self::Backend(err) => match err.status_code().as_u16() {
                404 => Some(NOT_FOUND_MESSAGE.to_owned()),
                400 | 401 | 403 => None,
                _ => Some(err.message.clone()),
            },
            other => Some(other.to_string()),
        }
    }
}

/// Convenience result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;
