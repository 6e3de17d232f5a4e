//! Columnar (Parquet) encryption engine.
//!
//! Uploaded Parquet files are rewritten with Parquet modular encryption before
//! they reach the backend; downloads are rewritten back to plaintext. The
//! rewrite is CPU-bound synchronous work, so the async entry points here run
//! it on tokio's blocking pool.

pub mod copy;
pub mod keys;

use bytes::Bytes;
use parquet::errors::ParquetError;
use tracing::debug;

pub use copy::ColumnPhysicalType;
pub use keys::EncryptionKeyMaterial;

/// Content type reported for Parquet objects stored without one.
pub const COLUMNAR_CONTENT_TYPE: &str = "application/vnd.apache.parquet";

const COLUMNAR_EXTENSION: &str = ".parquet";
const COLUMNAR_CONTENT_TYPE_MARKER: &str = "parquet";

/// Errors raised while rewriting a columnar file.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The Parquet reader or writer failed.
    #[error(transparent)]
    Parquet(#[from] ParquetError),

    /// A key identifier in the file does not match the process key material.
    #[error("Unknown key metadata: {0}")]
    UnknownKeyMetadata(String),

    /// A column reader and writer disagree on the physical type.
    #[error("column {0} has no matching writer for its physical type")]
    ColumnMismatch(String),

    /// The blocking worker running the rewrite failed.
    #[error("codec worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// Whether an object is handled as a columnar file.
///
/// # Examples
///
/// ```
/// use colvault_core::columnar::is_columnar;
///
/// assert!(is_columnar("reports/2024.PARQUET", None));
/// assert!(is_columnar("blob", Some("application/x-parquet")));
/// assert!(!is_columnar("notes.txt", Some("text/plain")));
/// ```
#[must_use]
pub fn is_columnar(key: &str, content_type: Option<&str>) -> bool {
    let key_matches = key.len() >= COLUMNAR_EXTENSION.len()
        && key
            .get(key.len() - COLUMNAR_EXTENSION.len()..)
            .is_some_and(|ext| ext.eq_ignore_ascii_case(COLUMNAR_EXTENSION));
    key_matches
        || content_type.is_some_and(|ct| {
            ct.to_ascii_lowercase()
                .contains(COLUMNAR_CONTENT_TYPE_MARKER)
        })
}

/// Encrypt a columnar file on the blocking pool.
///
/// `columns` restricts encryption to the named columns; `None` encrypts all.
pub async fn encrypt(input: Bytes, columns: Option<Vec<String>>) -> Result<Bytes, CodecError> {
    let input_len = input.len();
    let output = tokio::task::spawn_blocking(move || {
        copy::encrypt(
            input,
            columns.as_deref(),
            EncryptionKeyMaterial::process_wide(),
        )
    })
    .await??;
    debug!(input_len, output_len = output.len(), "encrypted columnar file");
    Ok(Bytes::from(output))
}

/// Decrypt a columnar file on the blocking pool.
pub async fn decrypt(input: Bytes) -> Result<Bytes, CodecError> {
    let input_len = input.len();
    let output = tokio::task::spawn_blocking(move || {
        copy::decrypt(input, EncryptionKeyMaterial::process_wide())
    })
    .await??;
    debug!(input_len, output_len = output.len(), "decrypted columnar file");
    Ok(Bytes::from(output))
}
