//! Upload ingestion.
//!
//! Decides whether an inbound body can be forwarded to the backend as-is or
//! must first be spooled to a temp file, and performs the spooling under a
//! byte budget. A spooled upload owns its temp file through a
//! [`TempPath`], so the file is removed on every exit path.

use std::collections::HashMap;
use std::path::PathBuf;

use http::HeaderMap;
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::backend::UploadBody;
use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::source::{ByteSource, TRANSFER_CHUNK_SIZE, write_cancellable};

/// Prefix of request headers forwarded as object metadata.
pub const USER_METADATA_PREFIX: &str = "x-amz-meta-";

const TEMP_FILE_PREFIX: &str = "colvault-upload-";

/// Limits applied while spooling uploads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSettings {
    /// Force spooling regardless of body shape.
    pub force_buffering: bool,
    /// Maximum number of bytes spooled for one upload.
    pub max_buffer_bytes: u64,
    /// Directory for temp files; `None` uses the system temp dir.
    pub temp_dir: Option<PathBuf>,
}

impl From<&GatewayConfig> for UploadSettings {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            force_buffering: config.force_upload_buffering,
            max_buffer_bytes: config.max_upload_buffer_bytes,
            temp_dir: config.upload_temp_dir.as_ref().map(PathBuf::from),
        }
    }
}

/// A body spooled to a temp file.
#[derive(Debug)]
pub struct BufferedUpload {
    /// Owner of the temp file; dropping it deletes the file.
    pub temp_path: TempPath,
    /// Read handle opened after the write handle was closed.
    pub file: tokio::fs::File,
    /// Number of bytes spooled.
    pub byte_count: u64,
}

/// An upload ready to be committed to the backend.
#[derive(Debug)]
pub struct PreparedUpload {
    /// Content to send.
    pub body: UploadBody,
    /// Exact content length.
    pub length: u64,
    /// Temp file backing `body`, if the upload was spooled.
    pub temp_path: Option<TempPath>,
}

impl PreparedUpload {
    /// Whether the body was spooled to a temp file.
    #[must_use]
    pub fn is_buffered(&self) -> bool {
        self.temp_path.is_some()
    }
}

/// Decide whether a body must be spooled before upload.
///
/// Spooling is required when forced, when a declared length comes with a
/// non-seekable body, or when no length is declared and the body is either
/// non-seekable or cannot report its remaining length.
#[must_use]
pub fn needs_buffering(
    force: bool,
    declared_length: Option<u64>,
    seekable: bool,
    remaining_len: Option<u64>,
) -> bool {
    if force {
        return true;
    }
    match declared_length {
        Some(_) => !seekable,
        None => !seekable || remaining_len.is_none(),
    }
}

/// Turn an inbound body into an upload source with an exact length.
pub async fn prepare_upload(
    source: ByteSource,
    declared_length: Option<u64>,
    settings: &UploadSettings,
    cancel: &CancellationToken,
) -> GatewayResult<PreparedUpload> {
    let seekable = source.is_seekable();
    let remaining = source.remaining_len();

    if !needs_buffering(settings.force_buffering, declared_length, seekable, remaining) {
        let bytes = source.into_bytes(cancel).await?;
        let length = bytes.len() as u64;
        debug!(length, "forwarding seekable upload body directly");
        return Ok(PreparedUpload {
            body: UploadBody::Memory(bytes),
            length,
            temp_path: None,
        });
    }

    let mut source = source;
    let buffered = buffer_to_temp(&mut source, settings, cancel).await?;
    debug!(
        bytes = buffered.byte_count,
        path = %buffered.temp_path.display(),
        "spooled upload body to temp file"
    );
    Ok(PreparedUpload {
        length: buffered.byte_count,
        body: UploadBody::File {
            file: buffered.file,
            length: buffered.byte_count,
        },
        temp_path: Some(buffered.temp_path),
    })
}

/// Spool `source` into a uniquely named temp file.
///
/// Fails with [`GatewayError::UploadTooLarge`] as soon as the running total
/// passes the limit; the offending chunk is not written and the partial file
/// is deleted.
pub async fn buffer_to_temp(
    source: &mut ByteSource,
    settings: &UploadSettings,
    cancel: &CancellationToken,
) -> GatewayResult<BufferedUpload> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(TEMP_FILE_PREFIX);
    let named = match &settings.temp_dir {
        Some(dir) => builder.tempfile_in(dir)?,
        None => builder.tempfile()?,
    };
    let (std_file, temp_path) = named.into_parts();
    let mut writer = tokio::fs::File::from_std(std_file);

    let mut buf = vec![0u8; TRANSFER_CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let n = source.read_chunk(&mut buf, cancel).await?;
        if n == 0 {
            break;
        }
        total += n as u64;
        if total > settings.max_buffer_bytes {
            return Err(GatewayError::UploadTooLarge {
                limit: settings.max_buffer_bytes,
            });
        }
        write_cancellable(&mut writer, &buf[..n], cancel).await?;
    }
    writer.flush().await?;
    drop(writer);

    let file = tokio::fs::File::open(&temp_path).await?;
    Ok(BufferedUpload {
        temp_path,
        file,
        byte_count: total,
    })
}

/// Collect `x-amz-meta-*` headers into an object metadata map.
///
/// The prefix is matched case-insensitively and stripped; the remainder is
/// kept as received. Values that are not valid UTF-8 are skipped.
#[must_use]
pub fn extract_user_metadata(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            let name = name.as_str();
            let prefix = name.get(..USER_METADATA_PREFIX.len())?;
            if !prefix.eq_ignore_ascii_case(USER_METADATA_PREFIX) {
                return None;
            }
            let key = &name[USER_METADATA_PREFIX.len()..];
            let value = value.to_str().ok()?;
            Some((key.to_owned(), value.to_owned()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use tokio::io::AsyncReadExt;

    use super::*;

    fn settings(dir: &std::path::Path, force: bool, max: u64) -> UploadSettings {
        UploadSettings {
            force_buffering: force,
            max_buffer_bytes: max,
            temp_dir: Some(dir.to_path_buf()),
        }
    }

    fn entries(dir: &std::path::Path) -> usize {
        std::fs::read_dir(dir).expect("read temp dir").count()
    }

    #[test]
    fn test_should_decide_buffering() {
        // forced
        assert!(needs_buffering(true, Some(10), true, Some(10)));
        // declared length, not seekable
        assert!(needs_buffering(false, Some(10), false, None));
        // no length, seekable but no remaining length
        assert!(needs_buffering(false, None, true, None));
        // no length, not seekable
        assert!(needs_buffering(false, None, false, None));
        // seekable with a known length
        assert!(!needs_buffering(false, Some(10), true, Some(10)));
        assert!(!needs_buffering(false, None, true, Some(10)));
    }

    #[tokio::test]
    async fn test_should_forward_seekable_body_without_temp_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let cancel = CancellationToken::new();
        let source = ByteSource::memory(Bytes::from_static(b"hello"));
        let prepared = prepare_upload(source, Some(5), &settings(dir.path(), false, 100), &cancel)
            .await
            .expect("prepare");
        assert!(!prepared.is_buffered());
        assert_eq!(prepared.length, 5);
        assert!(matches!(prepared.body, UploadBody::Memory(ref b) if &b[..] == b"hello"));
        assert_eq!(entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_should_spool_stream_body_and_reopen_for_reading() {
        let dir = tempfile::tempdir().expect("temp dir");
        let cancel = CancellationToken::new();
        let source = ByteSource::stream(&b"streamed body"[..], None);
        let prepared = prepare_upload(source, None, &settings(dir.path(), false, 100), &cancel)
            .await
            .expect("prepare");
        assert!(prepared.is_buffered());
        assert_eq!(prepared.length, 13);
        assert_eq!(entries(dir.path()), 1);

        let PreparedUpload {
            body, temp_path, ..
        } = prepared;
        let UploadBody::File { mut file, length } = body else {
            panic!("expected file body");
        };
        assert_eq!(length, 13);
        let mut read_back = Vec::new();
        file.read_to_end(&mut read_back).await.expect("read back");
        assert_eq!(read_back, b"streamed body");

        drop(file);
        drop(temp_path);
        assert_eq!(entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_should_accept_body_of_exactly_max_size() {
        let dir = tempfile::tempdir().expect("temp dir");
        let cancel = CancellationToken::new();
        let body = vec![7u8; 1024];
        let source = ByteSource::stream(std::io::Cursor::new(body), None);
        let prepared = prepare_upload(source, None, &settings(dir.path(), true, 1024), &cancel)
            .await
            .expect("prepare");
        assert_eq!(prepared.length, 1024);
    }

    #[tokio::test]
    async fn test_should_reject_body_one_byte_over_max_and_remove_temp_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let cancel = CancellationToken::new();
        let body = vec![7u8; 1025];
        let source = ByteSource::stream(std::io::Cursor::new(body), None);
        let err = prepare_upload(source, None, &settings(dir.path(), true, 1024), &cancel)
            .await
            .expect_err("should exceed limit");
        assert!(matches!(err, GatewayError::UploadTooLarge { limit: 1024 }));
        assert_eq!(entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_should_remove_temp_file_when_cancelled() {
        let dir = tempfile::tempdir().expect("temp dir");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (reader, _writer) = tokio::io::duplex(64);
        let source = ByteSource::stream(reader, None);
        let err = prepare_upload(source, None, &settings(dir.path(), true, 1024), &cancel)
            .await
            .expect_err("should be cancelled");
        assert!(matches!(err, GatewayError::Cancelled));
        assert_eq!(entries(dir.path()), 0);
    }

    #[test]
    fn test_should_extract_user_metadata() {
        let mut headers = HeaderMap::new();
        headers.insert("x-amz-meta-owner", "alice".parse().expect("header"));
        headers.insert(
            http::HeaderName::from_bytes(b"X-Amz-Meta-Project-Id").expect("header name"),
            "42".parse().expect("header"),
        );
        headers.insert("content-type", "text/plain".parse().expect("header"));
        headers.insert("x-amz-acl", "private".parse().expect("header"));

        let metadata = extract_user_metadata(&headers);
        assert_eq!(metadata.len(), 2);
        assert_eq!(metadata.get("owner").map(String::as_str), Some("alice"));
        assert_eq!(metadata.get("project-id").map(String::as_str), Some("42"));
    }

    #[test]
    fn test_should_build_settings_from_config() {
        let config = GatewayConfig::builder()
            .force_upload_buffering(false)
            .max_upload_buffer_bytes(10)
            .upload_temp_dir("/var/tmp".into())
            .build();
        let settings = UploadSettings::from(&config);
        assert!(!settings.force_buffering);
        assert_eq!(settings.max_buffer_bytes, 10);
        assert_eq!(settings.temp_dir, Some(PathBuf::from("/var/tmp")));
    }
}
