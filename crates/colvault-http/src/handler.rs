//! GET and PUT orchestration.
//!
//! [`ObjectHandler`] resolves a backend client per request, runs the columnar
//! codec and the upload/range engines from `colvault-core`, and turns the
//! outcome into an HTTP response. Every path releases the client lease
//! exactly once: GET hands the lease to the task streaming the body, PUT
//! releases it after the backend commit.

use std::error::Error as StdError;

use bytes::Bytes;
use colvault_core::backend::{
    BackendError, GetObjectRequest, ObjectBackend, PutObjectOutput, PutObjectRequest,
};
use colvault_core::columnar::{self, COLUMNAR_CONTENT_TYPE};
use colvault_core::range::{RangeSpec, copy_range};
use colvault_core::source::{ByteSource, TRANSFER_CHUNK_SIZE};
use colvault_core::upload::{PreparedUpload, UploadSettings, extract_user_metadata, prepare_upload};
use colvault_core::{ClientLease, ClientResolver, GatewayError, GatewayResult};
use futures::TryStreamExt;
use http::HeaderMap;
use http::header::{
    ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, ETAG, HeaderValue, LAST_MODIFIED,
    RANGE,
};
use http_body_util::BodyExt;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::body::GatewayBody;
use crate::response::{PutObjectBody, error_to_response, json_response, trim_quotes};
use crate::router::{ObjectPath, RequestOptions};

/// Content type used when neither the request nor the backend names one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Debug header reporting whether a PUT body was spooled to disk.
pub const UPLOAD_BUFFERED_HEADER: &str = "x-upload-buffered";

/// Debug header carrying the spooled byte count.
pub const UPLOAD_BUFFERED_SIZE_HEADER: &str = "x-upload-buffered-size";

/// Object download/upload orchestration.
#[derive(Debug, Clone)]
pub struct ObjectHandler {
    resolver: ClientResolver,
    upload: UploadSettings,
}

/// A fetched object, ready for range handling.
struct Download {
    source: ByteSource,
    content_length: Option<i64>,
    content_type: String,
    e_tag: Option<String>,
    last_modified: Option<String>,
}

impl ObjectHandler {
    /// Create a handler over `resolver` using `upload` for non-columnar PUTs.
    #[must_use]
    pub fn new(resolver: ClientResolver, upload: UploadSettings) -> Self {
        Self { resolver, upload }
    }

    /// Serve `GET /{bucket}/{key}`.
    pub async fn get_object(
        &self,
        target: ObjectPath,
        options: RequestOptions,
        headers: &HeaderMap,
        cancel: &CancellationToken,
        request_id: &str,
    ) -> http::Response<GatewayBody> {
        match self
            .try_get_object(target, options, headers, cancel, request_id)
            .await
        {
            Ok(response) => response,
            Err(err) => {
                debug!(error = %err, request_id, "GET failed");
                error_to_response(&err)
            }
        }
    }

    /// Serve `PUT /{bucket}/{key}`.
    pub async fn put_object<B>(
        &self,
        target: ObjectPath,
        options: RequestOptions,
        headers: &HeaderMap,
        body: B,
        cancel: &CancellationToken,
        request_id: &str,
    ) -> http::Response<GatewayBody>
    where
        B: http_body::Body<Data = Bytes> + Send + Unpin + 'static,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        match self
            .try_put_object(target, options, headers, body, cancel, request_id)
            .await
        {
            Ok(response) => response,
            Err(err) => {
                debug!(error = %err, request_id, "PUT failed");
                error_to_response(&err)
            }
        }
    }

    async fn try_get_object(
        &self,
        target: ObjectPath,
        options: RequestOptions,
        headers: &HeaderMap,
        cancel: &CancellationToken,
        request_id: &str,
    ) -> GatewayResult<http::Response<GatewayBody>> {
        let (bucket, key) = require_target(target, "GET")?;
        let range = RangeSpec::parse(header_str(headers, &RANGE));
        if range.invalid {
            return Err(GatewayError::InvalidRange);
        }
        log_ignored_options(&options, request_id);

        let lease = self.resolver.resolve(Some(&options.storage));
        let request = GetObjectRequest {
            bucket: bucket.clone(),
            key: key.clone(),
            version_id: options.version_id,
        };
        let download = match fetch(lease.backend(), request, cancel).await {
            Ok(download) => download,
            Err(err) => {
                self.resolver.release(lease);
                return Err(err);
            }
        };

        let Some(content_length) = download.content_length else {
            debug!(%bucket, %key, request_id, "content length unknown, serving full body");
            return Ok(self.full_response(lease, download, cancel));
        };

        let bounds = range.compute_bounds(content_length);
        if bounds.unsatisfiable {
            self.resolver.release(lease);
            return Err(GatewayError::RangeNotSatisfiable { content_length });
        }

        info!(
            %bucket,
            %key,
            content_length,
            range = ?bounds.requested.then(|| bounds.content_range(content_length)),
            request_id,
            "serving object"
        );

        if !bounds.requested {
            return Ok(self.full_response(lease, download, cancel));
        }

        let mut builder = http::Response::builder()
            .status(http::StatusCode::PARTIAL_CONTENT)
            .header(CONTENT_TYPE, header_value(&download.content_type))
            .header(CONTENT_RANGE, bounds.content_range(content_length))
            .header(CONTENT_LENGTH, bounds.len());
        builder = object_headers(builder, download.e_tag.as_deref(), download.last_modified.as_deref());

        let start = u64::try_from(bounds.start).unwrap_or_default();
        let length = u64::try_from(bounds.len()).unwrap_or_default();
        let body = self.stream_body(lease, download.source, start, length, cancel);
        builder
            .body(body)
            .map_err(|e| GatewayError::Internal(e.into()))
    }

    fn full_response(
        &self,
        lease: ClientLease,
        download: Download,
        cancel: &CancellationToken,
    ) -> http::Response<GatewayBody> {
        let mut builder = http::Response::builder()
            .status(http::StatusCode::OK)
            .header(CONTENT_TYPE, header_value(&download.content_type))
            .header(ACCEPT_RANGES, "bytes");
        if let Some(length) = download.content_length {
            builder = builder.header(CONTENT_LENGTH, length);
        }
        builder = object_headers(builder, download.e_tag.as_deref(), download.last_modified.as_deref());

        let length = download
            .content_length
            .and_then(|n| u64::try_from(n).ok())
            .unwrap_or(u64::MAX);
        let body = self.stream_body(lease, download.source, 0, length, cancel);
        builder.body(body).unwrap_or_else(|err| {
            warn!(error = %err, "failed to build object response");
            error_to_response(&GatewayError::Internal(err.into()))
        })
    }

    /// Stream a slice of `source` through a pipe read by the response body.
    ///
    /// The copy task owns the lease and releases it when the copy ends,
    /// whether it finished, ran out of input or lost its reader.
    fn stream_body(
        &self,
        lease: ClientLease,
        mut source: ByteSource,
        start: u64,
        length: u64,
        cancel: &CancellationToken,
    ) -> GatewayBody {
        let (mut writer, reader) = tokio::io::duplex(TRANSFER_CHUNK_SIZE);
        let resolver = self.resolver.clone();
        let cancel = cancel.clone();

        tokio::spawn(async move {
            match copy_range(&mut source, &mut writer, start, length, &cancel).await {
                Ok(written) => debug!(start, written, "response body copied"),
                Err(err) => debug!(error = %err, "response body copy stopped"),
            }
            drop(writer);
            resolver.release(lease);
        });

        GatewayBody::from_reader(reader)
    }

    async fn try_put_object<B>(
        &self,
        target: ObjectPath,
        options: RequestOptions,
        headers: &HeaderMap,
        body: B,
        cancel: &CancellationToken,
        request_id: &str,
    ) -> GatewayResult<http::Response<GatewayBody>>
    where
        B: http_body::Body<Data = Bytes> + Send + Unpin + 'static,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        let (bucket, key) = require_target(target, "PUT")?;
        log_ignored_options(&options, request_id);

        let content_type = header_str(headers, &CONTENT_TYPE);
        let declared_length = header_str(headers, &CONTENT_LENGTH).and_then(|v| v.trim().parse().ok());
        let columnar = columnar::is_columnar(&key, content_type);
        let source = ByteSource::stream(body_reader(body), declared_length);

        let lease = self.resolver.resolve(Some(&options.storage));
        let result = self
            .store(
                lease.backend(),
                PutTarget {
                    bucket: &bucket,
                    key: &key,
                    content_type: content_type.unwrap_or(DEFAULT_CONTENT_TYPE),
                    columnar,
                },
                source,
                declared_length,
                headers,
                cancel,
                request_id,
            )
            .await;
        self.resolver.release(lease);
        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn store(
        &self,
        backend: &dyn ObjectBackend,
        target: PutTarget<'_>,
        source: ByteSource,
        declared_length: Option<u64>,
        headers: &HeaderMap,
        cancel: &CancellationToken,
        request_id: &str,
    ) -> GatewayResult<http::Response<GatewayBody>> {
        let prepared = if target.columnar {
            let plain = source.into_bytes(cancel).await?;
            let encrypted = columnar::encrypt(plain, None)
                .await
                .map_err(GatewayError::Encrypt)?;
            PreparedUpload {
                length: encrypted.len() as u64,
                body: colvault_core::backend::UploadBody::Memory(encrypted),
                temp_path: None,
            }
        } else {
            prepare_upload(source, declared_length, &self.upload, cancel).await?
        };

        let buffered_size = prepared.is_buffered().then_some(prepared.length);
        let request = PutObjectRequest {
            bucket: target.bucket.to_owned(),
            key: target.key.to_owned(),
            content_type: target.content_type.to_owned(),
            metadata: extract_user_metadata(headers),
            body: prepared.body,
        };
        let outcome = backend.put_object(request, cancel).await;
        drop(prepared.temp_path);

        let mut response = match outcome {
            Ok(output) => {
                info!(
                    bucket = target.bucket,
                    key = target.key,
                    length = prepared.length,
                    columnar = target.columnar,
                    buffered = buffered_size.is_some(),
                    request_id,
                    "stored object"
                );
                put_success_response(&output)
            }
            Err(err) => {
                let err = backend_failure(err, cancel);
                warn!(
                    bucket = target.bucket,
                    key = target.key,
                    error = %err,
                    request_id,
                    "backend rejected upload"
                );
                error_to_response(&err)
            }
        };
        add_buffering_headers(response.headers_mut(), buffered_size);
        Ok(response)
    }
}

struct PutTarget<'a> {
    bucket: &'a str,
    key: &'a str,
    content_type: &'a str,
    columnar: bool,
}

/// Fetch an object, materialising and decrypting columnar content.
async fn fetch(
    backend: &dyn ObjectBackend,
    request: GetObjectRequest,
    cancel: &CancellationToken,
) -> GatewayResult<Download> {
    let key = request.key.clone();
    let output = backend
        .get_object(request, cancel)
        .await
        .map_err(|err| backend_failure(err, cancel))?;

    let columnar = columnar::is_columnar(&key, output.content_type.as_deref());
    let content_type = output.content_type.unwrap_or_else(|| {
        if columnar {
            COLUMNAR_CONTENT_TYPE.to_owned()
        } else {
            DEFAULT_CONTENT_TYPE.to_owned()
        }
    });
    let declared = output.content_length.and_then(|n| u64::try_from(n).ok());
    let mut source = ByteSource::stream(output.body, declared);

    if columnar {
        let encrypted = source.into_bytes(cancel).await?;
        let plain = columnar::decrypt(encrypted)
            .await
            .map_err(GatewayError::Decrypt)?;
        source = ByteSource::memory(plain);
    }

    let content_length = if source.is_seekable() {
        source.remaining_len().and_then(|n| i64::try_from(n).ok())
    } else {
        output.content_length
    };

    Ok(Download {
        source,
        content_length,
        content_type,
        e_tag: output.e_tag,
        last_modified: output.last_modified,
    })
}

/// Wrap a request body as an `AsyncRead`.
fn body_reader<B>(body: B) -> impl AsyncRead + Send + 'static
where
    B: http_body::Body<Data = Bytes> + Send + Unpin + 'static,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    StreamReader::new(body.into_data_stream().map_err(std::io::Error::other))
}

fn require_target(target: ObjectPath, operation: &'static str) -> GatewayResult<(String, String)> {
    let bucket = target
        .bucket
        .filter(|b| !b.is_empty())
        .ok_or(GatewayError::MissingBucket)?;
    let key = target
        .key
        .filter(|k| !k.is_empty())
        .ok_or(GatewayError::MissingKey { operation })?;
    Ok((bucket, key))
}

/// A backend failure, reported as cancellation once the request was cancelled.
fn backend_failure(err: BackendError, cancel: &CancellationToken) -> GatewayError {
    if cancel.is_cancelled() {
        GatewayError::Cancelled
    } else {
        GatewayError::Backend(err)
    }
}

fn log_ignored_options(options: &RequestOptions, request_id: &str) {
    debug!(
        retry_attempts = options.retry_attempts,
        timeout_ms = options.timeout_ms,
        request_id,
        "retry and timeout options are not applied to backend calls"
    );
}

fn header_str<'a>(headers: &'a HeaderMap, name: &http::header::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn header_value(value: &str) -> HeaderValue {
    HeaderValue::from_str(value).unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_CONTENT_TYPE))
}

fn object_headers(
    mut builder: http::response::Builder,
    e_tag: Option<&str>,
    last_modified: Option<&str>,
) -> http::response::Builder {
    for (name, value) in [(ETAG, e_tag), (LAST_MODIFIED, last_modified)] {
        if let Some(hv) = value.and_then(|v| HeaderValue::from_str(v).ok()) {
            builder = builder.header(name, hv);
        }
    }
    builder
}

fn put_success_response(output: &PutObjectOutput) -> http::Response<GatewayBody> {
    let body = PutObjectBody {
        etag: output.e_tag.as_deref().map(|v| trim_quotes(v).to_owned()),
        version_id: output.version_id.as_deref().map(|v| trim_quotes(v).to_owned()),
    };
    let mut response = json_response(http::StatusCode::OK, &body);
    if let Some(hv) = output
        .e_tag
        .as_deref()
        .and_then(|v| HeaderValue::from_str(v).ok())
    {
        response.headers_mut().insert(ETAG, hv);
    }
    response
}

fn add_buffering_headers(headers: &mut HeaderMap, buffered_size: Option<u64>) {
    match buffered_size {
        Some(size) => {
            headers.insert(UPLOAD_BUFFERED_HEADER, HeaderValue::from_static("true"));
            headers.insert(UPLOAD_BUFFERED_SIZE_HEADER, HeaderValue::from(size));
        }
        None => {
            headers.insert(UPLOAD_BUFFERED_HEADER, HeaderValue::from_static("false"));
        }
    }
}
