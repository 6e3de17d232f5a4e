//! S3-compatible backend built on `aws-sdk-s3`.
//!
//! Every client uses path-style addressing so that bucket names never have to
//! resolve as DNS labels on custom endpoints (MinIO, R2, LocalStack).

use std::fmt;

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_credential_types::provider::SharedCredentialsProvider;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{AppName, BehaviorVersion, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::{ByteStream, DateTimeFormat, Length};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{
    BackendError, BackendFactory, BackendSettings, GetObjectOutput, GetObjectRequest,
    ObjectBackend, PutObjectOutput, PutObjectRequest, UploadBody,
};

const CREDENTIALS_PROVIDER_NAME: &str = "colvault-request";

/// [`ObjectBackend`] over an `aws_sdk_s3::Client`.
#[derive(Clone)]
pub struct S3Backend {
    client: Client,
}

impl fmt::Debug for S3Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Backend").finish_non_exhaustive()
    }
}

impl S3Backend {
    /// Wrap an existing client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from explicit settings.
    ///
    /// `default_region` signs requests whenever `settings.region` is `None`.
    /// `fallback_credentials` is used when the settings carry none.
    #[must_use]
    pub fn from_settings(
        settings: &BackendSettings,
        default_region: &str,
        fallback_credentials: Option<&SharedCredentialsProvider>,
    ) -> Self {
        let region = settings
            .region
            .clone()
            .unwrap_or_else(|| default_region.to_owned());

        let mut builder = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region))
            .force_path_style(true);

        if let Some(creds) = &settings.credentials {
            builder = builder.credentials_provider(Credentials::new(
                creds.access_key.clone(),
                creds.secret_key.clone(),
                creds.session_token.clone(),
                None,
                CREDENTIALS_PROVIDER_NAME,
            ));
        } else if let Some(provider) = fallback_credentials {
            builder = builder.credentials_provider(provider.clone());
        }

        if let Some(endpoint) = &settings.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        if let Some(agent) = &settings.app_name {
            match AppName::new(agent.clone()) {
                Ok(app_name) => builder = builder.app_name(app_name),
                Err(err) => debug!(agent, error = %err, "ignoring invalid agent name"),
            }
        }

        Self::new(Client::from_conf(builder.build()))
    }
}

#[async_trait]
impl ObjectBackend for S3Backend {
    async fn get_object(
        &self,
        request: GetObjectRequest,
        cancel: &CancellationToken,
    ) -> Result<GetObjectOutput, BackendError> {
        let send = self
            .client
            .get_object()
            .bucket(request.bucket)
            .key(request.key)
            .set_version_id(request.version_id)
            .send();

        let output = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(cancelled()),
            result = send => result.map_err(to_backend_error)?,
        };

        let last_modified = output
            .last_modified()
            .and_then(|dt| dt.fmt(DateTimeFormat::HttpDate).ok());

        Ok(GetObjectOutput {
            content_length: output.content_length(),
            content_type: output.content_type().map(str::to_owned),
            e_tag: output.e_tag().map(str::to_owned),
            last_modified,
            body: Box::pin(output.body.into_async_read()),
        })
    }

    async fn put_object(
        &self,
        request: PutObjectRequest,
        cancel: &CancellationToken,
    ) -> Result<PutObjectOutput, BackendError> {
        let length = request.body.len();
        let body = match request.body {
            UploadBody::Memory(bytes) => ByteStream::from(bytes),
            UploadBody::File { file, length } => ByteStream::read_from()
                .file(file)
                .length(Length::Exact(length))
                .build()
                .await
                .map_err(|e| BackendError::new(None, format!("failed to open upload body: {e}")))?,
        };

        let send = self
            .client
            .put_object()
            .bucket(request.bucket)
            .key(request.key)
            .content_type(request.content_type)
            .content_length(i64::try_from(length).unwrap_or(i64::MAX))
            .set_metadata((!request.metadata.is_empty()).then_some(request.metadata))
            .body(body)
            .send();

        let output = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(cancelled()),
            result = send => result.map_err(to_backend_error)?,
        };

        Ok(PutObjectOutput {
            e_tag: output.e_tag().map(str::to_owned),
            version_id: output.version_id().map(str::to_owned),
        })
    }
}

fn cancelled() -> BackendError {
    BackendError::new(None, "request cancelled")
}

/// Convert an SDK error, keeping the HTTP status when a response arrived.
fn to_backend_error<E>(err: SdkError<E, aws_sdk_s3::config::http::HttpResponse>) -> BackendError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let status = err.raw_response().map(|raw| raw.status().as_u16());
    let message = match (err.code(), err.message()) {
        (Some(code), Some(message)) => format!("{code}: {message}"),
        (Some(code), None) => code.to_owned(),
        (None, Some(message)) => message.to_owned(),
        (None, None) => DisplayErrorContext(&err).to_string(),
    };
    if status.is_none() {
        warn!(error = %message, "backend request failed without a response");
    }
    BackendError::new(status, message)
}

/// [`BackendFactory`] producing [`S3Backend`]s.
#[derive(Clone)]
pub struct S3BackendFactory {
    default_region: String,
    fallback_credentials: Option<SharedCredentialsProvider>,
}

impl fmt::Debug for S3BackendFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3BackendFactory")
            .field("default_region", &self.default_region)
            .field(
                "fallback_credentials",
                &self.fallback_credentials.as_ref().map(|_| "..."),
            )
            .finish()
    }
}

impl S3BackendFactory {
    /// Create a factory signing with `default_region` when no region is given.
    #[must_use]
    pub fn new(
        default_region: impl Into<String>,
        fallback_credentials: Option<SharedCredentialsProvider>,
    ) -> Self {
        Self {
            default_region: default_region.into(),
            fallback_credentials,
        }
    }
}

impl BackendFactory for S3BackendFactory {
    fn build(&self, settings: &BackendSettings) -> Box<dyn ObjectBackend> {
        Box::new(S3Backend::from_settings(
            settings,
            &self.default_region,
            self.fallback_credentials.as_ref(),
        ))
    }
}
