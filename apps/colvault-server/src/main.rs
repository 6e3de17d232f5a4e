//! colvault server - Parquet-encrypting gateway for S3-compatible storage.
//!
//! Objects are read and written path-style (`/{bucket}/{key}`). Parquet
//! objects are encrypted per column on upload and decrypted on download;
//! everything else passes through.
//!
//! # Usage
//!
//! ```text
//! GATEWAY_LISTEN=0.0.0.0:8080 R2_ENDPOINT=https://<account>.r2.cloudflarestorage.com colvault-server
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `GATEWAY_LISTEN` | `0.0.0.0:8080` | Bind address |
//! | `LOG_LEVEL` | `info` | Log level filter |
//! | `RUST_LOG` | *(unset)* | Fine-grained tracing filter (overrides `LOG_LEVEL`) |
//! | `FORCE_UPLOAD_BUFFERING` | `true` | Spool every non-Parquet upload to disk |
//! | `MAX_UPLOAD_BUFFER_BYTES` | `104857600` | Largest spooled upload |
//! | `UPLOAD_TEMP_DIR` | system temp dir | Where spooled uploads are written |
//! | `R2_ENDPOINT` / `BACKEND_ENDPOINT` | *(unset)* | Default backend endpoint |
//! | `R2_ACCESS_KEY_ID` / `R2_SECRET_ACCESS_KEY` | *(empty)* | Default backend credentials |
//! | `R2_REGION` | `auto` | Default backend region |
//! | `DEFAULT_REGION` | `us-east-1` | Signing region when none applies |

use std::sync::Arc;

use anyhow::{Context, Result};
use aws_config::BehaviorVersion;
use aws_config::meta::region::RegionProviderChain;
use aws_credential_types::Credentials;
use aws_credential_types::provider::SharedCredentialsProvider;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as HttpConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use colvault_core::GatewayConfig;
use colvault_core::backend::s3::{S3Backend, S3BackendFactory};
use colvault_core::backend::{BackendSettings, ObjectBackend};
use colvault_core::credentials::ParsedCredentials;
use colvault_core::resolver::{ClientResolver, normalize_endpoint, recognised_region};
use colvault_core::upload::UploadSettings;
use colvault_http::{GatewayService, ObjectHandler};

/// Server version reported at startup.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Provider name attached to credentials read from the environment.
const ENV_CREDENTIALS_PROVIDER: &str = "colvault-env";

/// Initialize the tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise falls back to the `LOG_LEVEL` config value.
fn init_tracing(log_level: &str) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level filter: {log_level}"))?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    Ok(())
}

/// Static credentials from `R2_ACCESS_KEY_ID` / `R2_SECRET_ACCESS_KEY`, if both are set.
fn configured_credentials(config: &GatewayConfig) -> Option<ParsedCredentials> {
    if config.backend_access_key_id.is_empty() || config.backend_secret_access_key.is_empty() {
        return None;
    }
    Some(ParsedCredentials {
        access_key: config.backend_access_key_id.clone(),
        secret_key: config.backend_secret_access_key.clone(),
        session_token: None,
    })
}

/// Build the process-wide default backend and the credentials per-request
/// clients fall back to.
///
/// An explicit endpoint selects a path-style client against it; otherwise the
/// standard AWS configuration chain (environment, profile, instance metadata)
/// is used.
async fn build_default_backend(
    config: &GatewayConfig,
) -> (Arc<dyn ObjectBackend>, Option<SharedCredentialsProvider>) {
    let credentials = configured_credentials(config);

    if let Some(endpoint) = &config.backend_endpoint {
        let fallback = credentials.as_ref().map(|c| {
            SharedCredentialsProvider::new(Credentials::new(
                c.access_key.clone(),
                c.secret_key.clone(),
                None,
                None,
                ENV_CREDENTIALS_PROVIDER,
            ))
        });
        let settings = BackendSettings {
            endpoint: Some(normalize_endpoint(endpoint)),
            region: recognised_region(&config.backend_region),
            credentials,
            app_name: None,
        };
        info!(
            endpoint = ?settings.endpoint,
            region = ?settings.region,
            static_credentials = settings.credentials.is_some(),
            "using configured backend endpoint"
        );
        let backend = S3Backend::from_settings(&settings, &config.default_region, None);
        return (Arc::new(backend), fallback);
    }

    let region = RegionProviderChain::default_provider()
        .or_else(aws_config::Region::new(config.default_region.clone()));
    let sdk_config = aws_config::defaults(BehaviorVersion::latest())
        .region(region)
        .load()
        .await;
    let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
        .force_path_style(true)
        .build();
    info!(region = ?sdk_config.region(), "using AWS default backend configuration");

    let backend = S3Backend::new(aws_sdk_s3::Client::from_conf(s3_config));
    (Arc::new(backend), sdk_config.credentials_provider())
}

/// Run the accept loop, serving connections until a shutdown signal is received.
async fn serve(listener: TcpListener, service: GatewayService) -> Result<()> {
    let graceful = hyper_util::server::graceful::GracefulShutdown::new();
    let http = HttpConnBuilder::new(TokioExecutor::new());

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal, draining connections");
    };

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer_addr) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };

                let svc = service.clone();
                let conn = http.serve_connection(TokioIo::new(stream), svc);
                let conn = graceful.watch(conn.into_owned());

                tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        error!(peer_addr = %peer_addr, error = %e, "connection error");
                    }
                });
            }

            () = &mut shutdown => {
                info!("shutting down gracefully");
                break;
            }
        }
    }

    // Wait for in-flight requests to complete.
    graceful.shutdown().await;
    info!("all connections drained, exiting");

    Ok(())
}

/// Perform a health check by connecting to the gateway and requesting the health endpoint.
///
/// Exits with code 0 if healthy, 1 otherwise.
async fn run_health_check(addr: &str) -> Result<()> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    let stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("cannot connect to {addr}"))?;

    let (mut reader, mut writer) = stream.into_split();

    let request = format!("GET /health HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    writer.write_all(request.as_bytes()).await?;
    writer.shutdown().await?;

    let mut response = String::new();
    reader.read_to_string(&mut response).await?;

    if response.contains("200 OK") && response.contains("\"status\":\"running\"") {
        Ok(())
    } else {
        anyhow::bail!("unhealthy response from {addr}")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Handle --health-check flag for Docker HEALTHCHECK.
    if std::env::args().any(|a| a == "--health-check") {
        let config = GatewayConfig::from_env();
        let addr = config.gateway_listen.replace("0.0.0.0", "127.0.0.1");
        let healthy = run_health_check(&addr).await.is_ok();
        std::process::exit(i32::from(!healthy));
    }

    let config = GatewayConfig::from_env();

    init_tracing(&config.log_level)?;

    info!(
        gateway_listen = %config.gateway_listen,
        force_upload_buffering = config.force_upload_buffering,
        max_upload_buffer_bytes = config.max_upload_buffer_bytes,
        default_region = %config.default_region,
        version = VERSION,
        "starting colvault server",
    );

    let (default_backend, fallback_credentials) = build_default_backend(&config).await;
    let factory = S3BackendFactory::new(config.default_region.clone(), fallback_credentials);
    let resolver = ClientResolver::new(default_backend, Arc::new(factory));
    let handler = ObjectHandler::new(resolver, UploadSettings::from(&config));
    let service = GatewayService::new(handler);

    let listener = TcpListener::bind(&config.gateway_listen)
        .await
        .with_context(|| format!("failed to bind to {}", config.gateway_listen))?;

    info!(addr = %config.gateway_listen, "colvault server listening");

    serve(listener, service).await
}
