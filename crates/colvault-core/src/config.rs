//! Gateway configuration.
//!
//! Provides [`GatewayConfig`] for configuring the colvault gateway. Values are
//! loaded from environment variables; every field has a default so the gateway
//! starts with an empty environment.

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// Default maximum number of bytes buffered to disk for a single upload (100 MiB).
pub const DEFAULT_MAX_UPLOAD_BUFFER_BYTES: u64 = 100 * 1024 * 1024;

/// Gateway configuration.
///
/// # Examples
///
/// ```
/// use colvault_core::config::GatewayConfig;
///
/// let config = GatewayConfig::default();
/// assert_eq!(config.gateway_listen, "0.0.0.0:8080");
/// assert!(config.force_upload_buffering);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Bind address for the HTTP listener.
    #[builder(default = String::from("0.0.0.0:8080"))]
    pub gateway_listen: String,

    /// Log level filter string (e.g. `"info"`, `"debug"`).
    #[builder(default = String::from("info"))]
    pub log_level: String,

    /// Buffer every non-columnar upload to a temp file regardless of body shape.
    #[builder(default = true)]
    pub force_upload_buffering: bool,

    /// Upper bound on bytes buffered to disk for one upload.
    #[builder(default = DEFAULT_MAX_UPLOAD_BUFFER_BYTES)]
    pub max_upload_buffer_bytes: u64,

    /// Directory for upload temp files. `None` means the system temp dir.
    #[builder(default, setter(strip_option))]
    pub upload_temp_dir: Option<String>,

    /// Endpoint of the default backend (S3, R2, MinIO, ...).
    #[builder(default, setter(strip_option))]
    pub backend_endpoint: Option<String>,

    /// Access key of the default backend.
    #[builder(default)]
    pub backend_access_key_id: String,

    /// Secret key of the default backend.
    #[builder(default)]
    #[serde(skip_serializing, default)]
    pub backend_secret_access_key: String,

    /// Region of the default backend; `auto` means "no region".
    #[builder(default = String::from("auto"))]
    pub backend_region: String,

    /// Signing region used whenever no usable region was supplied.
    #[builder(default = String::from("us-east-1"))]
    pub default_region: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            gateway_listen: String::from("0.0.0.0:8080"),
            log_level: String::from("info"),
            force_upload_buffering: true,
            max_upload_buffer_bytes: DEFAULT_MAX_UPLOAD_BUFFER_BYTES,
            upload_temp_dir: None,
            backend_endpoint: None,
            backend_access_key_id: String::new(),
            backend_secret_access_key: String::new(),
            backend_region: String::from("auto"),
            default_region: String::from("us-east-1"),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `GATEWAY_LISTEN` | `0.0.0.0:8080` |
    /// | `LOG_LEVEL` | `info` |
    /// | `FORCE_UPLOAD_BUFFERING` | `true` |
    /// | `MAX_UPLOAD_BUFFER_BYTES` | `104857600` |
    /// | `UPLOAD_TEMP_DIR` | *(system temp dir)* |
    /// | `R2_ENDPOINT` / `BACKEND_ENDPOINT` | *(unset)* |
    /// | `R2_ACCESS_KEY_ID` | *(empty)* |
    /// | `R2_SECRET_ACCESS_KEY` | *(empty)* |
    /// | `R2_REGION` | `auto` |
    /// | `DEFAULT_REGION` | `us-east-1` |
    ///
    /// An unset or empty `FORCE_UPLOAD_BUFFERING` keeps buffering forced.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    ///
    /// [`from_env`](Self::from_env) delegates here; tests pass a map instead
    /// of mutating the process environment.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup("GATEWAY_LISTEN") {
            config.gateway_listen = v;
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            config.log_level = v;
        }
        if let Some(v) = lookup("FORCE_UPLOAD_BUFFERING") {
            config.force_upload_buffering = v.is_empty() || parse_bool(&v);
        }
        if let Some(v) = lookup("MAX_UPLOAD_BUFFER_BYTES") {
            if let Ok(n) = v.trim().parse::<u64>() {
                config.max_upload_buffer_bytes = n;
            }
        }
        if let Some(v) = lookup("UPLOAD_TEMP_DIR").filter(|v| !v.is_empty()) {
            config.upload_temp_dir = Some(v);
        }
        if let Some(v) = lookup("R2_ENDPOINT")
            .or_else(|| lookup("BACKEND_ENDPOINT"))
            .filter(|v| !v.trim().is_empty())
        {
            config.backend_endpoint = Some(v);
        }
        if let Some(v) = lookup("R2_ACCESS_KEY_ID") {
            config.backend_access_key_id = v;
        }
        if let Some(v) = lookup("R2_SECRET_ACCESS_KEY") {
            config.backend_secret_access_key = v;
        }
        if let Some(v) = lookup("R2_REGION") {
            config.backend_region = v;
        }
        if let Some(v) = lookup("DEFAULT_REGION") {
            config.default_region = v;
        }

        config
    }
}

/// Parse a string as a boolean, accepting `"1"` and `"true"` (case-insensitive).
fn parse_bool(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}
