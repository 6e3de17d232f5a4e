//! Per-request backend client resolution.
//!
//! Callers may point a request at a different endpoint or sign it with their
//! own credentials through [`StorageOptions`]. The [`ClientResolver`] turns
//! those options into a [`ClientLease`]: either the process-wide default
//! backend, shared and never disposed by a request, or a freshly built backend
//! owned by exactly one request.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::debug;

use crate::backend::{BackendFactory, BackendSettings, ObjectBackend};
use crate::credentials::ParsedCredentials;

static REGION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z]{2}(-[a-z]+)+-\d+$").expect("static region pattern should be valid")
});

/// Storage options supplied with a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageOptions {
    /// Region of the target store; `auto` means "no region".
    pub region: Option<String>,
    /// Endpoint host or URL of the target store.
    pub endpoint_hostname: Option<String>,
    /// Application name reported to the store.
    pub agent: Option<String>,
    /// Credentials JSON in the v2 SDK shape.
    pub v2_credentials: Option<String>,
    /// Credentials JSON in the v3 SDK shape.
    pub v3_credentials: Option<String>,
}

impl StorageOptions {
    fn endpoint(&self) -> Option<&str> {
        non_blank(self.endpoint_hostname.as_deref())
    }

    /// Credentials JSON to use, preferring the v3 shape.
    fn credentials_json(&self) -> Option<&str> {
        non_blank(self.v3_credentials.as_deref()).or_else(|| non_blank(self.v2_credentials.as_deref()))
    }

    /// Whether the options ask for anything beyond the default client.
    #[must_use]
    pub fn requests_custom_client(&self) -> bool {
        self.endpoint().is_some() || self.credentials_json().is_some()
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// A backend handed to one request.
#[derive(Debug)]
pub enum ClientLease {
    /// The process-wide default; never disposed by a request.
    Shared(Arc<dyn ObjectBackend>),
    /// Built for this request and disposed when released.
    Owned(Box<dyn ObjectBackend>),
}

impl ClientLease {
    /// The leased backend.
    #[must_use]
    pub fn backend(&self) -> &dyn ObjectBackend {
        match self {
            Self::Shared(backend) => backend.as_ref(),
            Self::Owned(backend) => backend.as_ref(),
        }
    }

    /// Whether this lease is the shared default.
    #[must_use]
    pub fn is_shared(&self) -> bool {
        matches!(self, Self::Shared(_))
    }
}

/// Resolves storage options into backend leases.
#[derive(Debug, Clone)]
pub struct ClientResolver {
    default: Arc<dyn ObjectBackend>,
    factory: Arc<dyn BackendFactory>,
}

impl ClientResolver {
    /// Create a resolver around the process-wide default backend.
    #[must_use]
    pub fn new(default: Arc<dyn ObjectBackend>, factory: Arc<dyn BackendFactory>) -> Self {
        Self { default, factory }
    }

    /// Produce a backend lease for a request.
    #[must_use]
    pub fn resolve(&self, options: Option<&StorageOptions>) -> ClientLease {
        match options.and_then(settings_for) {
            Some(settings) => {
                debug!(
                    endpoint = ?settings.endpoint,
                    region = ?settings.region,
                    explicit_credentials = settings.credentials.is_some(),
                    "building per-request backend client"
                );
                ClientLease::Owned(self.factory.build(&settings))
            }
            None => ClientLease::Shared(Arc::clone(&self.default)),
        }
    }

    /// Release a lease. Owned backends are disposed; the shared default is
    /// left untouched.
    pub fn release(&self, lease: ClientLease) {
        match lease {
            ClientLease::Shared(_) => {}
            ClientLease::Owned(backend) => {
                debug!("disposing per-request backend client");
                drop(backend);
            }
        }
    }
}

/// Translate request options into backend settings.
///
/// Returns `None` when the default client should be used: no endpoint and no
/// credentials JSON, or credentials that fail to parse with no endpoint.
#[must_use]
pub fn settings_for(options: &StorageOptions) -> Option<BackendSettings> {
    if !options.requests_custom_client() {
        return None;
    }

    let credentials = options.credentials_json().and_then(|json| {
        let parsed = ParsedCredentials::parse(json);
        if parsed.is_none() {
            debug!("ignoring credentials JSON without access and secret keys");
        }
        parsed
    });
    let endpoint = options.endpoint().map(normalize_endpoint);

    if credentials.is_none() && endpoint.is_none() {
        return None;
    }

    Some(BackendSettings {
        endpoint,
        region: options.region.as_deref().and_then(recognised_region),
        credentials,
        app_name: non_blank(options.agent.as_deref()).map(str::to_owned),
    })
}

/// Normalise an endpoint: trim, default to `https://`, drop a trailing slash.
///
/// # Examples
///
/// ```
/// use colvault_core::resolver::normalize_endpoint;
///
/// assert_eq!(normalize_endpoint(" minio.local:9000/ "), "https://minio.local:9000");
/// assert_eq!(normalize_endpoint("http://localhost:4566"), "http://localhost:4566");
/// ```
#[must_use]
pub fn normalize_endpoint(raw: &str) -> String {
    let trimmed = raw.trim();
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_owned()
    } else {
        format!("https://{trimmed}")
    };
    match with_scheme.strip_suffix('/') {
        Some(stripped) => stripped.to_owned(),
        None => with_scheme,
    }
}

/// Return the region if it should be applied to a client.
///
/// `auto` (any case) and blank values mean "no region". Names that do not look
/// like a region are ignored rather than rejected.
#[must_use]
pub fn recognised_region(region: &str) -> Option<String> {
    let region = region.trim();
    if region.is_empty() || region.eq_ignore_ascii_case("auto") {
        return None;
    }
    if REGION_PATTERN.is_match(region) {
        Some(region.to_owned())
    } else {
        debug!(region, "ignoring unrecognised region");
        None
    }
}
