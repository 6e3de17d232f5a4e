//! Request routing and query binding.
//!
//! Objects are addressed path-style: the first path segment is the bucket and
//! the remainder, which may contain `/`, is the key. Both are percent-decoded.
//! Storage options travel as query parameters whose names are matched
//! case-insensitively.

use colvault_core::StorageOptions;
use percent_encoding::percent_decode_str;

/// Retry attempts assumed when `retryOptions` is absent or unparsable.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Timeout assumed when `timeoutOptionsMs` is absent or unparsable.
pub const DEFAULT_TIMEOUT_MS: u64 = 3000;

/// What a request asks the gateway to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Liveness probe.
    Health,
    /// `GET /`.
    Banner,
    /// Download an object.
    GetObject(ObjectPath),
    /// Upload an object.
    PutObject(ObjectPath),
    /// Any other method.
    MethodNotAllowed,
}

/// Bucket and key taken from the request path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectPath {
    /// First path segment, decoded.
    pub bucket: Option<String>,
    /// Everything after the first segment, decoded.
    pub key: Option<String>,
}

/// Per-request options bound from the query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOptions {
    /// Object version to read.
    pub version_id: Option<String>,
    /// Options that select the backend client.
    pub storage: StorageOptions,
    /// Accepted but not applied to backend calls.
    pub retry_attempts: u32,
    /// Accepted but not applied to backend calls.
    pub timeout_ms: u64,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            version_id: None,
            storage: StorageOptions::default(),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl RequestOptions {
    /// Bind options from a raw query string.
    ///
    /// # Examples
    ///
    /// ```
    /// use colvault_http::router::RequestOptions;
    ///
    /// let opts = RequestOptions::from_query(Some("Region=eu-west-1&VERSIONID=v2"));
    /// assert_eq!(opts.storage.region.as_deref(), Some("eu-west-1"));
    /// assert_eq!(opts.version_id.as_deref(), Some("v2"));
    /// assert_eq!(opts.retry_attempts, 3);
    /// ```
    #[must_use]
    pub fn from_query(query: Option<&str>) -> Self {
        let params = parse_query_params(query.unwrap_or(""));
        let value = |name: &str| query_value(&params, name).map(str::to_owned);

        Self {
            version_id: value("version").or_else(|| value("versionId")),
            storage: StorageOptions {
                region: value("region"),
                endpoint_hostname: value("endpointHostname"),
                agent: value("agent"),
                v2_credentials: value("v2AwsSdkCredentials"),
                v3_credentials: value("v3AwsSdkCredentials"),
            },
            retry_attempts: query_value(&params, "retryOptions")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(DEFAULT_RETRY_ATTEMPTS),
            timeout_ms: query_value(&params, "timeoutOptionsMs")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(DEFAULT_TIMEOUT_MS),
        }
    }
}

/// Map a method and path to a [`Route`].
#[must_use]
pub fn route(method: &http::Method, path: &str) -> Route {
    let is_get = *method == http::Method::GET;
    if is_get && (path == "/health" || path == "/_health") {
        return Route::Health;
    }
    if is_get && (path == "/" || path.is_empty()) {
        return Route::Banner;
    }

    let (bucket, key) = parse_path(path);
    let target = ObjectPath { bucket, key };
    match *method {
        http::Method::GET => Route::GetObject(target),
        http::Method::PUT => Route::PutObject(target),
        _ => Route::MethodNotAllowed,
    }
}

fn parse_path(path: &str) -> (Option<String>, Option<String>) {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    if trimmed.is_empty() {
        return (None, None);
    }

    if let Some(pos) = trimmed.find('/') {
        let bucket = decode_uri_component(&trimmed[..pos]);
        let key_raw = &trimmed[pos + 1..];
        let key = if key_raw.is_empty() {
            None
        } else {
            Some(decode_uri_component(key_raw))
        };
        (Some(bucket).filter(|b| !b.is_empty()), key)
    } else {
        (Some(decode_uri_component(trimmed)), None)
    }
}

fn decode_uri_component(s: &str) -> String {
    percent_decode_str(s).decode_utf8_lossy().into_owned()
}

fn parse_query_params(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|s| !s.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (decode_uri_component(key), decode_uri_component(value)),
            None => (decode_uri_component(pair), String::new()),
        })
        .collect()
}

fn query_value<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(bucket: Option<&str>, key: Option<&str>) -> ObjectPath {
        ObjectPath {
            bucket: bucket.map(str::to_owned),
            key: key.map(str::to_owned),
        }
    }

    #[test]
    fn test_should_route_health_and_banner() {
        assert_eq!(route(&http::Method::GET, "/health"), Route::Health);
        assert_eq!(route(&http::Method::GET, "/_health"), Route::Health);
        assert_eq!(route(&http::Method::GET, "/"), Route::Banner);
    }

    #[test]
    fn test_should_route_object_requests() {
        assert_eq!(
            route(&http::Method::GET, "/reports/2024/q1.parquet"),
            Route::GetObject(object(Some("reports"), Some("2024/q1.parquet")))
        );
        assert_eq!(
            route(&http::Method::PUT, "/reports/a%20b.txt"),
            Route::PutObject(object(Some("reports"), Some("a b.txt")))
        );
    }

    #[test]
    fn test_should_leave_missing_parts_empty() {
        assert_eq!(
            route(&http::Method::GET, "/reports"),
            Route::GetObject(object(Some("reports"), None))
        );
        assert_eq!(
            route(&http::Method::GET, "/reports/"),
            Route::GetObject(object(Some("reports"), None))
        );
        assert_eq!(
            route(&http::Method::PUT, "/"),
            Route::PutObject(object(None, None))
        );
        assert_eq!(
            route(&http::Method::GET, "//key"),
            Route::GetObject(object(None, Some("key")))
        );
    }

    #[test]
    fn test_should_reject_other_methods() {
        assert_eq!(
            route(&http::Method::DELETE, "/reports/a"),
            Route::MethodNotAllowed
        );
        assert_eq!(route(&http::Method::POST, "/"), Route::MethodNotAllowed);
    }

    #[test]
    fn test_should_bind_storage_options_case_insensitively() {
        let opts = RequestOptions::from_query(Some(
            "ENDPOINTHOSTNAME=minio.local%3A9000&agent=etl&v3awssdkcredentials=%7B%22accessKeyId%22%3A%22a%22%7D",
        ));
        assert_eq!(
            opts.storage.endpoint_hostname.as_deref(),
            Some("minio.local:9000")
        );
        assert_eq!(opts.storage.agent.as_deref(), Some("etl"));
        assert_eq!(
            opts.storage.v3_credentials.as_deref(),
            Some(r#"{"accessKeyId":"a"}"#)
        );
        assert!(opts.storage.v2_credentials.is_none());
    }

    #[test]
    fn test_should_prefer_version_over_version_id() {
        let opts = RequestOptions::from_query(Some("versionId=b&version=a"));
        assert_eq!(opts.version_id.as_deref(), Some("a"));
    }

    #[test]
    fn test_should_parse_retry_and_timeout_with_defaults() {
        let opts = RequestOptions::from_query(Some("retryOptions=5&timeoutOptionsMs=250"));
        assert_eq!(opts.retry_attempts, 5);
        assert_eq!(opts.timeout_ms, 250);

        let opts = RequestOptions::from_query(Some("retryOptions=lots"));
        assert_eq!(opts.retry_attempts, DEFAULT_RETRY_ATTEMPTS);
        assert_eq!(opts.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(RequestOptions::from_query(None), RequestOptions::default());
    }
}
