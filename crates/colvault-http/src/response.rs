//! JSON response construction.
//!
//! Errors are reported as `{"error": "<message>"}` with the status from
//! [`GatewayError::status_code`]; variants without a body message produce a
//! status-only response.

use colvault_core::GatewayError;
use colvault_core::range::unsatisfied_content_range;
use http::header::{CONTENT_RANGE, CONTENT_TYPE};
use serde::Serialize;
use tracing::error;

use crate::body::GatewayBody;

const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

/// Body returned by a successful upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PutObjectBody {
    /// Stored ETag with quotes trimmed from both ends.
    pub etag: Option<String>,
    /// Stored version identifier with quotes trimmed from both ends.
    #[serde(rename = "versionId")]
    pub version_id: Option<String>,
}

/// Serialize `value` as a JSON response with the given status.
pub fn json_response<T: Serialize>(
    status: http::StatusCode,
    value: &T,
) -> http::Response<GatewayBody> {
    match serde_json::to_vec(value) {
        Ok(json) => http::Response::builder()
            .status(status)
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
            .body(GatewayBody::from_bytes(json))
            .unwrap_or_else(|_| status_only(http::StatusCode::INTERNAL_SERVER_ERROR)),
        Err(err) => {
            error!(error = %err, "failed to serialize JSON response");
            status_only(http::StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Build a JSON `{"error": message}` response.
pub fn json_error(status: http::StatusCode, message: &str) -> http::Response<GatewayBody> {
    json_response(status, &ErrorBody { error: message })
}

/// Build the response for a failed request.
pub fn error_to_response(err: &GatewayError) -> http::Response<GatewayBody> {
    let status = err.status_code();
    let mut response = match err.body_message() {
        Some(message) => json_error(status, &message),
        None => status_only(status),
    };

    if let GatewayError::RangeNotSatisfiable { content_length } = err {
        if let Ok(value) = unsatisfied_content_range(*content_length).parse() {
            response.headers_mut().insert(CONTENT_RANGE, value);
        }
    }
    response
}

/// A response with a status and no body.
pub fn status_only(status: http::StatusCode) -> http::Response<GatewayBody> {
    let mut response = http::Response::new(GatewayBody::empty());
    *response.status_mut() = status;
    response
}

/// Remove double quotes from both ends of a value.
#[must_use]
pub fn trim_quotes(value: &str) -> &str {
    value.trim_matches('"')
}
