//! The gateway service implementing hyper's `Service` trait.
//!
//! [`GatewayService`] handles, in order:
//!
//! 1. Health check interception (`GET /health`, `GET /_health`)
//! 2. The banner at `GET /`
//! 3. Routing `GET`/`PUT` object requests to the [`ObjectHandler`]
//! 4. Common response headers (`x-request-id`, `Server`)
//!
//! Each request owns a [`CancellationToken`] that fires if the request future
//! is dropped before a response is produced, for example when the client
//! disconnects mid-upload.

use std::convert::Infallible;
use std::error::Error as StdError;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use hyper::service::Service;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::body::GatewayBody;
use crate::handler::ObjectHandler;
use crate::response::json_error;
use crate::router::{RequestOptions, Route, route};

/// Value of the `Server` response header.
pub const SERVER_NAME: &str = "colvault";

/// Header carrying the per-request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

const BANNER: &str = "colvault gateway: GET or PUT /{bucket}/{key}\n";

/// The gateway HTTP service.
#[derive(Debug, Clone)]
pub struct GatewayService {
    handler: Arc<ObjectHandler>,
}

impl GatewayService {
    /// Create a service dispatching object requests to `handler`.
    #[must_use]
    pub fn new(handler: ObjectHandler) -> Self {
        Self {
            handler: Arc::new(handler),
        }
    }
}

impl<B> Service<http::Request<B>> for GatewayService
where
    B: http_body::Body<Data = Bytes> + Send + Unpin + 'static,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    type Response = http::Response<GatewayBody>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: http::Request<B>) -> Self::Future {
        let handler = Arc::clone(&self.handler);

        Box::pin(async move {
            let request_id = Uuid::new_v4().to_string();
            let cancel = CancellationToken::new();
            let guard = cancel.clone().drop_guard();

            let response = process_request(req, &handler, &cancel, &request_id).await;

            // Streaming bodies outlive this future; only an abandoned request
            // cancels the token.
            guard.disarm();
            Ok(add_common_headers(response, &request_id))
        })
    }
}

async fn process_request<B>(
    req: http::Request<B>,
    handler: &ObjectHandler,
    cancel: &CancellationToken,
    request_id: &str,
) -> http::Response<GatewayBody>
where
    B: http_body::Body<Data = Bytes> + Send + Unpin + 'static,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    let (parts, body) = req.into_parts();
    let method = &parts.method;
    let uri = &parts.uri;
    debug!(%method, %uri, request_id, "processing request");

    let route = route(method, uri.path());
    if !matches!(route, Route::Health) {
        info!(%method, path = uri.path(), request_id, "routed request");
    }

    match route {
        Route::Health => health_check_response(),
        Route::Banner => banner_response(),
        Route::MethodNotAllowed => {
            json_error(http::StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
        }
        Route::GetObject(target) => {
            let options = RequestOptions::from_query(uri.query());
            handler
                .get_object(target, options, &parts.headers, cancel, request_id)
                .await
        }
        Route::PutObject(target) => {
            let options = RequestOptions::from_query(uri.query());
            handler
                .put_object(target, options, &parts.headers, body, cancel, request_id)
                .await
        }
    }
}

/// Produce a health check response.
fn health_check_response() -> http::Response<GatewayBody> {
    http::Response::builder()
        .status(http::StatusCode::OK)
        .header("Content-Type", "application/json")
        .body(GatewayBody::from_string(
            r#"{"status":"running","service":"colvault"}"#,
        ))
        .expect("static health response should be valid")
}

fn banner_response() -> http::Response<GatewayBody> {
    http::Response::builder()
        .status(http::StatusCode::OK)
        .header("Content-Type", "text/plain; charset=utf-8")
        .body(GatewayBody::from_string(BANNER))
        .expect("static banner response should be valid")
}

/// Add common response headers to every response.
fn add_common_headers(
    mut response: http::Response<GatewayBody>,
    request_id: &str,
) -> http::Response<GatewayBody> {
    let headers = response.headers_mut();

    if let Ok(hv) = http::header::HeaderValue::from_str(request_id) {
        headers.insert(REQUEST_ID_HEADER, hv);
    }
    headers.insert(
        http::header::SERVER,
        http::header::HeaderValue::from_static(SERVER_NAME),
    );

    response
}
