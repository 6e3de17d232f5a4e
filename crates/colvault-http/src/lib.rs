//! HTTP layer of the colvault gateway.
//!
//! - **Routing** ([`router`]): maps method and path to a [`Route`](router::Route)
//!   and binds storage options from the query string.
//! - **Orchestration** ([`handler`]): GET and PUT flows over the engines in
//!   `colvault-core`.
//! - **Responses** ([`response`]): JSON bodies and error mapping.
//! - **Service** ([`service`]): the hyper [`GatewayService`](service::GatewayService).
//! - **Body** ([`body`]): the [`GatewayBody`](body::GatewayBody) type with a
//!   streaming variant for object content.
//!
//! # Architecture
//!
//! ```text
//! HTTP Request
//!   -> GatewayService (hyper Service)
//!     -> Health check / banner interception
//!     -> route (bucket + key from path, options from query)
//!     -> ObjectHandler::{get_object, put_object}
//!     -> Common response headers (x-request-id, Server)
//!   <- HTTP Response
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use colvault_core::backend::memory::MemoryBackend;
//! use colvault_core::backend::s3::S3BackendFactory;
//! use colvault_core::upload::UploadSettings;
//! use colvault_core::{ClientResolver, GatewayConfig};
//! use colvault_http::{GatewayService, ObjectHandler};
//!
//! let config = GatewayConfig::default();
//! let resolver = ClientResolver::new(
//!     Arc::new(MemoryBackend::new()),
//!     Arc::new(S3BackendFactory::new(config.default_region.clone(), None)),
//! );
//! let service = GatewayService::new(ObjectHandler::new(resolver, UploadSettings::from(&config)));
//! // Use `service` with hyper server.
//! ```

pub mod body;
pub mod handler;
pub mod response;
pub mod router;
pub mod service;

pub use body::GatewayBody;
pub use handler::ObjectHandler;
pub use router::{ObjectPath, RequestOptions, Route};
pub use service::GatewayService;
