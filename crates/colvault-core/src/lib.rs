//! Core data path of the colvault gateway.
//!
//! colvault exposes a path-style object API in front of an S3-compatible
//! store. Parquet objects are encrypted column-by-column on the way in and
//! decrypted on the way out, and byte ranges are served against the
//! decrypted content. This crate holds everything except the HTTP server:
//!
//! - [`resolver`]: per-request backend clients from caller-supplied options.
//! - [`upload`]: the spool-to-disk decision tree for inbound bodies.
//! - [`range`]: `Range` header parsing, bounds resolution and slicing.
//! - [`columnar`]: Parquet modular encryption and decryption.
//! - [`backend`]: the [`ObjectBackend`](backend::ObjectBackend) seam and its
//!   S3 implementation.
//!
//! # Architecture
//!
//! ```text
//!   HTTP layer (colvault-http)
//!        |
//!        v
//!   ClientResolver ----> ObjectBackend (S3Backend / test doubles)
//!        |
//!        +--> upload::prepare_upload   (PUT, non-columnar)
//!        +--> columnar::{encrypt, decrypt}
//!        +--> range::{RangeSpec, copy_range}   (GET)
//! ```

pub mod backend;
pub mod columnar;
pub mod config;
pub mod credentials;
pub mod error;
pub mod range;
pub mod resolver;
pub mod source;
pub mod upload;

pub use config::GatewayConfig;
pub use error::{GatewayError, GatewayResult};
pub use resolver::{ClientLease, ClientResolver, StorageOptions};
