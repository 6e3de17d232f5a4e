//! Gateway response body supporting buffered, streaming and empty modes.
//!
//! - **Buffered**: JSON payloads, error bodies and the banner.
//! - **Streaming**: object content read from a pipe fed by a copy task.
//! - **Empty**: status-only responses such as 416 and backend auth failures.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use colvault_core::source::BoxedReader;
use futures::Stream;
use http_body_util::Full;
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;

/// Response body implementing [`http_body::Body`].
#[derive(Default)]
pub enum GatewayBody {
    /// Fully buffered content.
    Buffered(Full<Bytes>),
    /// Content pulled chunk by chunk from a reader.
    Streaming(ReaderStream<BoxedReader>),
    /// No content.
    #[default]
    Empty,
}

impl fmt::Debug for GatewayBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buffered(full) => f.debug_tuple("Buffered").field(full).finish(),
            Self::Streaming(_) => f.write_str("Streaming"),
            Self::Empty => f.write_str("Empty"),
        }
    }
}

impl GatewayBody {
    /// Create a buffered body from bytes.
    #[must_use]
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self::Buffered(Full::new(data.into()))
    }

    /// Create a buffered body from a UTF-8 string.
    #[must_use]
    pub fn from_string(s: impl Into<String>) -> Self {
        Self::Buffered(Full::new(Bytes::from(s.into())))
    }

    /// Create a streaming body that yields whatever `reader` produces.
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        let reader: BoxedReader = Box::pin(reader);
        Self::Streaming(ReaderStream::with_capacity(
            reader,
            colvault_core::source::TRANSFER_CHUNK_SIZE,
        ))
    }

    /// Create an empty body.
    #[must_use]
    pub fn empty() -> Self {
        Self::Empty
    }
}

impl http_body::Body for GatewayBody {
    type Data = Bytes;
    type Error = std::io::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<http_body::Frame<Self::Data>, Self::Error>>> {
        match self.get_mut() {
            Self::Buffered(full) => Pin::new(full)
                .poll_frame(cx)
                .map_err(|never| match never {}),
            Self::Streaming(stream) => Pin::new(stream)
                .poll_next(cx)
                .map(|chunk| chunk.map(|res| res.map(http_body::Frame::data))),
            Self::Empty => Poll::Ready(None),
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            Self::Buffered(full) => full.is_end_stream(),
            Self::Streaming(_) => false,
            Self::Empty => true,
        }
    }

    fn size_hint(&self) -> http_body::SizeHint {
        match self {
            Self::Buffered(full) => full.size_hint(),
            Self::Streaming(_) => http_body::SizeHint::default(),
            Self::Empty => http_body::SizeHint::with_exact(0),
        }
    }
}
