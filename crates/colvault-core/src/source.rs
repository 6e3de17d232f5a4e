//! Byte sources and cancellable chunked I/O.
//!
//! Request and response bodies are either fully materialised in memory, and
//! therefore seekable with a known length, or forward-only streams. Range
//! slicing and upload ingestion both branch on that distinction.

use std::fmt;
use std::io::Cursor;
use std::pin::Pin;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::error::{GatewayError, GatewayResult};

/// Size of every transfer chunk used by range copies and upload buffering.
pub const TRANSFER_CHUNK_SIZE: usize = 81_920;

/// Upper bound on buffer space reserved up front from a declared length.
const MAX_PREALLOCATION: usize = 16 * 1024 * 1024;

/// Boxed forward-only reader.
pub type BoxedReader = Pin<Box<dyn AsyncRead + Send>>;

/// A body that is either seekable in memory or a forward-only stream.
pub enum ByteSource {
    /// Materialised content; seekable, length known.
    Memory(Cursor<Bytes>),
    /// Forward-only stream with an optional declared length.
    Stream {
        /// The underlying reader.
        reader: BoxedReader,
        /// Length announced by the producer (e.g. `Content-Length`).
        declared_length: Option<u64>,
    },
}

impl fmt::Debug for ByteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory(cursor) => f
                .debug_struct("Memory")
                .field("len", &cursor.get_ref().len())
                .field("position", &cursor.position())
                .finish(),
            Self::Stream {
                declared_length, ..
            } => f
                .debug_struct("Stream")
                .field("declared_length", declared_length)
                .finish_non_exhaustive(),
        }
    }
}

impl ByteSource {
    /// Wrap materialised bytes.
    #[must_use]
    pub fn memory(bytes: impl Into<Bytes>) -> Self {
        Self::Memory(Cursor::new(bytes.into()))
    }

    /// Wrap a forward-only reader.
    pub fn stream<R>(reader: R, declared_length: Option<u64>) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        Self::Stream {
            reader: Box::pin(reader),
            declared_length,
        }
    }

    /// Whether the source supports seeking.
    #[must_use]
    pub fn is_seekable(&self) -> bool {
        matches!(self, Self::Memory(_))
    }

    /// Length announced by the producer, if any.
    #[must_use]
    pub fn declared_length(&self) -> Option<u64> {
        match self {
            Self::Memory(cursor) => Some(cursor.get_ref().len() as u64),
            Self::Stream {
                declared_length, ..
            } => *declared_length,
        }
    }

    /// Bytes left between the current position and the end, when computable.
    #[must_use]
    pub fn remaining_len(&self) -> Option<u64> {
        match self {
            Self::Memory(cursor) => {
                let len = cursor.get_ref().len() as u64;
                Some(len.saturating_sub(cursor.position()))
            }
            Self::Stream { .. } => None,
        }
    }

    /// Read the next chunk into `buf`, returning `0` at end of input.
    pub async fn read_chunk(
        &mut self,
        buf: &mut [u8],
        cancel: &CancellationToken,
    ) -> GatewayResult<usize> {
        match self {
            Self::Memory(cursor) => read_cancellable(cursor, buf, cancel).await,
            Self::Stream { reader, .. } => read_cancellable(reader, buf, cancel).await,
        }
    }

    /// Move past the first `count` bytes.
    ///
    /// Seekable sources jump straight there. Streams read and discard in
    /// chunks; `false` means the stream ended before `count` bytes were seen.
    pub async fn skip(&mut self, count: u64, cancel: &CancellationToken) -> GatewayResult<bool> {
        match self {
            Self::Memory(cursor) => {
                cursor.set_position(count);
                Ok(true)
            }
            Self::Stream { reader, .. } => {
                let mut buf = vec![0u8; TRANSFER_CHUNK_SIZE];
                let mut remaining = count;
                while remaining > 0 {
                    let want = chunk_len(remaining);
                    let n = read_cancellable(reader, &mut buf[..want], cancel).await?;
                    if n == 0 {
                        return Ok(false);
                    }
                    remaining -= n as u64;
                }
                Ok(true)
            }
        }
    }

    /// Materialise the remaining content into memory.
    pub async fn into_bytes(self, cancel: &CancellationToken) -> GatewayResult<Bytes> {
        match self {
            Self::Memory(cursor) => {
                let position = usize::try_from(cursor.position()).unwrap_or(usize::MAX);
                let bytes = cursor.into_inner();
                Ok(bytes.slice(position.min(bytes.len())..))
            }
            Self::Stream {
                mut reader,
                declared_length,
            } => {
                let capacity = declared_length
                    .and_then(|n| usize::try_from(n).ok())
                    .unwrap_or(TRANSFER_CHUNK_SIZE)
                    .min(MAX_PREALLOCATION);
                let mut out = Vec::with_capacity(capacity);
                let mut buf = vec![0u8; TRANSFER_CHUNK_SIZE];
                loop {
                    let n = read_cancellable(&mut reader, &mut buf, cancel).await?;
                    if n == 0 {
                        break;
                    }
                    out.extend_from_slice(&buf[..n]);
                }
                Ok(Bytes::from(out))
            }
        }
    }
}

/// Read into `buf`, aborting with [`GatewayError::Cancelled`] once `cancel` fires.
pub async fn read_cancellable<R>(
    reader: &mut R,
    buf: &mut [u8],
    cancel: &CancellationToken,
) -> GatewayResult<usize>
where
    R: AsyncRead + Unpin + ?Sized,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(GatewayError::Cancelled),
        read = reader.read(buf) => Ok(read?),
    }
}

/// Write all of `buf`, aborting with [`GatewayError::Cancelled`] once `cancel` fires.
pub async fn write_cancellable<W>(
    writer: &mut W,
    buf: &[u8],
    cancel: &CancellationToken,
) -> GatewayResult<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(GatewayError::Cancelled),
        written = writer.write_all(buf) => Ok(written?),
    }
}

/// Number of bytes to request next when `remaining` bytes are still wanted.
pub(crate) fn chunk_len(remaining: u64) -> usize {
    usize::try_from(remaining).map_or(TRANSFER_CHUNK_SIZE, |r| r.min(TRANSFER_CHUNK_SIZE))
}
