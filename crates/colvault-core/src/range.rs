//! HTTP `Range` header handling.
//!
//! A request's `Range` header is parsed once into a [`RangeSpec`], which is
//! resolved into concrete [`RangeBounds`] only after the true content length is
//! known; for columnar objects that is after decryption. [`copy_range`]
//! then streams the selected slice.
//!
//! Only the first comma-separated range unit is honoured; later units are
//! ignored.

use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;

use crate::error::GatewayResult;
use crate::source::{ByteSource, TRANSFER_CHUNK_SIZE, chunk_len, write_cancellable};

/// A parsed `Range` header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RangeSpec {
    /// A `Range` header was present.
    pub requested: bool,
    /// The header was present but malformed.
    pub invalid: bool,
    /// The range is a suffix (`bytes=-N`).
    pub is_suffix: bool,
    /// First byte position for `N-` and `N-M` ranges.
    pub start: Option<i64>,
    /// Last byte position for `N-M` ranges.
    pub end: Option<i64>,
    /// Number of trailing bytes for suffix ranges.
    pub suffix_length: Option<i64>,
}

/// A range spec resolved against a content length.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RangeBounds {
    /// A range was requested.
    pub requested: bool,
    /// The range does not overlap the content.
    pub unsatisfiable: bool,
    /// First byte position (inclusive).
    pub start: i64,
    /// Last byte position (inclusive).
    pub end: i64,
}

impl RangeBounds {
    /// Number of bytes covered by the bounds.
    #[must_use]
    pub fn len(&self) -> i64 {
        self.end - self.start + 1
    }

    /// Whether the bounds cover no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() <= 0
    }

    /// `Content-Range` value for a 206 response.
    #[must_use]
    pub fn content_range(&self, content_length: i64) -> String {
        format!("bytes {}-{}/{content_length}", self.start, self.end)
    }
}

/// `Content-Range` value for a 416 response.
#[must_use]
pub fn unsatisfied_content_range(content_length: i64) -> String {
    format!("bytes */{content_length}")
}

impl RangeSpec {
    /// Parse a raw `Range` header value; `None` means the header was absent.
    ///
    /// # Examples
    ///
    /// ```
    /// use colvault_core::range::RangeSpec;
    ///
    /// let spec = RangeSpec::parse(Some("bytes=0-99"));
    /// assert!(spec.requested && !spec.invalid);
    /// assert_eq!((spec.start, spec.end), (Some(0), Some(99)));
    ///
    /// assert!(RangeSpec::parse(Some("bytes=-0")).invalid);
    /// assert!(!RangeSpec::parse(None).requested);
    /// ```
    #[must_use]
    pub fn parse(header: Option<&str>) -> Self {
        let Some(raw) = header else {
            return Self::default();
        };

        let Some(units) = strip_prefix_ignore_case(raw.trim(), "bytes=") else {
            return Self::invalid();
        };
        let unit = units.split(',').next().unwrap_or_default().trim();

        if let Some(suffix) = unit.strip_prefix('-') {
            return match parse_position(suffix) {
                Some(n) if n > 0 => Self {
                    requested: true,
                    is_suffix: true,
                    suffix_length: Some(n),
                    ..Self::default()
                },
                _ => Self::invalid(),
            };
        }

        let Some((first, last)) = unit.split_once('-') else {
            return Self::invalid();
        };
        let Some(start) = parse_position(first) else {
            return Self::invalid();
        };

        if last.is_empty() {
            return Self {
                requested: true,
                start: Some(start),
                ..Self::default()
            };
        }

        match parse_position(last) {
            Some(end) => Self {
                requested: true,
                start: Some(start),
                end: Some(end),
                ..Self::default()
            },
            None => Self::invalid(),
        }
    }

    fn invalid() -> Self {
        Self {
            requested: true,
            invalid: true,
            ..Self::default()
        }
    }

    /// Resolve this range against `content_length`.
    ///
    /// Closed ranges whose end lies past the content are clamped to the last
    /// byte. Bounds are unsatisfiable when `start >= content_length` or
    /// `start > end`.
    #[must_use]
    pub fn compute_bounds(&self, content_length: i64) -> RangeBounds {
        if !self.requested || self.invalid {
            return RangeBounds::default();
        }

        let last = content_length - 1;
        let (start, end) = if self.is_suffix {
            let suffix = self.suffix_length.unwrap_or_default();
            ((content_length - suffix).max(0), last)
        } else {
            let start = self.start.unwrap_or_default();
            (start, self.end.map_or(last, |end| end.min(last)))
        };

        RangeBounds {
            requested: true,
            unsatisfiable: start >= content_length || start > end,
            start,
            end,
        }
    }
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &value[prefix.len()..])
}

fn parse_position(text: &str) -> Option<i64> {
    let text = text.trim();
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

/// Copy `length` bytes starting at `start` from `source` into `destination`.
///
/// Seekable sources seek directly; forward-only sources read and discard the
/// first `start` bytes, writing nothing if they end before reaching it. If
/// the source runs out before `length` bytes were copied, the copy ends early
/// without an error. Returns the number of bytes written.
///
/// # Examples
///
/// ```
/// use colvault_core::range::copy_range;
/// use colvault_core::source::ByteSource;
/// use tokio_util::sync::CancellationToken;
///
/// # tokio_test::block_on(async {
/// let mut source = ByteSource::memory(&b"hello world"[..]);
/// let mut out = Vec::new();
/// let n = copy_range(&mut source, &mut out, 6, 5, &CancellationToken::new())
///     .await
///     .expect("copy should succeed");
/// assert_eq!(n, 5);
/// assert_eq!(out, b"world");
/// # });
/// ```
pub async fn copy_range<W>(
    source: &mut ByteSource,
    destination: &mut W,
    start: u64,
    length: u64,
    cancel: &CancellationToken,
) -> GatewayResult<u64>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    if !source.skip(start, cancel).await? {
        return Ok(0);
    }

    let mut buf = vec![0u8; TRANSFER_CHUNK_SIZE];
    let mut remaining = length;
    let mut written = 0u64;
    while remaining > 0 {
        let want = chunk_len(remaining);
        let n = source.read_chunk(&mut buf[..want], cancel).await?;
        if n == 0 {
            break;
        }
        write_cancellable(destination, &buf[..n], cancel).await?;
        remaining -= n as u64;
        written += n as u64;
    }
    Ok(written)
}
