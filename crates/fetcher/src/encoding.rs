//! Response-body content-encoding decode (see §4.E, "Response encoding").
//!
//! `gzip` and `deflate` are decoded transparently unless the caller asked
//! for a streamed response; any other encoding is passed through untouched
//! with a diagnostic log line, matching the original's "best effort" policy.

use async_compression::tokio::bufread::{DeflateDecoder, GzipDecoder};
use bytes::Bytes;
use futures_util::{Stream, StreamExt, TryStreamExt};
use tokio_util::io::{ReaderStream, StreamReader};

/// Content-Encoding values this Fetcher knows how to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentEncoding {
    Identity,
    Gzip,
    Deflate,
    /// Some other value than the recognised ones; passed through as-is.
    Unsupported,
}

impl ContentEncoding {
    /// Parse a `Content-Encoding` header value.
    pub fn from_header(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "identity" => Self::Identity,
            "gzip" | "x-gzip" => Self::Gzip,
            "deflate" => Self::Deflate,
            _ => Self::Unsupported,
        }
    }

    /// Whether [`decode_body`] actually transforms the body for this
    /// encoding. Callers must strip `Content-Encoding`/`Content-Length`
    /// from the headers they forward whenever this is true, since the
    /// bytes that reach the client no longer match either header.
    pub fn is_decoded(self) -> bool {
        matches!(self, Self::Gzip | Self::Deflate)
    }
}

/// Wrap a raw body byte stream with the decoder matching `encoding`.
///
/// For [`ContentEncoding::Identity`] and [`ContentEncoding::Unsupported`] the
/// stream is returned unchanged (the latter logs once at the call site).
pub fn decode_body<S, E>(
    encoding: ContentEncoding,
    body: S,
) -> std::pin::Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    let io_stream = body.map_err(|e| std::io::Error::other(e));
    match encoding {
        ContentEncoding::Identity | ContentEncoding::Unsupported => Box::pin(io_stream),
        ContentEncoding::Gzip => {
            let reader = StreamReader::new(io_stream);
            Box::pin(ReaderStream::new(GzipDecoder::new(reader)))
        }
        ContentEncoding::Deflate => {
            let reader = StreamReader::new(io_stream);
            Box::pin(ReaderStream::new(DeflateDecoder::new(reader)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_standard_encodings() {
        assert_eq!(ContentEncoding::from_header("gzip"), ContentEncoding::Gzip);
        assert_eq!(ContentEncoding::from_header("GZIP"), ContentEncoding::Gzip);
        assert_eq!(ContentEncoding::from_header("deflate"), ContentEncoding::Deflate);
        assert_eq!(ContentEncoding::from_header(""), ContentEncoding::Identity);
        assert_eq!(ContentEncoding::from_header("br"), ContentEncoding::Unsupported);
    }
}
