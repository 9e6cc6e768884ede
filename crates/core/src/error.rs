//! The crate-wide error type shared by every Stellite component.
//!
//! Every layer described in the design (socket, QUIC transport, HTTP/3
//! stream, outbound fetcher, configuration) converts its own error type into
//! [`Error`] via `From`, so a handler only ever has to reason about one type.

use std::io;

/// A boxed error type for wrapping errors that don't have a dedicated variant.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// The result type used throughout Stellite.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors that can occur anywhere in the dispatch pipeline.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Binding, reading or writing the UDP socket failed.
    #[error("socket error: {0}")]
    Socket(#[source] io::Error),

    /// Loading the TLS certificate chain or private key failed.
    #[error("tls configuration error: {0}")]
    Tls(BoxedError),

    /// The JSON config file could not be parsed.
    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),

    /// A request's headers were missing a required pseudo-header or were
    /// otherwise malformed.
    #[error("malformed request headers: {0}")]
    MalformedHeaders(String),

    /// No `proxy_pass` origin was configured when a request arrived.
    #[error("no backend configured for this request")]
    NoBackend,

    /// The outbound HTTP request to the backend failed (DNS, connect, TLS,
    /// or the backend reset the connection).
    #[error("backend request failed: {0}")]
    Backend(BoxedError),

    /// The backend did not respond before the per-request timeout elapsed.
    #[error("backend request timed out")]
    Timeout,

    /// Decoding a `Content-Encoding: gzip`/`deflate` response body failed.
    #[error("response decode error: {0}")]
    Decode(io::Error),

    /// The outgoing URL could not be built from the proxy_pass origin and
    /// the (possibly rewritten) path.
    #[error("invalid proxied url: {0}")]
    InvalidUrl(String),

    /// Any other error, wrapped as a boxed trait object.
    #[error("{0}")]
    Other(BoxedError),
}

impl Error {
    /// Wrap any error type that doesn't have a dedicated variant.
    pub fn other(error: impl Into<BoxedError>) -> Self {
        Self::Other(error.into())
    }

    /// Short, stable name for this error, suitable for a synthetic
    /// status-line response body (see §4.D "Response relay").
    pub fn short_name(&self) -> &'static str {
        match self {
            Self::Socket(_) => "socket_error",
            Self::Tls(_) => "tls_error",
            Self::Config(_) => "config_error",
            Self::MalformedHeaders(_) => "malformed_headers",
            Self::NoBackend => "no_backend",
            Self::Backend(_) => "backend_error",
            Self::Timeout => "timed_out",
            Self::Decode(_) => "decode_error",
            Self::InvalidUrl(_) => "invalid_url",
            Self::Other(_) => "internal_error",
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Socket(e)
    }
}
