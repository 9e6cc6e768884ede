//! The response descriptor a Request Stream builds from the Fetcher's
//! delivered headers, and the transport the backend was reached over (see
//! §4.D, "Response relay").

use http::{HeaderMap, StatusCode};

/// Which transport carried the backend response, recorded for diagnostics
/// and for the `Via`-style bookkeeping a reverse proxy typically keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionInfo {
    /// Backend reached over HTTP/1.1.
    Http1,
    /// Backend reached over HTTP/2.
    Http2,
    /// Backend reached over QUIC/HTTP/3 (client-library use only; the
    /// server-side fetcher in this core never dials a QUIC backend).
    Quic,
}

/// The response headers and status synthesised for the client, built the
/// moment the Fetcher's headers callback fires.
#[derive(Debug, Clone)]
pub struct ResponseDescriptor {
    status: StatusCode,
    headers: HeaderMap,
    connection_info: ConnectionInfo,
}

impl ResponseDescriptor {
    /// Build a descriptor from the backend's status line and headers.
    pub fn new(status: StatusCode, headers: HeaderMap, connection_info: ConnectionInfo) -> Self {
        Self {
            status,
            headers,
            connection_info,
        }
    }

    /// Build a synthetic error descriptor carrying `error_name` as a
    /// `text/plain` body's worth of status-line (see §4.D, "On error").
    pub fn synthetic_error(status: StatusCode) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::CONTENT_TYPE,
            http::HeaderValue::from_static("text/plain"),
        );
        Self {
            status,
            headers,
            connection_info: ConnectionInfo::Http1,
        }
    }

    /// The `:status` pseudo-header value for this response.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Response headers, excluding `:status`.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Which transport the backend was reached over.
    pub fn connection_info(&self) -> ConnectionInfo {
        self.connection_info
    }
}
