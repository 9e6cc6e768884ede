//! The assembled outbound request handed from a Request Stream to the
//! Fetcher (see §4.D, "Request construction").

use bytes::Bytes;
use http::{HeaderMap, Method, Uri};

/// Body of a [`RequestFingerprint`].
#[derive(Debug, Clone)]
pub enum RequestBody {
    /// No body, or the body was fully buffered before dispatch.
    Full(Bytes),
    /// The stream had no FIN when the request was dispatched; chunks arrive
    /// afterwards via `Fetcher::append_chunk`.
    Chunked,
}

/// `(method, rewritten URL, headers, body-or-chunked-stream)`, consumed by
/// the Fetcher and not persisted past the request's lifetime.
#[derive(Debug, Clone)]
pub struct RequestFingerprint {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: RequestBody,
}

impl RequestFingerprint {
    /// Build a fingerprint from its parts.
    pub fn new(method: Method, uri: Uri, headers: HeaderMap, body: RequestBody) -> Self {
        Self {
            method,
            uri,
            headers,
            body,
        }
    }

    /// The request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The fully-resolved outgoing URL (`proxy_pass_origin + rewrite(path)`).
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Headers forwarded to the backend.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable access to headers, for host-header rewriting before dispatch.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// The request body.
    pub fn body(&self) -> &RequestBody {
        &self.body
    }

    /// Whether this request is still accepting chunks from the client.
    pub fn is_chunked(&self) -> bool {
        matches!(self.body, RequestBody::Chunked)
    }
}
