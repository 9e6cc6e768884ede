//! The HTTP client a [`crate::Fetcher`] drives, grounded on the same
//! `hyper_util::client::legacy::Client` setup a generic reverse proxy uses
//! for its outbound leg.

use http_body_util::combinators::BoxBody;
use hyper::body::{Bytes, Incoming};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client as LegacyClient;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use stellite_core::Error;

/// Request body type accepted by [`HttpClient`].
pub type ReqBody = BoxBody<Bytes, std::convert::Infallible>;

/// The `hyper` request/response types this crate forwards.
pub type OutboundRequest = http::Request<ReqBody>;
pub type OutboundResponse = http::Response<Incoming>;

/// A pooled HTTP/1.1+HTTP/2 client used for every outbound backend request.
///
/// One instance is shared by every Request Stream a Fetcher serves; the
/// connection pool and TLS session cache live inside `inner`.
#[derive(Clone)]
pub struct HttpClient {
    inner: LegacyClient<HttpsConnector<HttpConnector>, ReqBody>,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient").finish_non_exhaustive()
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        let https = HttpsConnectorBuilder::new()
            .with_native_roots()
            .expect("no native root CA certificates found")
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .build();
        Self {
            inner: LegacyClient::builder(TokioExecutor::new()).build(https),
        }
    }
}

impl HttpClient {
    /// Build a client from an already-configured `hyper_util` legacy client,
    /// for callers that need a non-default connector (a custom CA bundle, a
    /// different HTTP/2 keepalive policy, and so on).
    pub fn from_inner(inner: LegacyClient<HttpsConnector<HttpConnector>, ReqBody>) -> Self {
        Self { inner }
    }

    /// Execute one request against the backend, returning its response head
    /// and streaming body immediately (no buffering).
    pub async fn execute(&self, request: OutboundRequest) -> Result<OutboundResponse, Error> {
        self.inner
            .request(request)
            .await
            .map_err(|e| Error::Backend(Box::new(e)))
    }
}
