//! One Request Stream per client-initiated bidirectional HTTP/3 stream (see
//! §4.D).

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use h3::quic::BidiStream;
use h3::server::RequestStream as H3RequestStream;
use http::{HeaderMap, Method, Request, StatusCode, Uri};
use stellite_core::{
    ConnectionInfo, Error, RequestBody, RequestFingerprint, RequestId, ResponseDescriptor, RewriteSet,
    strip_hop_by_hop,
};
use stellite_fetcher::{Fetcher, FetcherVisitor};
use tokio::sync::mpsc;

/// Bodies up to this size are buffered in full before dispatch; larger
/// bodies switch to chunked upload so the Stream never holds an entire
/// large request body in memory (see §4.D, "Fetcher dispatch").
pub const MAX_BUFFERED_BODY: usize = 64 * 1024;

/// Default per-request backend timeout, overridden by configuration.
pub const DEFAULT_PROXY_TIMEOUT: Duration = Duration::from_secs(30);

/// A cancellation handle a Session holds for one of its streams.
///
/// Cancelling aborts the stream's driving task; the task's Fetcher
/// callbacks hold only a weak reference back into this state, so aborting
/// it is always safe even mid-delivery (see §4.D, "Cancellation").
pub struct RequestStreamHandle {
    task: Option<tokio::task::JoinHandle<()>>,
}

impl RequestStreamHandle {
    pub(crate) fn new(task: tokio::task::JoinHandle<()>) -> Self {
        Self { task: Some(task) }
    }

    /// A handle with nothing to cancel, for tests.
    pub fn noop() -> Self {
        Self { task: None }
    }

    pub fn cancel(self) {
        if let Some(task) = self.task {
            task.abort();
        }
    }
}

/// Events a [`StreamVisitor`] forwards from Fetcher callbacks to the task
/// driving the h3 stream, bridging the Fetcher's synchronous callback API
/// with the stream's async writes.
enum StreamEvent {
    Headers(ResponseDescriptor),
    Data(Bytes),
    Complete,
    Error(Error),
}

/// Implements [`FetcherVisitor`] for one Request Stream, forwarding every
/// callback into a channel the driving task reads from.
struct StreamVisitor {
    tx: mpsc::UnboundedSender<StreamEvent>,
}

impl FetcherVisitor for StreamVisitor {
    fn on_task_header(&mut self, _request_id: RequestId, response: ResponseDescriptor) {
        let _ = self.tx.send(StreamEvent::Headers(response));
    }

    fn on_task_stream(&mut self, _request_id: RequestId, chunk: Bytes) {
        let _ = self.tx.send(StreamEvent::Data(chunk));
    }

    fn on_task_complete(&mut self, _request_id: RequestId) {
        let _ = self.tx.send(StreamEvent::Complete);
    }

    fn on_task_error(&mut self, _request_id: RequestId, error: Error) {
        let _ = self.tx.send(StreamEvent::Error(error));
    }
}

/// Validate `:method`, `:scheme`, `:authority`, `:path` and build the
/// outgoing URL as `proxy_pass_origin + rewrite(path)` (see §4.D, "Header
/// assembly" and "Request construction").
fn build_fingerprint(
    request: &Request<()>,
    body: RequestBody,
    proxy_pass_origin: &Uri,
    rewrites: &RewriteSet,
) -> Result<RequestFingerprint, Error> {
    let method = request.method().clone();
    if method == Method::CONNECT {
        return Err(Error::MalformedHeaders("CONNECT is not supported".into()));
    }

    let path = request.uri().path();
    if path.is_empty() {
        return Err(Error::MalformedHeaders(":path must not be empty".into()));
    }

    let rewritten_path = rewrites.rewrite(path).unwrap_or_else(|| path.to_owned());
    let query = request
        .uri()
        .query()
        .map(|q| format!("?{q}"))
        .unwrap_or_default();

    let authority = proxy_pass_origin
        .authority()
        .ok_or_else(|| Error::InvalidUrl("proxy_pass has no authority".into()))?;
    let scheme = proxy_pass_origin
        .scheme()
        .ok_or_else(|| Error::InvalidUrl("proxy_pass has no scheme".into()))?;

    let uri: Uri = format!("{scheme}://{authority}{rewritten_path}{query}")
        .parse()
        .map_err(|e| Error::InvalidUrl(format!("could not build outgoing url: {e}")))?;

    let mut headers = HeaderMap::new();
    for (name, value) in request.headers() {
        headers.append(name, value.clone());
    }
    strip_hop_by_hop(&mut headers);
    headers.insert(http::header::HOST, http::HeaderValue::from_str(authority.as_str())
        .map_err(|e| Error::MalformedHeaders(e.to_string()))?);

    Ok(RequestFingerprint::new(method, uri, headers, body))
}

/// Drive one accepted HTTP/3 request stream to completion: read the
/// request body, dispatch it to the Fetcher, and relay the response.
///
/// Spawned with `spawn_local` by the Session on every new client-initiated
/// bidirectional stream; returns once the stream is DONE (see §4.D).
pub async fn drive_stream<S>(
    request: Request<()>,
    mut h3_stream: H3RequestStream<S, Bytes>,
    fetcher: Rc<Fetcher>,
    proxy_pass_origin: Uri,
    rewrites: Rc<RewriteSet>,
    timeout: Duration,
) where
    S: BidiStream<Bytes>,
{
    let body = match read_initial_body(&mut h3_stream, &fetcher).await {
        Ok(body) => body,
        Err(error) => {
            send_synthetic_error(&mut h3_stream, error).await;
            return;
        }
    };

    let fingerprint = match build_fingerprint(&request, body.initial, &proxy_pass_origin, &rewrites) {
        Ok(fingerprint) => fingerprint,
        Err(error) => {
            send_synthetic_error(&mut h3_stream, error).await;
            return;
        }
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    let visitor: Rc<RefCell<dyn FetcherVisitor>> = Rc::new(RefCell::new(StreamVisitor { tx }));
    let visitor_weak: Weak<RefCell<dyn FetcherVisitor>> = Rc::downgrade(&visitor);

    let request_id = fetcher.request(fingerprint, timeout, visitor_weak, false);

    if body.chunked {
        if let Err(error) = relay_remaining_chunks(&mut h3_stream, &fetcher, request_id).await {
            fetcher.cancel(request_id);
            send_synthetic_error(&mut h3_stream, error).await;
            return;
        }
    }

    let mut headers_sent = false;
    while let Some(event) = rx.recv().await {
        match event {
            StreamEvent::Headers(descriptor) => {
                if send_headers(&mut h3_stream, &descriptor).await.is_err() {
                    return;
                }
                headers_sent = true;
            }
            StreamEvent::Data(chunk) => {
                if h3_stream.send_data(chunk).await.is_err() {
                    return;
                }
            }
            StreamEvent::Complete => {
                let _ = h3_stream.finish().await;
                return;
            }
            StreamEvent::Error(error) => {
                if !headers_sent {
                    send_synthetic_error(&mut h3_stream, error).await;
                } else {
                    tracing::warn!(error = %error, "fetcher error after response headers were sent");
                    let _ = h3_stream.finish().await;
                }
                return;
            }
        }
    }
}

struct InitialBody {
    initial: RequestBody,
    chunked: bool,
}

/// Read up to [`MAX_BUFFERED_BODY`] bytes of the request body. If the body
/// is still open past that bound, switch to chunked-upload mode (see §4.D).
async fn read_initial_body<S>(
    h3_stream: &mut H3RequestStream<S, Bytes>,
    _fetcher: &Fetcher,
) -> Result<InitialBody, Error>
where
    S: BidiStream<Bytes>,
{
    let mut buffer = BytesMut::new();
    loop {
        match h3_stream.recv_data().await {
            Ok(Some(mut chunk)) => {
                let remaining = chunk.remaining();
                buffer.extend_from_slice(chunk.copy_to_bytes(remaining).as_ref());
                if buffer.len() > MAX_BUFFERED_BODY {
                    return Ok(InitialBody {
                        initial: RequestBody::Chunked,
                        chunked: true,
                    });
                }
            }
            Ok(None) => {
                return Ok(InitialBody {
                    initial: RequestBody::Full(buffer.freeze()),
                    chunked: false,
                });
            }
            Err(e) => return Err(Error::other(e)),
        }
    }
}

/// After a chunked dispatch, keep reading the rest of the body straight
/// into the Fetcher's `append_chunk`.
async fn relay_remaining_chunks<S>(
    h3_stream: &mut H3RequestStream<S, Bytes>,
    fetcher: &Fetcher,
    request_id: RequestId,
) -> Result<(), Error>
where
    S: BidiStream<Bytes>,
{
    loop {
        match h3_stream.recv_data().await {
            Ok(Some(mut chunk)) => {
                let remaining = chunk.remaining();
                let bytes = chunk.copy_to_bytes(remaining);
                fetcher.append_chunk(request_id, bytes, false)?;
            }
            Ok(None) => {
                fetcher.append_chunk(request_id, Bytes::new(), true)?;
                return Ok(());
            }
            Err(e) => return Err(Error::other(e)),
        }
    }
}

async fn send_headers<S>(
    h3_stream: &mut H3RequestStream<S, Bytes>,
    descriptor: &ResponseDescriptor,
) -> Result<(), h3::Error>
where
    S: BidiStream<Bytes>,
{
    let mut builder = http::Response::builder().status(descriptor.status());
    for (name, value) in descriptor.headers() {
        builder = builder.header(name, value);
    }
    let response = builder
        .body(())
        .expect("status + headers from a real backend response always build a valid Response");
    h3_stream.send_response(response).await
}

/// Build and send a synthetic status-line error response (see §4.D, "On
/// error before response headers").
async fn send_synthetic_error<S>(h3_stream: &mut H3RequestStream<S, Bytes>, error: Error)
where
    S: BidiStream<Bytes>,
{
    let status = match &error {
        Error::Timeout => StatusCode::GATEWAY_TIMEOUT,
        Error::NoBackend | Error::InvalidUrl(_) => StatusCode::BAD_GATEWAY,
        Error::MalformedHeaders(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::BAD_GATEWAY,
    };
    let descriptor = ResponseDescriptor::synthetic_error(status);
    if send_headers(h3_stream, &descriptor).await.is_err() {
        return;
    }
    let _ = h3_stream.send_data(Bytes::from(error.short_name())).await;
    let _ = h3_stream.finish().await;
}

impl ConnectionInfo {
    /// Helper retained for call sites that want a human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Http1 => "http/1.1",
            Self::Http2 => "http/2",
            Self::Quic => "quic",
        }
    }
}
