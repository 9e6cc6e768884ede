//! End-to-end Fetcher scenarios against a real loopback HTTP/1.1 backend.
//!
//! QUIC itself is a black-box dependency (see crate docs), so these drive
//! the Fetcher directly rather than through a QUIC client; the backend
//! interaction is exactly what a Request Stream triggers in production.

use std::cell::RefCell;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, Method, Request, Response, StatusCode, Uri};
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use stellite_core::{Error, RequestBody, RequestFingerprint, ResponseDescriptor};
use stellite_fetcher::{Fetcher, FetcherVisitor};
use tokio::net::TcpListener;
use tokio_stream::wrappers::ReceiverStream;

#[derive(Debug, Clone)]
enum Event {
    Header(ResponseDescriptor),
    Chunk(Bytes),
    Complete,
    Error(String),
}

#[derive(Default)]
struct Recorder {
    events: Vec<Event>,
}

impl FetcherVisitor for Recorder {
    fn on_task_header(&mut self, _request_id: stellite_core::RequestId, response: ResponseDescriptor) {
        self.events.push(Event::Header(response));
    }

    fn on_task_stream(&mut self, _request_id: stellite_core::RequestId, chunk: Bytes) {
        self.events.push(Event::Chunk(chunk));
    }

    fn on_task_complete(&mut self, _request_id: stellite_core::RequestId) {
        self.events.push(Event::Complete);
    }

    fn on_task_error(&mut self, _request_id: stellite_core::RequestId, error: Error) {
        self.events.push(Event::Error(error.to_string()));
    }
}

/// Start a single-connection-at-a-time HTTP/1.1 server on an ephemeral
/// loopback port, driven by `handler`. Returns the bound address; the
/// server task runs until the test process exits.
async fn spawn_server<F, Fut, B>(handler: F) -> SocketAddr
where
    F: Fn(Request<Incoming>) -> Fut + Clone + 'static,
    Fut: std::future::Future<Output = Result<Response<B>, Infallible>> + 'static,
    B: hyper::body::Body<Data = Bytes> + 'static,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind test server");
    let addr = listener.local_addr().expect("local addr");

    tokio::task::spawn_local(async move {
        loop {
            let Ok((stream, _peer)) = listener.accept().await else {
                return;
            };
            let handler = handler.clone();
            let io = TokioIo::new(stream);
            tokio::task::spawn_local(async move {
                let _ = hyper::server::conn::http1::Builder::new()
                    .serve_connection(io, service_fn(move |req| handler(req)))
                    .await;
            });
        }
    });

    addr
}

fn fingerprint(method: Method, uri: Uri, body: RequestBody) -> RequestFingerprint {
    RequestFingerprint::new(method, uri, HeaderMap::new(), body)
}

async fn wait_for(recorder: &Rc<RefCell<Recorder>>, predicate: impl Fn(&[Event]) -> bool) {
    for _ in 0..200 {
        if predicate(&recorder.borrow().events) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for expected events, saw: {:?}", recorder.borrow().events);
}

#[tokio::test(flavor = "current_thread")]
async fn get_passthrough() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let addr = spawn_server(|_req: Request<Incoming>| async move {
                Ok(Response::builder().status(200).body(Full::new(Bytes::from_static(b"get"))).unwrap())
            })
            .await;

            let fetcher = Fetcher::new();
            let recorder = Rc::new(RefCell::new(Recorder::default()));
            let uri: Uri = format!("http://{addr}/").parse().unwrap();

            fetcher.request(
                fingerprint(Method::GET, uri, RequestBody::Full(Bytes::new())),
                Duration::from_secs(5),
                Rc::downgrade(&(recorder.clone() as Rc<RefCell<dyn FetcherVisitor>>)),
                false,
            );

            wait_for(&recorder, |events| matches!(events.last(), Some(Event::Complete))).await;

            let events = recorder.borrow();
            assert!(matches!(&events[0], Event::Header(h) if h.status() == StatusCode::OK));
            let body: Vec<u8> = events
                .iter()
                .filter_map(|e| match e {
                    Event::Chunk(b) => Some(b.to_vec()),
                    _ => None,
                })
                .flatten()
                .collect();
            assert_eq!(body, b"get");
        })
        .await;
}

#[tokio::test(flavor = "current_thread")]
async fn post_body_forwarded() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let addr = spawn_server(|req: Request<Incoming>| async move {
                let body = req.into_body().collect().await.unwrap().to_bytes();
                Ok(Response::builder().status(200).body(Full::new(body)).unwrap())
            })
            .await;

            let fetcher = Fetcher::new();
            let recorder = Rc::new(RefCell::new(Recorder::default()));
            let uri: Uri = format!("http://{addr}/").parse().unwrap();

            fetcher.request(
                fingerprint(Method::POST, uri, RequestBody::Full(Bytes::from_static(b"hello world"))),
                Duration::from_secs(5),
                Rc::downgrade(&(recorder.clone() as Rc<RefCell<dyn FetcherVisitor>>)),
                false,
            );

            wait_for(&recorder, |events| matches!(events.last(), Some(Event::Complete))).await;

            let events = recorder.borrow();
            let body: Vec<u8> = events
                .iter()
                .filter_map(|e| match e {
                    Event::Chunk(b) => Some(b.to_vec()),
                    _ => None,
                })
                .flatten()
                .collect();
            assert_eq!(body, b"hello world");
        })
        .await;
}

#[tokio::test(flavor = "current_thread")]
async fn slow_backend_times_out() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let addr = spawn_server(|_req: Request<Incoming>| async move {
                tokio::time::sleep(Duration::from_millis(2000)).await;
                Ok(Response::builder().status(200).body(Full::new(Bytes::from_static(b"slow"))).unwrap())
            })
            .await;

            let fetcher = Fetcher::new();
            let recorder = Rc::new(RefCell::new(Recorder::default()));
            let uri: Uri = format!("http://{addr}/").parse().unwrap();

            fetcher.request(
                fingerprint(Method::GET, uri, RequestBody::Full(Bytes::new())),
                Duration::from_millis(100),
                Rc::downgrade(&(recorder.clone() as Rc<RefCell<dyn FetcherVisitor>>)),
                false,
            );

            wait_for(&recorder, |events| !events.is_empty()).await;

            let events = recorder.borrow();
            assert!(
                matches!(events.first(), Some(Event::Error(_))),
                "expected a timeout error, saw: {:?}",
                *events
            );
        })
        .await;
}

#[tokio::test(flavor = "current_thread")]
async fn chunked_response_delivers_every_chunk() {
    const CHUNK_COUNT: usize = 100;

    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let addr = spawn_server(|_req: Request<Incoming>| async move {
                let (tx, rx) = tokio::sync::mpsc::channel::<Result<Frame<Bytes>, Infallible>>(1);
                tokio::task::spawn_local(async move {
                    for i in 0..CHUNK_COUNT {
                        let chunk = Bytes::from(format!("chunk-{i};"));
                        if tx.send(Ok(Frame::data(chunk))).await.is_err() {
                            return;
                        }
                    }
                });
                let body = StreamBody::new(ReceiverStream::new(rx));
                Ok(Response::builder().status(200).body(body).unwrap())
            })
            .await;

            let fetcher = Fetcher::new();
            let recorder = Rc::new(RefCell::new(Recorder::default()));
            let uri: Uri = format!("http://{addr}/").parse().unwrap();

            fetcher.request(
                fingerprint(Method::GET, uri, RequestBody::Full(Bytes::new())),
                Duration::from_secs(5),
                Rc::downgrade(&(recorder.clone() as Rc<RefCell<dyn FetcherVisitor>>)),
                false,
            );

            wait_for(&recorder, |events| matches!(events.last(), Some(Event::Complete))).await;

            let events = recorder.borrow();
            let joined: Vec<u8> = events
                .iter()
                .filter_map(|e| match e {
                    Event::Chunk(b) => Some(b.to_vec()),
                    _ => None,
                })
                .flatten()
                .collect();
            let expected: Vec<u8> = (0..CHUNK_COUNT).flat_map(|i| format!("chunk-{i};").into_bytes()).collect();
            assert_eq!(joined, expected);
            assert!(matches!(events.last(), Some(Event::Complete)));
        })
        .await;
}
