//! End-to-end coverage of the Dispatcher over a real loopback QUIC
//! connection: a self-signed cert pair, a real `quinn`/`h3` client, this
//! crate's own `Dispatcher`, and a real hyper backend on loopback TCP (see
//! §8, "connection migration" and the GET-passthrough seed scenario).
//!
//! QUIC-discovery-via-Alt-Svc is not covered here: it is the *client's*
//! decision to switch transports after reading a backend's `Alt-Svc`
//! header, which lives in the embeddable client library named out of
//! scope in spec.md's Non-goals, not in this server-side dispatch core.

use std::convert::Infallible;
use std::net::{SocketAddr, UdpSocket};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Buf, Bytes};
use http::{Request, Response, StatusCode, Uri};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use stellite_core::RewriteSet;
use stellite_fetcher::Fetcher;
use stellite_quic::{keys, listener, Dispatcher};
use tokio::net::TcpListener;

fn build_certs() -> (CertificateDer<'static>, PrivateKeyDer<'static>) {
    let pair = rcgen::generate_simple_self_signed(vec!["localhost".into()]).expect("self-signed cert");
    let cert = pair.cert.der().clone();
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(pair.signing_key.serialize_der()));
    (cert, key)
}

/// A single-connection-at-a-time HTTP/1.1 loopback backend that echoes a
/// fixed body, the same shape `crates/fetcher/tests/scenarios.rs` uses.
async fn spawn_backend(body: &'static str) -> SocketAddr {
    let tcp = TcpListener::bind("127.0.0.1:0").await.expect("bind backend");
    let addr = tcp.local_addr().expect("backend addr");
    tokio::task::spawn_local(async move {
        loop {
            let Ok((stream, _)) = tcp.accept().await else { return };
            let io = TokioIo::new(stream);
            tokio::task::spawn_local(async move {
                let _ = hyper::server::conn::http1::Builder::new()
                    .serve_connection(
                        io,
                        service_fn(move |_req: Request<Incoming>| async move {
                            Ok::<_, Infallible>(Response::new(Full::new(Bytes::from_static(body.as_bytes()))))
                        }),
                    )
                    .await;
            });
        }
    });
    addr
}

/// Bind a Dispatcher over its own loopback QUIC endpoint and run its accept
/// loop in the background. Returns the bound address and the cert the
/// client must trust.
async fn spawn_dispatcher(proxy_pass_origin: Uri) -> (SocketAddr, CertificateDer<'static>) {
    let (cert, key) = build_certs();
    let server_config = keys::build_server_config(vec![cert.clone()], key).expect("server tls config");

    let socket = listener::bind_reuseport(
        "127.0.0.1:0".parse().expect("valid addr"),
        listener::DEFAULT_SEND_BUFFER_SIZE,
        listener::DEFAULT_RECV_BUFFER_SIZE,
    )
    .expect("bind quic socket");
    let bound_addr = socket.local_addr().expect("bound addr");

    let runtime = quinn::default_runtime().expect("tokio quinn runtime");
    let endpoint = quinn::Endpoint::new(quinn::EndpointConfig::default(), Some(server_config), socket, runtime)
        .expect("build quic endpoint");

    let dispatcher = Dispatcher::new(endpoint, proxy_pass_origin, RewriteSet::default(), Duration::from_secs(5), 16);
    let fetcher = Rc::new(Fetcher::new());
    let shutdown = Arc::new(tokio::sync::Notify::new());

    tokio::task::spawn_local(async move {
        dispatcher.run(fetcher, shutdown).await;
    });

    (bound_addr, cert)
}

fn client_endpoint(server_addr: SocketAddr, trust: &CertificateDer<'static>) -> quinn::Endpoint {
    let mut roots = rustls::RootCertStore::empty();
    roots.add(trust.clone()).expect("trust test cert");
    let mut crypto = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    crypto.alpn_protocols = vec![b"h3".to_vec()];
    let quic_crypto = quinn::crypto::rustls::QuicClientConfig::try_from(crypto).expect("quic client crypto");
    let client_config = quinn::ClientConfig::new(Arc::new(quic_crypto));

    let bind_addr: SocketAddr = if server_addr.is_ipv6() { "[::]:0" } else { "0.0.0.0:0" }
        .parse()
        .expect("valid bind addr");
    let client_socket = UdpSocket::bind(bind_addr).expect("bind client socket");
    let runtime = quinn::default_runtime().expect("tokio quinn runtime");
    let mut endpoint =
        quinn::Endpoint::new(quinn::EndpointConfig::default(), None, client_socket, runtime).expect("client endpoint");
    endpoint.set_default_client_config(client_config);
    endpoint
}

/// Send one GET over one h3 request stream, returning the status and body.
async fn get(connection: quinn::Connection, path: &str) -> (StatusCode, Bytes) {
    let h3_conn = h3_quinn::Connection::new(connection);
    let (mut driver, mut send_request) = h3::client::new(h3_conn).await.expect("h3 client handshake");

    let request_fut = async {
        let request = Request::builder()
            .uri(path)
            .body(())
            .expect("valid request");
        let mut stream = send_request.send_request(request).await.expect("send request");
        stream.finish().await.expect("finish request");
        let response = stream.recv_response().await.expect("response headers");
        let mut body = bytes::BytesMut::new();
        while let Some(chunk) = stream.recv_data().await.expect("body chunk") {
            body.extend_from_slice(chunk.chunk());
        }
        (response.status(), body.freeze())
    };

    tokio::select! {
        biased;
        result = request_fut => {
            result
        }
        _ = futures_util::future::poll_fn(|cx| driver.poll_close(cx)) => {
            panic!("h3 connection closed before the response arrived");
        }
    }
}

#[tokio::test(flavor = "current_thread")]
async fn get_passthrough_over_quic() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let backend_addr = spawn_backend("hello from backend").await;
            let proxy_pass_origin: Uri = format!("http://{backend_addr}").parse().expect("backend uri");
            let (quic_addr, cert) = spawn_dispatcher(proxy_pass_origin).await;

            let client = client_endpoint(quic_addr, &cert);
            let connection = client
                .connect(quic_addr, "localhost")
                .expect("client connect attempt")
                .await
                .expect("client handshake");

            let (status, body) = get(connection, "https://localhost/").await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, Bytes::from_static(b"hello from backend"));
        })
        .await;
}

#[tokio::test(flavor = "current_thread")]
async fn session_survives_client_address_migration() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let backend_addr = spawn_backend("still here").await;
            let proxy_pass_origin: Uri = format!("http://{backend_addr}").parse().expect("backend uri");
            let (quic_addr, cert) = spawn_dispatcher(proxy_pass_origin).await;

            let client = client_endpoint(quic_addr, &cert);
            let connection = client
                .connect(quic_addr, "localhost")
                .expect("client connect attempt")
                .await
                .expect("client handshake");

            let (status, body) = get(connection.clone(), "https://localhost/").await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, Bytes::from_static(b"still here"));

            // Rebind the client endpoint's UDP socket to a fresh ephemeral port,
            // the same "new UDP source address, same CID" shape §8's migration
            // scenario describes; quinn keeps using the same Connection.
            let rebind_addr: SocketAddr = "127.0.0.1:0".parse().expect("valid addr");
            let new_socket = UdpSocket::bind(rebind_addr).expect("bind migrated socket");
            client.rebind(new_socket).expect("rebind client endpoint");

            let (status, body) = get(connection, "https://localhost/").await;
            assert_eq!(status, StatusCode::OK, "request after migration must still succeed");
            assert_eq!(body, Bytes::from_static(b"still here"));
        })
        .await;
}
