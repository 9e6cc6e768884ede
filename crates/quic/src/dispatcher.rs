//! Demultiplexes incoming QUIC connections by CID and owns the server
//! crypto config (see §4.B).

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use bytes::Bytes;
use h3::server::Connection as H3Connection;
use http::Uri;
use stellite_core::{Cid, RewriteSet, StreamId};
use stellite_fetcher::Fetcher;

use crate::session::Session;
use crate::stream::{self, RequestStreamHandle, DEFAULT_PROXY_TIMEOUT};

/// Number of synchronously-ready accept-loop iterations processed inline
/// before yielding to the scheduler, clamped to `1..=32` (see §4.A/§4.B,
/// "dispatch_continuity").
pub const DEFAULT_DISPATCH_CONTINUITY: u8 = 16;

/// Owns the quinn endpoint and the `Cid -> Session` map for one Worker.
pub struct Dispatcher {
    endpoint: quinn::Endpoint,
    sessions: Rc<RefCell<HashMap<Cid, Rc<RefCell<Session>>>>>,
    proxy_pass_origin: Uri,
    rewrites: Rc<RewriteSet>,
    proxy_timeout: std::time::Duration,
    dispatch_continuity: u8,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("sessions", &self.sessions.borrow().len())
            .field("dispatch_continuity", &self.dispatch_continuity)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Build a Dispatcher around an already-bound quinn endpoint.
    pub fn new(
        endpoint: quinn::Endpoint,
        proxy_pass_origin: Uri,
        rewrites: RewriteSet,
        proxy_timeout: std::time::Duration,
        dispatch_continuity: u8,
    ) -> Self {
        Self {
            endpoint,
            sessions: Rc::new(RefCell::new(HashMap::new())),
            proxy_pass_origin,
            rewrites: Rc::new(rewrites),
            proxy_timeout,
            dispatch_continuity: dispatch_continuity.clamp(1, 32),
        }
    }

    /// Number of live Sessions, for diagnostics and tests.
    pub fn session_count(&self) -> usize {
        self.sessions.borrow().len()
    }

    /// Run the accept loop until the endpoint closes or `shutdown` fires:
    /// bound to `dispatch_continuity` synchronously-ready iterations per
    /// wakeup, then `tokio::task::yield_now()` (see §4.A, "back-pressure
    /// fairness rule").
    pub async fn run(&self, fetcher: Rc<Fetcher>, shutdown: std::sync::Arc<tokio::sync::Notify>) {
        loop {
            let mut processed = 0u8;
            while processed < self.dispatch_continuity {
                tokio::select! {
                    incoming = self.endpoint.accept() => {
                        let Some(incoming) = incoming else {
                            tracing::info!("quic endpoint closed, dispatcher exiting");
                            return;
                        };
                        self.accept_one(incoming, Rc::clone(&fetcher));
                        processed += 1;
                    }
                    () = shutdown.notified() => {
                        tracing::info!("shutdown signal received, closing dispatcher");
                        self.shutdown();
                        return;
                    }
                }
            }
            tokio::task::yield_now().await;
        }
    }

    fn accept_one(&self, incoming: quinn::Incoming, fetcher: Rc<Fetcher>) {
        let sessions = Rc::clone(&self.sessions);
        let proxy_pass_origin = self.proxy_pass_origin.clone();
        let rewrites = Rc::clone(&self.rewrites);
        let proxy_timeout = self.proxy_timeout;
        tokio::task::spawn_local(async move {
            let connecting = incoming.accept();
            let connection = match connecting {
                Ok(connecting) => match connecting.await {
                    Ok(connection) => connection,
                    Err(e) => {
                        tracing::debug!(error = %e, "quic handshake failed");
                        return;
                    }
                },
                Err(e) => {
                    tracing::debug!(error = %e, "quic connection attempt rejected");
                    return;
                }
            };

            let cid = Cid::from_stable_id(connection.stable_id());
            let client_addr = connection.remote_address();
            let session = Session::new(cid, client_addr, fetcher);
            sessions.borrow_mut().insert(cid, Rc::clone(&session));

            let quic_connection = connection.clone();
            let h3_connection = h3_quinn::Connection::new(connection);
            let h3_connection = match H3Connection::<_, Bytes>::new(h3_connection).await {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::debug!(error = %e, "http/3 handshake failed");
                    sessions.borrow_mut().remove(&cid);
                    return;
                }
            };

            run_session(session, quic_connection, h3_connection, proxy_pass_origin, rewrites, proxy_timeout).await;
            sessions.borrow_mut().remove(&cid);
        });
    }

    /// Close every live Session with a graceful error code, then drop the
    /// map (see §4.B, "shutdown").
    pub fn shutdown(&self) {
        self.endpoint.close(0u32.into(), b"server shutting down");
        for (_, session) in self.sessions.borrow_mut().drain() {
            let mut session = session.borrow_mut();
            session.start_draining();
            session.close();
        }
    }
}

/// Drive one Session's HTTP/3 accept loop: one Request Stream task per
/// client-initiated bidirectional stream (see §4.C, "new client-initiated
/// bidirectional stream").
async fn run_session(
    session: Rc<RefCell<Session>>,
    quic_connection: quinn::Connection,
    mut h3_connection: H3Connection<h3_quinn::Connection, Bytes>,
    proxy_pass_origin: Uri,
    rewrites: Rc<RewriteSet>,
    proxy_timeout: std::time::Duration,
) {
    let proxy_timeout = if proxy_timeout.is_zero() {
        DEFAULT_PROXY_TIMEOUT
    } else {
        proxy_timeout
    };
    loop {
        match h3_connection.accept().await {
            Ok(Some((request, h3_stream))) => {
                // `remote_address()` reflects quinn's own live path validation, so this
                // picks up a connection migration on every new stream (§3).
                session.borrow_mut().set_client_addr(quic_connection.remote_address());
                if session.borrow().state() != crate::session::SessionState::Open {
                    tracing::debug!("stream declined: session is no longer open");
                    continue;
                }
                let fetcher = session.borrow().fetcher();
                let proxy_pass_origin = proxy_pass_origin.clone();
                let rewrites = Rc::clone(&rewrites);
                let stream_id = StreamId::from_raw(next_stream_ordinal());
                let task = tokio::task::spawn_local(stream::drive_stream(
                    request,
                    h3_stream,
                    fetcher,
                    proxy_pass_origin,
                    rewrites,
                    proxy_timeout,
                ));
                let accepted = session
                    .borrow_mut()
                    .register_stream(stream_id, RequestStreamHandle::new(task));
                debug_assert!(accepted, "state checked above with no await in between, nothing can change it");
            }
            Ok(None) => {
                tracing::debug!(cid = %session.borrow().cid(), "connection closed");
                session.borrow_mut().start_draining();
                session.borrow_mut().close();
                return;
            }
            Err(e) => {
                tracing::debug!(error = %e, "http/3 connection error");
                session.borrow_mut().start_draining();
                session.borrow_mut().close();
                return;
            }
        }
    }
}

thread_local! {
    static STREAM_ORDINAL: std::cell::Cell<u64> = const { std::cell::Cell::new(0) };
}

fn next_stream_ordinal() -> u64 {
    STREAM_ORDINAL.with(|cell| {
        let next = cell.get() + 1;
        cell.set(next);
        next
    })
}
