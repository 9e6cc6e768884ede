//! One Session per QUIC connection (see §4.C).

use std::cell::RefCell;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::rc::{Rc, Weak};

use stellite_core::Cid;
use stellite_fetcher::Fetcher;

use crate::stream::RequestStreamHandle;

/// Lifecycle of a [`Session`]; only `Open` accepts new streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Draining,
    Closed,
}

/// One QUIC connection: its CID, current client address, and the set of
/// Request Streams it owns.
///
/// `streams` holds a strong reference to each stream's cancellation handle;
/// dropping a Session (or clearing `streams`) is what tears every owned
/// stream's Fetcher task down via their weak visitor back-references.
pub struct Session {
    cid: Cid,
    client_addr: SocketAddr,
    state: SessionState,
    streams: HashMap<stellite_core::StreamId, RequestStreamHandle>,
    fetcher: Rc<Fetcher>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("cid", &self.cid)
            .field("client_addr", &self.client_addr)
            .field("state", &self.state)
            .field("stream_count", &self.streams.len())
            .finish()
    }
}

impl Session {
    /// Create a new, `Open` Session for a just-accepted connection.
    pub fn new(cid: Cid, client_addr: SocketAddr, fetcher: Rc<Fetcher>) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            cid,
            client_addr,
            state: SessionState::Open,
            streams: HashMap::new(),
            fetcher,
        }))
    }

    pub fn cid(&self) -> Cid {
        self.cid
    }

    /// The client's current address; updated on every migration (read live
    /// from the transport connection handle by the caller, see §3).
    pub fn client_addr(&self) -> SocketAddr {
        self.client_addr
    }

    pub fn set_client_addr(&mut self, addr: SocketAddr) {
        self.client_addr = addr;
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn fetcher(&self) -> Rc<Fetcher> {
        Rc::clone(&self.fetcher)
    }

    /// Register a newly-allocated stream. Rejected (returns `false`) when
    /// the Session is no longer `Open`.
    pub fn register_stream(&mut self, id: stellite_core::StreamId, handle: RequestStreamHandle) -> bool {
        if self.state != SessionState::Open {
            return false;
        }
        self.streams.insert(id, handle);
        true
    }

    /// Drop a finished or reset stream's handle.
    pub fn remove_stream(&mut self, id: stellite_core::StreamId) {
        self.streams.remove(&id);
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Begin graceful shutdown: no further streams are accepted.
    pub fn start_draining(&mut self) {
        if self.state == SessionState::Open {
            self.state = SessionState::Draining;
        }
    }

    /// Tear the Session down: cancel every owned stream's Fetcher task and
    /// drop every stream handle, then transition to `Closed`.
    ///
    /// This is the single teardown path the Dispatcher calls on
    /// CONNECTION_CLOSE in either direction (see §4.C).
    pub fn close(&mut self) {
        for (_, handle) in self.streams.drain() {
            handle.cancel();
        }
        self.fetcher.cancel_all();
        self.state = SessionState::Closed;
    }
}

/// A cheap, clonable weak reference to a Session, used by a Stream to look
/// itself up without holding the Session alive.
pub type SessionWeak = Weak<RefCell<Session>>;
