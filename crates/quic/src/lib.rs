//! The QUIC/HTTP3 dispatch pipeline: UDP listener, dispatcher, session,
//! request stream state machine, and the Worker that binds them together
//! on one cooperative task runner per OS thread (see §4).

pub mod dispatcher;
pub mod keys;
pub mod listener;
pub mod session;
pub mod stream;
pub mod worker;

pub use dispatcher::{Dispatcher, DEFAULT_DISPATCH_CONTINUITY};
pub use session::{Session, SessionState};
pub use stream::{RequestStreamHandle, DEFAULT_PROXY_TIMEOUT, MAX_BUFFERED_BODY};
pub use worker::{Worker, WorkerConfig};
