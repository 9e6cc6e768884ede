//! Shared types for Stellite's dispatch pipeline: the crate-wide error type,
//! connection/stream/request identifiers, the URL rewrite engine, the
//! request/response descriptors passed between a Request Stream and the
//! Fetcher, and the server configuration schema.
//!
//! Nothing in this crate depends on `tokio`, `quinn` or `hyper` directly;
//! it is the vocabulary the other crates share, not a runtime.

pub mod config;
pub mod error;
pub mod headers;
pub mod ids;
pub mod request;
pub mod response;
pub mod rewrite;

pub use error::{BoxedError, Error, Result};
pub use headers::strip_hop_by_hop;
pub use ids::{Cid, RequestId, RequestIdSource, StreamId};
pub use request::{RequestBody, RequestFingerprint};
pub use response::{ConnectionInfo, ResponseDescriptor};
pub use rewrite::{RewriteRule, RewriteSet};
