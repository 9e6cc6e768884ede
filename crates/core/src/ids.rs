//! Identifiers used across the dispatch pipeline.
//!
//! See §3 ("Data model") for the invariants these carry: a [`Cid`] identifies
//! a Session for its whole lifetime (including across address migration),
//! and a [`StreamId`] is monotone within the Session that minted it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque connection identifier, stable across client address migration.
///
/// The real wire-level CID lives inside the QUIC transport; this is a
/// process-local stand-in derived from the transport's own stable id, kept
/// so the Dispatcher can maintain its own `Cid -> Session` map independent
/// of the transport's internal bookkeeping (see §3 invariants).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cid(u64);

impl Cid {
    /// Build a `Cid` from the transport's stable per-connection id.
    pub fn from_stable_id(stable_id: usize) -> Self {
        Self(stable_id as u64)
    }

    /// The raw 64-bit value.
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Stream identifier, monotone within one Session.
///
/// Client-initiated bidirectional HTTP/3 request streams are what this
/// identifies; parity of the underlying QUIC stream id distinguishes
/// client- from server-initiated streams, but callers of this type only
/// need a stable per-Session handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(u64);

impl StreamId {
    /// Build a `StreamId` from the transport's own stream id.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw value.
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A monotone, never-reused request id minted by a single [`Fetcher`].
///
/// [`Fetcher`]: stellite-fetcher's `Fetcher` type; referenced here only in
/// doc comments since stellite-core does not depend on stellite-fetcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    /// The raw value.
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mints strictly increasing, never-reused [`RequestId`]s.
///
/// Uniqueness holds even if `next()` is called from multiple threads;
/// monotonicity across threads is not guaranteed, only within a single
/// caller thread (see §4.E).
#[derive(Debug, Default)]
pub struct RequestIdSource {
    next: AtomicU64,
}

impl RequestIdSource {
    /// Create a source starting at id 1 (0 is reserved as "no request").
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Mint the next id.
    pub fn next(&self) -> RequestId {
        RequestId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ids_are_monotone_and_unique() {
        let source = RequestIdSource::new();
        let ids: Vec<_> = (0..100).map(|_| source.next().value()).collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids, sorted, "ids must be issued in increasing order");
        assert_eq!(
            ids.iter().collect::<std::collections::HashSet<_>>().len(),
            ids.len(),
            "ids must never repeat"
        );
    }

    #[test]
    fn cid_renders_as_fixed_width_hex() {
        let cid = Cid::from_stable_id(42);
        assert_eq!(cid.to_string(), "000000000000002a");
    }
}
