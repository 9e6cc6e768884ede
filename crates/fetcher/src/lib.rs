//! The pooled outbound HTTP client a Worker uses to reach its configured
//! backend, and the per-request task bookkeeping around it (see §4.E).

pub mod client;
pub mod encoding;
pub mod fetcher;
pub mod retry;
pub mod task;

pub use client::HttpClient;
pub use encoding::ContentEncoding;
pub use fetcher::{DEFAULT_STOP_ON_REDIRECT, DEFAULT_TIMEOUT, Fetcher};
pub use retry::{RetryConfig, RetryPolicy, RetryReason};
pub use task::{FetcherTask, FetcherVisitor, TaskState};
