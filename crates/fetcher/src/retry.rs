//! Retry policy for outbound requests (see §4.E, "Retry policy").
//!
//! Both the 5xx-response retry and the network-change retry default to off.
//! When enabled, retries are capped and back off between attempts; a
//! side-effectful method (POST/PUT/PATCH) is only retried if the caller
//! opted into that explicitly, since replaying it may not be safe.

use std::time::Duration;

use http::Method;

/// Configuration for [`RetryPolicy`].
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Retry on a 5xx response.
    pub retry_on_server_error: bool,
    /// Retry when the underlying connection failed due to a network change
    /// (connect/reset errors, as opposed to an application-level 5xx).
    pub retry_on_network_change: bool,
    /// Maximum retry attempts for either condition.
    pub max_retries: u32,
    /// Base backoff between attempts; actual delay is `base * 2^attempt`.
    pub base_backoff: Duration,
    /// Allow retrying POST/PUT/PATCH. Off by default, since those requests
    /// may not be idempotent.
    pub retry_unsafe_methods: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retry_on_server_error: false,
            retry_on_network_change: false,
            max_retries: 0,
            base_backoff: Duration::from_millis(100),
            retry_unsafe_methods: false,
        }
    }
}

/// Why a retry is being considered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    ServerError,
    NetworkChange,
}

/// Decides, attempt by attempt, whether a failed request should be retried.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Whether `method` is eligible for retry at all.
    fn method_allowed(&self, method: &Method) -> bool {
        if self.config.retry_unsafe_methods {
            return true;
        }
        matches!(method, &Method::GET | &Method::HEAD | &Method::OPTIONS)
    }

    /// Whether attempt number `attempt` (0-indexed, the attempt that just
    /// failed) should be retried for `reason`.
    pub fn should_retry(&self, method: &Method, attempt: u32, reason: RetryReason) -> bool {
        if !self.method_allowed(method) {
            return false;
        }
        if attempt >= self.config.max_retries {
            return false;
        }
        match reason {
            RetryReason::ServerError => self.config.retry_on_server_error,
            RetryReason::NetworkChange => self.config.retry_on_network_change,
        }
    }

    /// Backoff to wait before attempt `attempt + 1`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.config.base_backoff * 2u32.saturating_pow(attempt)
    }
}
