//! The shared server configuration, deserializable from the JSON config file
//! and mergeable over CLI flags (see §6, "External interfaces").
//!
//! This struct carries only the settings the dispatch pipeline itself reads;
//! process-management flags (`--daemon`, `--stop`, `--logging`) live in the
//! server binary's own CLI layer, since stellite-core has no business
//! knowing about pidfiles or log directories.

use std::net::IpAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::rewrite::RewriteSet;

fn default_quic_port() -> u16 {
    6121
}

fn default_bind_address() -> IpAddr {
    "::".parse().expect("valid default bind address")
}

fn default_worker_count() -> usize {
    1
}

fn default_dispatch_continuity() -> u8 {
    16
}

fn default_send_buffer_size() -> usize {
    43 * 1024
}

fn default_recv_buffer_size() -> usize {
    256 * 1024
}

fn default_proxy_timeout_secs() -> u64 {
    30
}

/// Clamp a configured `dispatch_continuity` into the `1..=32` range named in
/// §6 rather than rejecting out-of-range values outright.
pub fn clamp_dispatch_continuity(value: u8) -> u8 {
    value.clamp(1, 32)
}

/// One `(pattern, replacement)` rewrite rule, as it appears in the JSON
/// config's `rewrite` object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewriteRuleConfig {
    /// Regex pattern matched against the request path.
    pub pattern: String,
    /// Replacement template; may reference `$1`..`$16`.
    pub replace: String,
}

/// Configuration shared by every Worker in the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// UDP port to bind.
    #[serde(default = "default_quic_port")]
    pub quic_port: u16,
    /// Bind address.
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,
    /// Number of Workers, each an independent SO_REUSEPORT UDP socket.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Bound on synchronously-ready accept-loop iterations per wakeup.
    #[serde(default = "default_dispatch_continuity")]
    pub dispatch_continuity: u8,
    /// SO_SNDBUF size in bytes.
    #[serde(default = "default_send_buffer_size")]
    pub send_buffer_size: usize,
    /// SO_RCVBUF size in bytes.
    #[serde(default = "default_recv_buffer_size")]
    pub recv_buffer_size: usize,
    /// The single configured backend origin (`scheme://host:port`).
    pub proxy_pass: Option<String>,
    /// Per-request backend timeout, in seconds.
    #[serde(default = "default_proxy_timeout_secs")]
    pub proxy_timeout_secs: u64,
    /// Path to the TLS private key (PKCS#8).
    pub keyfile: Option<PathBuf>,
    /// Path to the TLS certificate chain (PEM).
    pub certfile: Option<PathBuf>,
    /// Ordered rewrite rules, applied first-match-wins.
    #[serde(default)]
    pub rewrite: Vec<RewriteRuleConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            quic_port: default_quic_port(),
            bind_address: default_bind_address(),
            worker_count: default_worker_count(),
            dispatch_continuity: default_dispatch_continuity(),
            send_buffer_size: default_send_buffer_size(),
            recv_buffer_size: default_recv_buffer_size(),
            proxy_pass: None,
            proxy_timeout_secs: default_proxy_timeout_secs(),
            keyfile: None,
            certfile: None,
            rewrite: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Parse a config from JSON text (see §6).
    pub fn from_json(text: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Merge `other` over `self`: every field `other` set explicitly (i.e.
    /// every field, since JSON has no notion of "unset" once parsed) wins.
    /// Used to apply a `--config` file over CLI-derived defaults.
    pub fn merge_over(self, other: PartialServerConfig) -> Self {
        Self {
            quic_port: other.quic_port.unwrap_or(self.quic_port),
            bind_address: other.bind_address.unwrap_or(self.bind_address),
            worker_count: other.worker_count.unwrap_or(self.worker_count),
            dispatch_continuity: other
                .dispatch_continuity
                .map(clamp_dispatch_continuity)
                .unwrap_or(self.dispatch_continuity),
            send_buffer_size: other.send_buffer_size.unwrap_or(self.send_buffer_size),
            recv_buffer_size: other.recv_buffer_size.unwrap_or(self.recv_buffer_size),
            proxy_pass: other.proxy_pass.or(self.proxy_pass),
            proxy_timeout_secs: other.proxy_timeout_secs.unwrap_or(self.proxy_timeout_secs),
            keyfile: other.keyfile.or(self.keyfile),
            certfile: other.certfile.or(self.certfile),
            rewrite: if other.rewrite.is_empty() {
                self.rewrite
            } else {
                other.rewrite
            },
        }
    }

    /// Compile this config's `rewrite` list into a [`RewriteSet`].
    pub fn rewrite_set(&self) -> crate::error::Result<RewriteSet> {
        RewriteSet::from_rules(
            self.rewrite
                .iter()
                .map(|rule| (rule.pattern.as_str(), rule.replace.clone())),
        )
    }
}

/// The same fields as [`ServerConfig`], all optional, matching what CLI flags
/// can individually override. Built by the server binary's CLI layer and fed
/// to [`ServerConfig::merge_over`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartialServerConfig {
    pub quic_port: Option<u16>,
    pub bind_address: Option<IpAddr>,
    pub worker_count: Option<usize>,
    pub dispatch_continuity: Option<u8>,
    pub send_buffer_size: Option<usize>,
    pub recv_buffer_size: Option<usize>,
    pub proxy_pass: Option<String>,
    pub proxy_timeout_secs: Option<u64>,
    pub keyfile: Option<PathBuf>,
    pub certfile: Option<PathBuf>,
    #[serde(default)]
    pub rewrite: Vec<RewriteRuleConfig>,
}
