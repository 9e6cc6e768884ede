//! Command-line flags (see §6, "External interfaces").

use std::net::IpAddr;
use std::path::PathBuf;

use clap::Parser;
use stellite_core::config::PartialServerConfig;

/// Stellite: a QUIC-capable HTTP reverse proxy.
#[derive(Debug, Parser)]
#[command(name = "stellite", version, about)]
pub struct Cli {
    /// UDP port to bind (default 6121).
    #[arg(long)]
    pub quic_port: Option<u16>,

    /// Bind address (default "::").
    #[arg(long)]
    pub bind_address: Option<IpAddr>,

    /// Worker threads (default 1).
    #[arg(long)]
    pub worker_count: Option<usize>,

    /// Sync-read batch bound, 1..=32 (default 16).
    #[arg(long)]
    pub dispatch_continuity: Option<u8>,

    /// SO_SNDBUF (default ~43 KiB).
    #[arg(long)]
    pub send_buffer_size: Option<usize>,

    /// SO_RCVBUF (default 256 KiB).
    #[arg(long)]
    pub recv_buffer_size: Option<usize>,

    /// Backend origin (scheme://host:port).
    #[arg(long)]
    pub proxy_pass: Option<String>,

    /// Per-request backend timeout, in seconds (default 30).
    #[arg(long)]
    pub proxy_timeout: Option<u64>,

    /// TLS private key (PKCS#8).
    #[arg(long)]
    pub keyfile: Option<PathBuf>,

    /// TLS certificate chain (PEM).
    #[arg(long)]
    pub certfile: Option<PathBuf>,

    /// JSON config file; overrides individual flags where both are set.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Daemonize (see `daemon::daemonize`; currently a documented no-op).
    #[arg(long)]
    pub daemon: bool,

    /// Terminate the running daemon named by `--pidfile`.
    #[arg(long)]
    pub stop: bool,

    /// Pidfile path (default "/tmp/quic.pid").
    #[arg(long, default_value = "/tmp/quic.pid")]
    pub pidfile: PathBuf,

    /// Enable date-rotated file logging under `--log-dir`.
    #[arg(long)]
    pub logging: bool,

    /// Directory for rotated log files (default "./log").
    #[arg(long, default_value = "./log")]
    pub log_dir: PathBuf,
}

impl Cli {
    /// Project the flags that map onto [`stellite_core::config::ServerConfig`]
    /// fields into a [`PartialServerConfig`], leaving process-management
    /// flags (`--daemon`, `--logging`, ...) out, since those belong to this
    /// binary's own layer.
    pub fn as_partial_config(&self) -> PartialServerConfig {
        PartialServerConfig {
            quic_port: self.quic_port,
            bind_address: self.bind_address,
            worker_count: self.worker_count,
            dispatch_continuity: self.dispatch_continuity,
            send_buffer_size: self.send_buffer_size,
            recv_buffer_size: self.recv_buffer_size,
            proxy_pass: self.proxy_pass.clone(),
            proxy_timeout_secs: self.proxy_timeout,
            keyfile: self.keyfile.clone(),
            certfile: self.certfile.clone(),
            rewrite: Vec::new(),
        }
    }
}
