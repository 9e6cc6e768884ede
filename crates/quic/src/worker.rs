//! Binds a UDP Listener, a Dispatcher and a Fetcher to a single-threaded
//! cooperative task runner (see §4.F).

use std::net::SocketAddr;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use http::Uri;
use stellite_core::{Result, RewriteSet};
use stellite_fetcher::Fetcher;

use crate::dispatcher::Dispatcher;
use crate::listener;

/// Everything one Worker needs to start: bind address, TLS server config,
/// backend origin, rewrite rules and the tunables named in §6.
pub struct WorkerConfig {
    pub bind_address: SocketAddr,
    pub server_config: quinn::ServerConfig,
    pub proxy_pass_origin: Uri,
    pub rewrites: RewriteSet,
    pub proxy_timeout: Duration,
    pub dispatch_continuity: u8,
    pub send_buffer_size: usize,
    pub recv_buffer_size: usize,
    /// Fires to ask the Worker's dispatcher to close down gracefully (see
    /// `crate::dispatcher::Dispatcher::shutdown`). Shared across every
    /// Worker in the process so one `SIGQUIT` stops all of them.
    pub shutdown: Arc<Notify>,
}

/// One Worker: one OS thread, one current-thread Tokio runtime, one
/// `LocalSet`, one UDP socket, one Dispatcher, one Fetcher.
///
/// Workers share no mutable state; the only thing tying them together is
/// the shared `SO_REUSEPORT` bind (see §4.F, "Workers are independent").
pub struct Worker {
    config: WorkerConfig,
}

impl Worker {
    pub fn new(config: WorkerConfig) -> Self {
        Self { config }
    }

    /// Run this Worker on the calling OS thread until the process is asked
    /// to stop. Intended to be the body of a dedicated `std::thread`.
    pub fn run_blocking(self) -> Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(stellite_core::Error::from)?;
        let local = tokio::task::LocalSet::new();
        local.block_on(&runtime, self.run())
    }

    async fn run(self) -> Result<()> {
        let WorkerConfig {
            bind_address,
            server_config,
            proxy_pass_origin,
            rewrites,
            proxy_timeout,
            dispatch_continuity,
            send_buffer_size,
            recv_buffer_size,
            shutdown,
        } = self.config;

        let socket = listener::bind_reuseport(bind_address, send_buffer_size, recv_buffer_size)?;
        let endpoint_config = quinn::EndpointConfig::default();
        let runtime = quinn::default_runtime()
            .ok_or_else(|| stellite_core::Error::other("no compatible tokio runtime found"))?;
        let endpoint = quinn::Endpoint::new(endpoint_config, Some(server_config), socket, runtime)
            .map_err(stellite_core::Error::from)?;

        let fetcher = Rc::new(Fetcher::new());
        let dispatcher = Dispatcher::new(endpoint, proxy_pass_origin, rewrites, proxy_timeout, dispatch_continuity);

        tracing::info!(bind_address = %bind_address, "worker started");
        dispatcher.run(fetcher, shutdown).await;
        Ok(())
    }
}
