//! The Stellite reverse proxy binary: parses CLI flags and the optional
//! JSON config, sets up logging and TLS, then starts `worker_count`
//! independent Workers (see §6).

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use http::Uri;
use stellite_core::Result;
use stellite_quic::{Worker, WorkerConfig};
use stellite_server::{cli::Cli, config, daemon, logging, tls};

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.stop {
        return daemon::stop(&cli.pidfile);
    }
    if cli.daemon {
        daemon::daemonize()?;
    }

    let _logging_guard = logging::init(cli.logging, &cli.log_dir);
    let _pidfile_guard = daemon::acquire_pidfile(&cli.pidfile)?;

    let config = config::load(&cli)?;

    let proxy_pass_origin: Uri = config
        .proxy_pass
        .as_deref()
        .ok_or(stellite_core::Error::NoBackend)?
        .parse()
        .map_err(|e| stellite_core::Error::InvalidUrl(format!("{e}")))?;

    let cert_chain = tls::load_cert_chain(
        config
            .certfile
            .as_deref()
            .ok_or_else(|| stellite_core::Error::Tls(Box::new(std::io::Error::other("--certfile is required"))))?,
    )?;
    let key = tls::load_private_key(
        config
            .keyfile
            .as_deref()
            .ok_or_else(|| stellite_core::Error::Tls(Box::new(std::io::Error::other("--keyfile is required"))))?,
    )?;

    let bind_address = SocketAddr::new(config.bind_address, config.quic_port);
    let rewrites = config.rewrite_set()?;
    let proxy_timeout = std::time::Duration::from_secs(config.proxy_timeout_secs);

    tracing::info!(
        %bind_address,
        worker_count = config.worker_count,
        proxy_pass = %proxy_pass_origin,
        "starting stellite"
    );

    let shutdown = Arc::new(tokio::sync::Notify::new());
    register_shutdown_signals(Arc::clone(&shutdown))?;

    let mut handles = Vec::with_capacity(config.worker_count);
    for worker_index in 0..config.worker_count.max(1) {
        let server_config = stellite_quic::keys::build_server_config(cert_chain.clone(), key.clone())?;
        let worker = Worker::new(WorkerConfig {
            bind_address,
            server_config,
            proxy_pass_origin: proxy_pass_origin.clone(),
            rewrites: rewrites.clone(),
            proxy_timeout,
            dispatch_continuity: config.dispatch_continuity,
            send_buffer_size: config.send_buffer_size,
            recv_buffer_size: config.recv_buffer_size,
            shutdown: Arc::clone(&shutdown),
        });
        handles.push(
            std::thread::Builder::new()
                .name(format!("stellite-worker-{worker_index}"))
                .spawn(move || worker.run_blocking())
                .expect("spawning a worker OS thread"),
        );
    }

    for handle in handles {
        match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(error)) => tracing::error!(%error, "worker exited with an error"),
            Err(_) => tracing::error!("worker thread panicked"),
        }
    }

    Ok(())
}

/// Spawn a background thread that waits for `SIGQUIT`/`SIGINT`/`SIGTERM`
/// and wakes every Worker's dispatcher via `shutdown` when one arrives.
fn register_shutdown_signals(shutdown: Arc<tokio::sync::Notify>) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGQUIT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGQUIT, SIGINT, SIGTERM])
        .map_err(|e| stellite_core::Error::other(format!("registering signal handlers: {e}")))?;

    std::thread::Builder::new()
        .name("stellite-signal-watcher".into())
        .spawn(move || {
            if let Some(signal) = signals.forever().next() {
                tracing::info!(signal, "received shutdown signal");
                shutdown.notify_waiters();
            }
        })
        .map_err(|e| stellite_core::Error::other(format!("spawning signal watcher thread: {e}")))?;

    Ok(())
}
