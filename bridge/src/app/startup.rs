//! Process lifecycle of the `run` command.

use core::net::{IpAddr, SocketAddr};
use std::path::Path;

use eyre::WrapErr as _;
use tokio::{net, signal};
use tracing::{info, warn};

use crate::{
    app::{AppState, spawn_zones},
    config::load,
    http::router,
};

/// Resolves when SIGTERM or Ctrl-C is received.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler, only Ctrl-C will stop the bridge");
                drop(signal::ctrl_c().await);
                return;
            }
        };
        tokio::select! {
            _ = sigterm.recv() => {}
            _ = signal::ctrl_c() => {}
        }
    }
    #[cfg(not(unix))]
    {
        drop(signal::ctrl_c().await);
    }
}

/// Loads the config, starts all zones and serves the HTTP interface until shutdown.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded, the bind address is invalid or
/// the listener cannot bind.
pub(crate) async fn start(
    config_path: &Path,
    port_override: Option<u16>,
    bind_override: Option<&str>,
) -> eyre::Result<()> {
    let config = load(config_path).await?;

    // Apply optional overrides from CLI/tests
    let listen_port = port_override.unwrap_or(config.server.port);
    let bind_str = bind_override.unwrap_or(&config.server.bind).to_owned();
    let listen_ip: IpAddr = bind_str
        .parse()
        .wrap_err(format!("Invalid bind address: {bind_str}"))?;

    let specs = config.into_zone_specs();
    if specs.is_empty() {
        warn!("no usable zones configured");
    }
    let (zones, pollers) = spawn_zones(specs);
    let app_state = AppState::new(zones);

    let addr = SocketAddr::from((listen_ip, listen_port));
    let listener = net::TcpListener::bind(addr)
        .await
        .wrap_err(format!("Failed to bind HTTP listener on {addr}"))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, router::create_app(app_state))
        .with_graceful_shutdown(async {
            shutdown_signal().await;
            info!("Received shutdown, shutting down");
        })
        .await
        .wrap_err("HTTP server failed")?;

    for poller in pollers {
        poller.shutdown().await;
    }
    info!("all zone pollers stopped");
    Ok(())
}
