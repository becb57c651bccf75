//! Library entry for the `wolzone_bridge` crate.
//!
//! Exposes `inner_main` so a workspace-level shim binary can call into the bridge logic.
//!
//! The bridge keeps one debounced power signal per zone of machines and serves it,
//! together with per-device state and wake/sleep actions, over HTTP.
#![cfg_attr(
    test,
    expect(clippy::indexing_slicing, reason = "This is not problematic in tests",)
)]

extern crate alloc;
extern crate core;

pub mod app;
pub mod cli;
pub mod config;
pub mod device;
pub mod http;
pub mod scheduler;
#[cfg(test)]
mod testing;
pub mod zone;

use std::env;
use std::fs;
use std::sync::Once;

use eyre::{Result, WrapErr as _};
use tracing::{Instrument as _, info};
use tracing_subscriber::{EnvFilter, fmt::time::ChronoLocal};

use cli::{Cli, Command, LogFormat};

use crate::app::start;

static INIT_TRACING: Once = Once::new();

fn init_tracing(log_format: LogFormat) {
    INIT_TRACING.call_once(move || {
        let default_level = if env::var("WOLZONE_INTEGRATION_TEST").is_ok() {
            "error"
        } else {
            "info"
        };

        let builder = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
            )
            .with_timer(ChronoLocal::rfc_3339());

        match log_format {
            LogFormat::Compact => builder.compact().init(),
            LogFormat::Json => builder.json().init(),
            LogFormat::Pretty => builder.pretty().init(),
        }
    });
}

/// The bridge's main function; can be called from a shim binary.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded or the server fails to start.
pub async fn inner_main(invocation: Cli) -> Result<()> {
    match invocation.command {
        Command::Run(args) => {
            let config = &args.config;
            let config_path =
                fs::canonicalize(config).wrap_err(format!("Config file not found at: {config}"))?;

            init_tracing(args.log_format);

            let startup_span = tracing::info_span!("bridge", ?config_path, pid = ?std::process::id(), version = env!("CARGO_PKG_VERSION"));

            info!(parent: &startup_span, "Starting bridge");

            start(&config_path, args.port, args.bind.as_deref())
                .instrument(startup_span)
                .await
        }
        Command::CheckConfig { config } => {
            init_tracing(LogFormat::Compact);
            check_config(&config).await
        }
    }
}

/// Loads and validates a config file and prints what would be started.
async fn check_config(path: &str) -> Result<()> {
    let loaded = config::load(path).await?;
    println!("server: {}:{}", loaded.server.bind, loaded.server.port);

    for zone in loaded.into_zone_specs() {
        println!(
            "zone '{}': every {}s, flips after {} consecutive changes",
            zone.name,
            zone.policy.interval.as_secs(),
            zone.policy.changes_for_trigger
        );
        for device in &zone.devices {
            println!(
                "  device '{}': {:?} host {}",
                device.name,
                device.transport.family(),
                device.transport.host()
            );
        }
        for &(ref device, ref e) in &zone.rejected {
            println!("  excluded '{device}': {e}");
        }
    }
    Ok(())
}
