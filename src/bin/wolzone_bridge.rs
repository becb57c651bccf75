//! Shim binary that calls into the `wolzone_bridge` library's `inner_main`.
use clap::Parser as _;
use eyre::Result;
use wolzone_bridge::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    // Delegate to library entrypoint
    wolzone_bridge::inner_main(Cli::parse()).await
}
