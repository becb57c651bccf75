//! Command-line interface definitions for the bridge.

use std::env;

use clap::{Parser, Subcommand, ValueEnum};

/// Top-level command-line interface definition.
#[derive(Debug, Parser)]
#[command(name = env!("CARGO_PKG_NAME"))]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = env!("CARGO_PKG_DESCRIPTION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands for the bridge.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Poll all configured zones and serve their state over HTTP.
    Run(ServiceArgs),

    /// Load and validate a configuration file, then print the zones and devices it defines.
    CheckConfig {
        /// Path to the configuration file
        #[arg(short, long, default_value = "wolzone.toml")]
        config: String,
    },
}

/// Output format of the log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
    Pretty,
}

/// Arguments for the run command.
#[derive(Debug, Parser)]
pub struct ServiceArgs {
    /// Path to the configuration file
    #[arg(short, long, default_value = "wolzone.toml", env = "WOLZONE_CONFIG")]
    pub config: String,

    /// Optional override for the listen port (overrides port in config)
    #[arg(long)]
    pub port: Option<u16>,

    /// Optional override for the bind address (overrides bind in config)
    #[arg(long)]
    pub bind: Option<String>,

    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory as _;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_accepts_overrides() {
        let cli = Cli::try_parse_from([
            "wolzone_bridge",
            "run",
            "--config",
            "/etc/wolzone.toml",
            "--port",
            "9000",
            "--bind",
            "0.0.0.0",
            "--log-format",
            "json",
        ])
        .unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(args.config, "/etc/wolzone.toml");
        assert_eq!(args.port, Some(9000));
        assert_eq!(args.bind.as_deref(), Some("0.0.0.0"));
        assert_eq!(args.log_format, LogFormat::Json);
    }

    #[test]
    fn check_config_takes_a_path() {
        let cli = Cli::try_parse_from(["wolzone_bridge", "check-config", "-c", "x.toml"]).unwrap();
        assert!(
            matches!(cli.command, Command::CheckConfig { ref config } if config == "x.toml"),
            "got {:?}",
            cli.command
        );
    }
}
