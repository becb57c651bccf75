//! Configuration data types as they appear in the TOML file.
//!
//! Device entries are kept as raw TOML tables here and deserialized one at a time
//! during validation, so that one broken device cannot take the whole file down.

use std::path::PathBuf;

use secrecy::SecretString;
use serde::Deserialize;
use wolzone_transport::MacArchitecture;

pub const DEFAULT_PORT: u16 = 8090;
pub const DEFAULT_BIND: &str = "127.0.0.1";

/// HTTP server binding configuration section.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

const fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_bind() -> String {
    DEFAULT_BIND.to_owned()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: default_bind(),
        }
    }
}

/// One `[[zones]]` entry.
///
/// Missing scalar fields fall back to empty/zero so that validation can reject the zone
/// by name instead of failing the whole file.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ZoneConfig {
    #[serde(default)]
    pub name: String,
    /// Seconds between polls.
    #[serde(default)]
    pub interval: u64,
    #[serde(default)]
    pub changes_for_trigger: u32,
    #[serde(default)]
    pub devices: Vec<toml::Value>,
}

/// Root of the configuration file.
///
/// ```toml
/// [server]
/// port = 8090
///
/// [[zones]]
/// name = "office"
/// interval = 10
/// changes_for_trigger = 3
///
/// [[zones.devices]]
/// platform = "windows"
/// name = "desk-pc"
/// # ...
/// ```
#[derive(Debug, Deserialize, Clone, Default)]
pub struct BridgeConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub zones: Vec<ZoneConfig>,
}

/// A device entry, tagged by the operating system family of its host.
#[derive(Debug, Deserialize)]
#[serde(tag = "platform", rename_all = "lowercase")]
pub enum DeviceConfig {
    Windows(WindowsDeviceConfig),
    MacOs(MacDeviceConfig),
}

/// Wake-on-LAN host, shut down over `net rpc`.
#[derive(Debug, Deserialize, Default)]
pub struct WindowsDeviceConfig {
    pub name: Option<String>,
    pub host: Option<String>,
    pub mac: Option<String>,
    /// Broadcast address for the magic packet, `255.255.255.255` when unset.
    pub broadcast: Option<String>,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    /// Seconds during which probes are ignored after a wake command.
    pub wake_grace_time: Option<i64>,
    pub shutdown_grace_time: Option<i64>,
}

/// macOS host driven over ssh.
#[derive(Debug, Deserialize, Default)]
pub struct MacDeviceConfig {
    pub name: Option<String>,
    pub architecture: Option<MacArchitecture>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub identity_file: Option<PathBuf>,
    pub strict_host_key_checking: Option<bool>,
    pub wake_grace_time: Option<i64>,
    pub shutdown_grace_time: Option<i64>,
}
