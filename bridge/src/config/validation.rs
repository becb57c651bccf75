//! Turns raw configuration records into ready-to-spawn device and zone specs.

use alloc::sync::Arc;
use core::{net::IpAddr, time::Duration};
use std::collections::HashSet;

use secrecy::{ExposeSecret as _, SecretString};
use thiserror::Error as ThisError;
use tracing::{error, warn};
use wolzone_transport::{
    DEFAULT_SSH_PORT, LanBroadcast, LanTarget, MacAddress, MacParseError, RemoteShell,
    RemoteShellTarget, SshAuth, Transport,
};

use crate::{
    config::{BridgeConfig, DeviceConfig, MacDeviceConfig, WindowsDeviceConfig, ZoneConfig},
    device::GraceTimes,
    zone::ZonePolicy,
};

#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("malformed entry: {0}")]
    Malformed(#[source] toml::de::Error),
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("field `{0}` must not be empty")]
    EmptyField(&'static str),
    #[error("`{field}` must not be negative, got {value}")]
    NegativeGraceTime { field: &'static str, value: i64 },
    #[error(transparent)]
    InvalidMac(#[from] MacParseError),
    #[error("broadcast must be an IP address, got {0:?}")]
    InvalidBroadcast(String),
    #[error("invalid zone {zone:?}: {reason}")]
    InvalidZone { zone: String, reason: &'static str },
    #[error("duplicate name {0:?}")]
    DuplicateName(String),
}

/// A validated device, ready to be spawned.
#[derive(Debug)]
pub struct DeviceSpec {
    pub name: String,
    pub transport: Transport,
    pub grace: GraceTimes,
}

/// A validated zone with the devices that passed validation.
#[derive(Debug)]
pub struct ZoneSpec {
    pub name: String,
    pub policy: ZonePolicy,
    pub devices: Vec<DeviceSpec>,
    /// Devices that were excluded, labelled by name or position.
    pub rejected: Vec<(String, ConfigError)>,
}

fn required(value: Option<String>, field: &'static str) -> Result<String, ConfigError> {
    match value {
        None => Err(ConfigError::MissingField(field)),
        Some(v) if v.trim().is_empty() => Err(ConfigError::EmptyField(field)),
        Some(v) => Ok(v),
    }
}

fn required_secret(
    value: Option<SecretString>,
    field: &'static str,
) -> Result<Arc<SecretString>, ConfigError> {
    match value {
        None => Err(ConfigError::MissingField(field)),
        Some(v) if v.expose_secret().is_empty() => Err(ConfigError::EmptyField(field)),
        Some(v) => Ok(Arc::new(v)),
    }
}

fn grace_time(value: Option<i64>, field: &'static str) -> Result<Duration, ConfigError> {
    let value = value.ok_or(ConfigError::MissingField(field))?;
    u64::try_from(value)
        .map(Duration::from_secs)
        .map_err(|_| ConfigError::NegativeGraceTime { field, value })
}

fn grace_times(wake: Option<i64>, shutdown: Option<i64>) -> Result<GraceTimes, ConfigError> {
    Ok(GraceTimes {
        wake: grace_time(wake, "wake_grace_time")?,
        shutdown: grace_time(shutdown, "shutdown_grace_time")?,
    })
}

impl WindowsDeviceConfig {
    /// # Errors
    ///
    /// The first missing or invalid field.
    pub fn validate(self) -> Result<DeviceSpec, ConfigError> {
        let name = required(self.name, "name")?;
        let host = required(self.host, "host")?;
        let mac: MacAddress = required(self.mac, "mac")?.parse()?;
        let username = required(self.username, "username")?;
        let password = required_secret(self.password, "password")?;
        let grace = grace_times(self.wake_grace_time, self.shutdown_grace_time)?;
        let broadcast = self
            .broadcast
            .filter(|b| !b.trim().is_empty())
            .map(|b| {
                b.trim()
                    .parse::<IpAddr>()
                    .map_err(|_| ConfigError::InvalidBroadcast(b))
            })
            .transpose()?;

        Ok(DeviceSpec {
            name,
            transport: Transport::LanBroadcast(LanBroadcast::new(LanTarget {
                host,
                mac,
                broadcast,
                username,
                password,
            })),
            grace,
        })
    }
}

impl MacDeviceConfig {
    /// A password takes precedence over an identity file when both are set.
    ///
    /// # Errors
    ///
    /// The first missing or invalid field.
    pub fn validate(self) -> Result<DeviceSpec, ConfigError> {
        let name = required(self.name, "name")?;
        let architecture = self
            .architecture
            .ok_or(ConfigError::MissingField("architecture"))?;
        let host = required(self.host, "host")?;
        let username = required(self.username, "username")?;
        let auth = match (self.password, self.identity_file) {
            (Some(password), _) => SshAuth::Password(required_secret(Some(password), "password")?),
            (None, Some(path)) if path.as_os_str().is_empty() => {
                return Err(ConfigError::EmptyField("identity_file"));
            }
            (None, Some(path)) => SshAuth::IdentityFile(path),
            (None, None) => return Err(ConfigError::MissingField("password")),
        };
        let port = match self.port {
            Some(0) => return Err(ConfigError::EmptyField("port")),
            Some(port) => port,
            None => DEFAULT_SSH_PORT,
        };
        let grace = grace_times(self.wake_grace_time, self.shutdown_grace_time)?;

        Ok(DeviceSpec {
            name,
            transport: Transport::RemoteShell(RemoteShell::new(
                RemoteShellTarget {
                    host,
                    port,
                    username,
                    auth,
                    strict_host_key_checking: self.strict_host_key_checking.unwrap_or(true),
                },
                architecture,
            )),
            grace,
        })
    }
}

impl DeviceConfig {
    /// Deserializes and validates one raw `[[zones.devices]]` table.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Malformed`] when the table does not match any platform, otherwise the
    /// first missing or invalid field.
    pub fn from_value(value: toml::Value) -> Result<DeviceSpec, ConfigError> {
        let config: Self = value.try_into().map_err(ConfigError::Malformed)?;
        config.validate()
    }

    /// # Errors
    ///
    /// The first missing or invalid field.
    pub fn validate(self) -> Result<DeviceSpec, ConfigError> {
        match self {
            Self::Windows(c) => c.validate(),
            Self::MacOs(c) => c.validate(),
        }
    }
}

/// Name used in log lines for a device entry that may not even have a valid name.
fn device_label(value: &toml::Value, index: usize) -> String {
    value
        .get("name")
        .and_then(toml::Value::as_str)
        .filter(|n| !n.is_empty())
        .map_or_else(|| format!("#{index}"), str::to_owned)
}

impl ZoneConfig {
    /// Validates the zone record and each of its devices.
    ///
    /// Invalid devices are collected in [`ZoneSpec::rejected`]; only an invalid zone
    /// record itself is an error.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidZone`] for an empty name, a zero interval or a zero threshold.
    pub fn validate(self) -> Result<ZoneSpec, ConfigError> {
        let invalid = |reason| ConfigError::InvalidZone {
            zone: self.name.clone(),
            reason,
        };
        if self.name.trim().is_empty() {
            return Err(invalid("name must not be empty"));
        }
        if self.interval == 0 {
            return Err(invalid("interval must be at least one second"));
        }
        if self.changes_for_trigger == 0 {
            return Err(invalid("changes_for_trigger must be at least 1"));
        }

        let mut devices = Vec::with_capacity(self.devices.len());
        let mut rejected = Vec::new();
        let mut seen = HashSet::new();
        for (index, value) in self.devices.into_iter().enumerate() {
            let label = device_label(&value, index);
            match DeviceConfig::from_value(value) {
                Ok(spec) if !seen.insert(spec.name.clone()) => {
                    rejected.push((label, ConfigError::DuplicateName(spec.name)));
                }
                Ok(spec) => devices.push(spec),
                Err(e) => rejected.push((label, e)),
            }
        }

        Ok(ZoneSpec {
            name: self.name,
            policy: ZonePolicy {
                interval: Duration::from_secs(self.interval),
                changes_for_trigger: self.changes_for_trigger,
            },
            devices,
            rejected,
        })
    }
}

impl BridgeConfig {
    /// Validates every zone, logging and dropping what is unusable.
    ///
    /// Invalid devices are logged with `warn!`, invalid or duplicate zones with `error!`.
    #[must_use]
    pub fn into_zone_specs(self) -> Vec<ZoneSpec> {
        let mut seen = HashSet::new();
        let mut zones = Vec::with_capacity(self.zones.len());
        for zone in self.zones {
            let spec = match zone.validate() {
                Ok(spec) => spec,
                Err(e) => {
                    error!(error = %e, "excluding zone");
                    continue;
                }
            };
            if !seen.insert(spec.name.clone()) {
                error!(error = %ConfigError::DuplicateName(spec.name), "excluding zone");
                continue;
            }
            for &(ref device, ref e) in &spec.rejected {
                warn!(zone = %spec.name, device = %device, error = %e, "excluding device");
            }
            zones.push(spec);
        }
        zones
    }
}
