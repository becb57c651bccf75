//! Remote command provider for hosts reachable over ssh (macOS).
//!
//! Probing runs an introspection command on the host and interprets its output,
//! sleeping and waking are plain remote commands. This family cannot power on a
//! host that is fully off: "wake" only rouses a host that still answers over ssh.

use alloc::sync::Arc;
use core::time::Duration;
use std::path::PathBuf;

use secrecy::{ExposeSecret as _, SecretString};
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::{PowerTransport, TransportError, process::run_checked};

/// Default timeout for remote command based operations.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

pub const DEFAULT_SSH_PORT: u16 = 22;

const SLEEP_COMMAND: &str = "pmset displaysleepnow";
const WAKE_COMMAND: &str = "caffeinate -u -t 1";

/// CPU architecture of a remote macOS host, selects the status introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MacArchitecture {
    Intel,
    Silicon,
}

/// A remote introspection command and the predicate interpreting its stdout.
#[derive(Debug, Clone, Copy)]
pub struct StatusCommand {
    pub command: &'static str,
    pub is_on: fn(&str) -> Option<bool>,
}

const DISPLAY_ASLEEP_COUNT: &str =
    r#"system_profiler SPDisplaysDataType | grep "Display Asleep" | wc -l"#;

/// No display reporting "Display Asleep" means the host is awake.
fn no_display_asleep(output: &str) -> Option<bool> {
    output.trim().parse::<i64>().ok().map(|count| count <= 0)
}

impl MacArchitecture {
    #[must_use]
    pub const fn status_command(self) -> StatusCommand {
        match self {
            Self::Intel | Self::Silicon => StatusCommand {
                command: DISPLAY_ASLEEP_COUNT,
                is_on: no_display_asleep,
            },
        }
    }
}

/// How to authenticate against the remote host.
#[derive(Debug, Clone)]
pub enum SshAuth {
    /// Password handed to `sshpass` through the environment.
    Password(Arc<SecretString>),
    /// Private key file, with interactive prompts disabled.
    IdentityFile(PathBuf),
}

/// Connection settings of one remote host.
#[derive(Debug, Clone)]
pub struct RemoteShellTarget {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth: SshAuth,
    pub strict_host_key_checking: bool,
}

/// Transport provider for the remote command family.
#[derive(Debug, Clone)]
pub struct RemoteShell {
    target: RemoteShellTarget,
    status: StatusCommand,
    timeout: Duration,
}

impl RemoteShell {
    #[must_use]
    pub const fn new(target: RemoteShellTarget, architecture: MacArchitecture) -> Self {
        Self {
            target,
            status: architecture.status_command(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.target.host
    }

    /// Arguments passed to `ssh` for running `remote_command`.
    fn ssh_args(&self, remote_command: &str) -> Vec<String> {
        let target = &self.target;
        let mut args = vec![
            "-p".to_owned(),
            target.port.to_string(),
            "-o".to_owned(),
            format!("ConnectTimeout={}", self.timeout.as_secs().max(1)),
        ];
        if !target.strict_host_key_checking {
            args.extend(
                [
                    "-o",
                    "StrictHostKeyChecking=no",
                    "-o",
                    "UserKnownHostsFile=/dev/null",
                ]
                .map(str::to_owned),
            );
        }
        match target.auth {
            SshAuth::Password(_) => {
                args.extend(["-o", "PubkeyAuthentication=no"].map(str::to_owned));
            }
            SshAuth::IdentityFile(ref path) => {
                args.extend(["-o".to_owned(), "BatchMode=yes".to_owned(), "-i".to_owned()]);
                args.push(path.display().to_string());
            }
        }
        args.push(format!("{}@{}", target.username, target.host));
        args.push("--".to_owned());
        args.push(remote_command.to_owned());
        args
    }

    fn command(&self, remote_command: &str) -> Command {
        let args = self.ssh_args(remote_command);
        match self.target.auth {
            SshAuth::Password(ref password) => {
                let mut cmd = Command::new("sshpass");
                cmd.arg("-e")
                    .arg("ssh")
                    .args(args)
                    .env("SSHPASS", password.expose_secret());
                cmd
            }
            SshAuth::IdentityFile(_) => {
                let mut cmd = Command::new("ssh");
                cmd.args(args);
                cmd
            }
        }
    }

    async fn exec(&self, remote_command: &str) -> Result<String, TransportError> {
        debug!(host = %self.target.host, command = remote_command, "running remote command");
        run_checked(self.command(remote_command), self.timeout, &self.target.host).await
    }
}

impl PowerTransport for RemoteShell {
    async fn probe(&self) -> Result<bool, TransportError> {
        let output = self.exec(self.status.command).await?;
        (self.status.is_on)(&output).ok_or(TransportError::UnexpectedOutput(output))
    }

    async fn send_sleep(&self) -> Result<(), TransportError> {
        self.exec(SLEEP_COMMAND).await.map(drop)
    }

    async fn send_wake(&self) -> Result<(), TransportError> {
        self.exec(WAKE_COMMAND).await.map(drop)
    }
}
