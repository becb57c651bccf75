//! LAN broadcast provider for Wake-on-LAN capable hosts (Windows).
//!
//! Reachability is an ICMP echo, shutdown goes through the Samba `net rpc` client,
//! and waking broadcasts a magic packet, which also revives fully powered off hosts.

use alloc::sync::Arc;
use core::{net::IpAddr, time::Duration};

use secrecy::{ExposeSecret as _, SecretString};
use tokio::process::Command;
use tracing::debug;

use crate::{
    PowerTransport, TransportError,
    process::{classify_failure, run, run_checked},
    wol::{DEFAULT_BROADCAST, MacAddress, send_magic_packet},
};

/// How long a single echo request waits for its reply.
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(1);

/// Timeout for the remote shutdown RPC.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(5);

/// Headroom on top of the echo timeout before the `ping` process itself is abandoned.
const PING_PROCESS_SLACK: Duration = Duration::from_secs(2);

/// Exit code with which `ping` reports that no reply arrived.
const PING_NO_REPLY: i32 = if cfg!(target_os = "macos") { 2 } else { 1 };

/// Connection settings of one Wake-on-LAN host.
#[derive(Debug, Clone)]
pub struct LanTarget {
    pub host: String,
    pub mac: MacAddress,
    pub broadcast: Option<IpAddr>,
    pub username: String,
    pub password: Arc<SecretString>,
}

/// Transport provider for the LAN broadcast family.
#[derive(Debug, Clone)]
pub struct LanBroadcast {
    target: LanTarget,
    ping_timeout: Duration,
    rpc_timeout: Duration,
}

impl LanBroadcast {
    #[must_use]
    pub const fn new(target: LanTarget) -> Self {
        Self {
            target,
            ping_timeout: DEFAULT_PING_TIMEOUT,
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
        }
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.target.host
    }

    fn ping_command(&self) -> Command {
        let secs = self.ping_timeout.as_secs().max(1).to_string();
        let millis = self.ping_timeout.as_millis().max(1).to_string();
        let mut cmd = Command::new("ping");
        if cfg!(windows) {
            cmd.args(["-n", "1", "-w", millis.as_str()]);
        } else if cfg!(target_os = "macos") {
            cmd.args(["-c", "1", "-W", millis.as_str()]);
        } else {
            cmd.args(["-c", "1", "-W", secs.as_str()]);
        }
        cmd.arg(&self.target.host);
        cmd
    }

    /// `net` picks the password up from `PASSWD`, keeping it out of the argument list.
    fn shutdown_command(&self) -> Command {
        let target = &self.target;
        let mut cmd = Command::new("net");
        cmd.args([
            "rpc",
            "shutdown",
            "--ipaddress",
            target.host.as_str(),
            "--user",
            target.username.as_str(),
        ])
        .env("PASSWD", target.password.expose_secret());
        cmd
    }
}

impl PowerTransport for LanBroadcast {
    async fn probe(&self) -> Result<bool, TransportError> {
        let output = run(self.ping_command(), self.ping_timeout + PING_PROCESS_SLACK).await?;
        match output.status.code() {
            Some(0) => Ok(true),
            Some(PING_NO_REPLY) => {
                debug!(host = %self.target.host, "no echo reply");
                Ok(false)
            }
            _ => Err(classify_failure(
                "ping".to_owned(),
                &self.target.host,
                &output,
            )),
        }
    }

    async fn send_sleep(&self) -> Result<(), TransportError> {
        debug!(host = %self.target.host, "requesting shutdown via net rpc");
        run_checked(self.shutdown_command(), self.rpc_timeout, &self.target.host)
            .await
            .map(drop)
    }

    async fn send_wake(&self) -> Result<(), TransportError> {
        let broadcast = self.target.broadcast.unwrap_or(DEFAULT_BROADCAST);
        send_magic_packet(self.target.mac, broadcast).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport() -> LanBroadcast {
        LanBroadcast::new(LanTarget {
            host: "192.0.2.10".to_owned(),
            mac: "aa:bb:cc:dd:ee:ff".parse().unwrap(),
            broadcast: None,
            username: "admin".to_owned(),
            password: Arc::new(SecretString::from("hunter2")),
        })
    }

    #[test]
    fn shutdown_passes_password_through_environment() {
        let cmd = transport().shutdown_command();
        let std_cmd = cmd.as_std();
        assert_eq!(std_cmd.get_program(), "net");
        let args: Vec<_> = std_cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            ["rpc", "shutdown", "--ipaddress", "192.0.2.10", "--user", "admin"]
        );
        assert!(
            args.iter().all(|a| !a.contains("hunter2")),
            "password leaked into argv: {args:?}"
        );

        let passwd = std_cmd
            .get_envs()
            .find(|&(key, _)| key == "PASSWD")
            .and_then(|(_, value)| value);
        assert_eq!(passwd.and_then(|v| v.to_str()), Some("hunter2"));
    }

    #[test]
    fn ping_sends_a_single_echo_to_the_host() {
        let cmd = transport().ping_command();
        let args: Vec<_> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args.last().map(String::as_str), Some("192.0.2.10"));
        assert!(args.iter().any(|a| a == "1"), "single echo: {args:?}");
    }
}
