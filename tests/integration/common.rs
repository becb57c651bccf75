//! Common utilities for integration tests.
//!
//! Spawning the bridge binary, picking free ports and waiting for the listener.

use std::process::{Child, Command, Output, Stdio};
use std::time::{Duration, Instant};

pub fn get_free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .expect("failed to bind to address")
        .local_addr()
        .unwrap()
        .port()
}

/// Guard that kills and waits on a child process when dropped.
pub struct KillOnDrop(pub Child);

impl Drop for KillOnDrop {
    fn drop(&mut self) {
        drop(self.0.kill());
        drop(self.0.wait());
    }
}

fn get_bridge_bin() -> &'static str {
    env!("CARGO_BIN_EXE_wolzone_bridge")
}

/// Writes `config_toml` to a temp file unique to `name` and returns its path.
pub fn write_config(name: &str, config_toml: &str) -> std::path::PathBuf {
    let tmp = std::env::temp_dir().join(format!("wolzone_integration_{name}.toml"));
    std::fs::write(&tmp, config_toml).expect("failed to write config");
    tmp
}

/// Spawn the bridge from a given config string, listening on `port`.
pub fn spawn_bridge_with_config(port: u16, config_toml: &str) -> Child {
    let path = write_config(&port.to_string(), config_toml);
    Command::new(get_bridge_bin())
        .args(["run", "--config", path.to_str().unwrap()])
        .args(["--port", &port.to_string(), "--bind", "127.0.0.1"])
        .env("WOLZONE_INTEGRATION_TEST", "1")
        .stdout(Stdio::null())
        .spawn()
        .expect("failed to start wolzone_bridge")
}

/// Runs the bridge binary to completion with the given arguments.
pub fn run_bridge(args: &[&str]) -> Output {
    Command::new(get_bridge_bin())
        .args(args)
        .env("WOLZONE_INTEGRATION_TEST", "1")
        .output()
        .expect("failed to run wolzone_bridge")
}

/// Block until a TCP listener is accepting on `127.0.0.1:port` or timeout.
pub async fn wait_for_listening(port: u16, timeout_secs: u64) {
    let start = Instant::now();
    while std::net::TcpStream::connect(("127.0.0.1", port)).is_err() {
        assert!(
            start.elapsed() <= Duration::from_secs(timeout_secs),
            "server did not start within timeout"
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// A config with one usable zone of two devices on unroutable documentation addresses,
/// one broken device and one broken zone. Polling is slow enough to never fire during a test.
pub fn office_config() -> String {
    r#"
        [[zones]]
        name = "office"
        interval = 3600
        changes_for_trigger = 2

        [[zones.devices]]
        platform = "windows"
        name = "desk-pc"
        host = "192.0.2.20"
        mac = "aa:bb:cc:dd:ee:ff"
        broadcast = "192.0.2.255"
        username = "admin"
        password = "secret"
        wake_grace_time = 30
        shutdown_grace_time = 60

        [[zones.devices]]
        platform = "macos"
        name = "studio"
        architecture = "silicon"
        host = "192.0.2.30"
        username = "me"
        identity_file = "/nonexistent/id_ed25519"
        wake_grace_time = 10
        shutdown_grace_time = 20

        [[zones.devices]]
        platform = "windows"
        name = "broken"
        host = "192.0.2.40"

        [[zones]]
        name = "lab"
        interval = 0
        changes_for_trigger = 1
    "#
    .to_owned()
}
