//! Uses the single integration test approach.
//!
//! This improves parallelism when running the tests, and reduces the number of binaries that have to be built (and linked)

mod api;
mod common;

use common::{
    KillOnDrop, get_free_port, office_config, run_bridge, spawn_bridge_with_config,
    wait_for_listening, write_config,
};

#[tokio::test]
async fn test_bridge_config_loads() {
    let port = get_free_port();
    let child = spawn_bridge_with_config(port, &office_config());
    let mut drop_guard = KillOnDrop(child);
    wait_for_listening(port, 5).await;
    assert!(
        drop_guard.0.try_wait().unwrap().is_none(),
        "bridge exited right after startup"
    );
}

#[test]
fn test_run_with_missing_config_fails() {
    let output = run_bridge(&["run", "--config", "/nonexistent/wolzone.toml"]);
    assert!(!output.status.success(), "missing config must be an error");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Config file not found"),
        "unexpected stderr: {stderr}"
    );
}

#[test]
fn test_check_config_reports_zones_and_exclusions() {
    let path = write_config("check_config", &office_config());
    let output = run_bridge(&["check-config", "--config", path.to_str().unwrap()]);
    assert!(output.status.success(), "check-config failed: {output:?}");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("zone 'office'"), "stdout: {stdout}");
    assert!(stdout.contains("device 'desk-pc'"), "stdout: {stdout}");
    assert!(stdout.contains("device 'studio'"), "stdout: {stdout}");
    assert!(stdout.contains("excluded 'broken'"), "stdout: {stdout}");
    assert!(!stdout.contains("zone 'lab'"), "invalid zone listed: {stdout}");
}

#[test]
fn test_check_config_rejects_invalid_toml() {
    let path = write_config("check_config_invalid", "[[zones]\nname =");
    let output = run_bridge(&["check-config", "--config", path.to_str().unwrap()]);
    assert!(!output.status.success(), "invalid TOML must be an error");
}
