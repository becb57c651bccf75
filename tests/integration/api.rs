//! Drives the HTTP interface of a running bridge.
//!
//! Only cached reads and error paths are exercised; the configured hosts are unroutable.

use reqwest::{Client, StatusCode};
use serde_json::{Value, json};

use crate::common::{
    KillOnDrop, get_free_port, office_config, spawn_bridge_with_config, wait_for_listening,
};

async fn start_bridge() -> (KillOnDrop, String) {
    let port = get_free_port();
    let guard = KillOnDrop(spawn_bridge_with_config(port, &office_config()));
    wait_for_listening(port, 5).await;
    (guard, format!("http://127.0.0.1:{port}/api"))
}

#[tokio::test]
async fn test_zones_are_listed_without_invalid_entries() {
    let (_guard, base) = start_bridge().await;

    let zones: Value = Client::new()
        .get(format!("{base}/zones"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        zones,
        json!([{
            "name": "office",
            "awake": false,
            "asleep": true,
            "devices": ["desk-pc", "studio"],
        }])
    );
}

#[tokio::test]
async fn test_single_zone_and_cached_device_status() {
    let (_guard, base) = start_bridge().await;
    let client = Client::new();

    let zone: Value = client
        .get(format!("{base}/zones/office"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(zone["asleep"], true);

    let device: Value = client
        .get(format!("{base}/zones/office/devices/studio?from_cache=true"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        device,
        json!({ "name": "studio", "powered": false, "suspended": false })
    );
}

#[tokio::test]
async fn test_unknown_names_are_not_found() {
    let (_guard, base) = start_bridge().await;
    let client = Client::new();

    for url in [
        format!("{base}/zones/lab"),
        format!("{base}/zones/office/devices/broken?from_cache=true"),
    ] {
        let status = client.get(&url).send().await.unwrap().status();
        assert_eq!(status, StatusCode::NOT_FOUND, "{url}");
    }

    let status = client
        .post(format!("{base}/zones/garage/devices/desk-pc/wake"))
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_action_is_bad_request() {
    let (_guard, base) = start_bridge().await;
    let status = Client::new()
        .post(format!("{base}/zones/office/devices/desk-pc/reboot"))
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
