//! Zone and device endpoints.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::{
    app::AppState,
    device::{DeviceError, DeviceHandle, DevicePhase, PowerAction},
    zone::{ZoneError, ZoneHandle},
};

pub(crate) fn routes() -> Router<AppState> {
    Router::new()
        .route("/zones", get(list_zones))
        .route("/zones/{zone}", get(get_zone))
        .route("/zones/{zone}/devices/{device}", get(get_device_status))
        .route(
            "/zones/{zone}/devices/{device}/{action}",
            post(handle_device_action),
        )
}

/// Published state of a zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneView {
    pub name: String,
    pub awake: bool,
    pub asleep: bool,
    pub devices: Vec<String>,
}

impl From<&ZoneHandle> for ZoneView {
    fn from(zone: &ZoneHandle) -> Self {
        let signal = zone.signal();
        Self {
            name: zone.name().to_owned(),
            awake: signal.awake,
            asleep: signal.asleep,
            devices: zone.devices().iter().map(|d| d.name().to_owned()).collect(),
        }
    }
}

/// State of one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceView {
    pub name: String,
    pub powered: bool,
    pub suspended: bool,
}

impl DeviceView {
    fn new(device: &DeviceHandle, powered: bool) -> Self {
        Self {
            name: device.name().to_owned(),
            powered,
            suspended: device.snapshot().phase == DevicePhase::Suspended,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct StatusQuery {
    #[serde(default)]
    from_cache: bool,
}

fn not_found(what: &str, name: &str) -> Response {
    (StatusCode::NOT_FOUND, format!("Unknown {what} '{name}'")).into_response()
}

#[axum::debug_handler]
async fn list_zones(State(state): State<AppState>) -> Json<Vec<ZoneView>> {
    Json(state.zones.values().map(ZoneView::from).collect())
}

#[axum::debug_handler]
async fn get_zone(Path(zone): Path<String>, State(state): State<AppState>) -> Response {
    match state.zone(&zone) {
        Some(z) => Json(ZoneView::from(z)).into_response(),
        None => not_found("zone", &zone),
    }
}

/// Returns the power state of a device, falling back to the cached value when the
/// device cannot be probed.
#[axum::debug_handler]
async fn get_device_status(
    Path((zone, device)): Path<(String, String)>,
    Query(query): Query<StatusQuery>,
    State(state): State<AppState>,
) -> Response {
    let Some(z) = state.zone(&zone) else {
        return not_found("zone", &zone);
    };
    let Some(dev) = z.device(&device) else {
        return not_found("device", &device);
    };

    let powered = match dev.status(query.from_cache).await {
        Ok(powered) => powered,
        Err(e) => {
            error!(%zone, %device, error = %e, "status check failed, answering with cached state");
            dev.cached()
        }
    };
    Json(DeviceView::new(dev, powered)).into_response()
}

/// Wakes or sleeps a device through its zone, which publishes the zone state right away.
#[axum::debug_handler]
async fn handle_device_action(
    Path((zone, device, action)): Path<(String, String, PowerAction)>,
    State(state): State<AppState>,
) -> Response {
    let Some(z) = state.zone(&zone) else {
        return not_found("zone", &zone);
    };

    match z.set_power(&device, action).await {
        Ok(()) => {
            info!(%zone, %device, ?action, "power action completed");
            let message = match action {
                PowerAction::Wake => "Wake command sent",
                PowerAction::Sleep => "Sleep command sent",
            };
            (StatusCode::OK, message).into_response()
        }
        Err(ZoneError::UnknownDevice(_)) => not_found("device", &device),
        Err(ZoneError::Device(DeviceError::Transport(e))) => {
            warn!(%zone, %device, ?action, error = %e, "power action failed");
            (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
        }
        Err(e @ (ZoneError::Unavailable | ZoneError::Device(DeviceError::Unavailable))) => {
            error!(%zone, %device, error = %e, "zone is not running");
            (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response()
        }
    }
}
