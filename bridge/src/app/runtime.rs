//! Spawning the device and zone tasks described by the validated configuration.

use std::collections::BTreeMap;

use tracing::info;

use crate::{config::ZoneSpec, device::DeviceHandle, scheduler::RepeatingTask, zone::ZoneHandle};

/// Spawns every zone with its devices and starts its periodic polling.
///
/// The returned pollers stop when dropped.
#[must_use]
pub fn spawn_zones(specs: Vec<ZoneSpec>) -> (BTreeMap<String, ZoneHandle>, Vec<RepeatingTask>) {
    let mut zones = BTreeMap::new();
    let mut pollers = Vec::with_capacity(specs.len());

    for spec in specs {
        let devices: Vec<DeviceHandle> = spec
            .devices
            .into_iter()
            .map(|d| {
                info!(
                    zone = %spec.name,
                    device = %d.name,
                    host = d.transport.host(),
                    family = ?d.transport.family(),
                    "starting device"
                );
                DeviceHandle::spawn(&d.name, d.transport, d.grace)
            })
            .collect();

        info!(
            zone = %spec.name,
            devices = devices.len(),
            interval = ?spec.policy.interval,
            changes_for_trigger = spec.policy.changes_for_trigger,
            "starting zone"
        );
        let zone = ZoneHandle::spawn(&spec.name, spec.policy, devices);
        pollers.push(zone.start_polling());
        zones.insert(spec.name, zone);
    }

    (zones, pollers)
}
