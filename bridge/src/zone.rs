//! Zone aggregation: OR over the devices of a zone, debounced before it is published.

use alloc::sync::Arc;
use core::time::Duration;

use futures::future;
use serde::Serialize;
use thiserror::Error as ThisError;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{Instrument as _, debug, info, info_span, warn};

use crate::{
    device::{DeviceError, DeviceHandle, PowerAction},
    scheduler::RepeatingTask,
};

const COMMAND_QUEUE_DEPTH: usize = 16;

/// Polling policy of a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZonePolicy {
    pub interval: Duration,
    /// Consecutive disagreeing polls needed before the published state flips.
    pub changes_for_trigger: u32,
}

/// The published zone state, consumed as two complementary indicators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ZoneSignal {
    pub awake: bool,
    pub asleep: bool,
}

impl ZoneSignal {
    #[must_use]
    pub const fn from_powered(powered: bool) -> Self {
        Self {
            awake: powered,
            asleep: !powered,
        }
    }
}

/// Change-count hysteresis.
///
/// `changes` counts polls that disagreed with the published state. It is only reset
/// when a value is published, so a poll agreeing with the published state does not
/// clear the count.
#[derive(Debug, Clone)]
pub struct Debouncer {
    current_state: bool,
    changes: u32,
    changes_for_trigger: u32,
}

impl Debouncer {
    #[must_use]
    pub const fn new(changes_for_trigger: u32) -> Self {
        Self {
            current_state: false,
            changes: 0,
            changes_for_trigger,
        }
    }

    #[must_use]
    pub const fn current_state(&self) -> bool {
        self.current_state
    }

    /// Feeds one aggregate result; returns the value to publish, if any.
    pub fn observe(&mut self, is_on: bool, immediate: bool) -> Option<bool> {
        if is_on != self.current_state {
            self.changes = self.changes.saturating_add(1);
            debug!(
                "{} of {} required state changes",
                self.changes, self.changes_for_trigger
            );
        }

        if immediate || self.changes >= self.changes_for_trigger {
            self.current_state = is_on;
            self.changes = 0;
            Some(is_on)
        } else {
            None
        }
    }
}

#[derive(Debug, ThisError)]
pub enum ZoneError {
    #[error("no device named {0:?} in this zone")]
    UnknownDevice(String),
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("zone worker is no longer running")]
    Unavailable,
}

#[derive(Debug)]
enum ZoneCommand {
    Poll {
        immediate: bool,
        done: oneshot::Sender<bool>,
    },
    SetPower {
        device: String,
        action: PowerAction,
        reply: oneshot::Sender<Result<(), ZoneError>>,
    },
}

/// Cloneable handle to a running zone worker.
///
/// Periodic polls and user actions are funneled through the same queue, so at most
/// one poll round of a zone is in progress at any time.
#[derive(Debug, Clone)]
pub struct ZoneHandle {
    name: Arc<str>,
    policy: ZonePolicy,
    devices: Arc<[DeviceHandle]>,
    commands: mpsc::Sender<ZoneCommand>,
    signal: watch::Receiver<ZoneSignal>,
}

impl ZoneHandle {
    pub fn spawn(name: &str, policy: ZonePolicy, devices: Vec<DeviceHandle>) -> Self {
        let name: Arc<str> = Arc::from(name);
        let devices: Arc<[DeviceHandle]> = devices.into();
        let (commands, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let (signal_tx, signal) = watch::channel(ZoneSignal::from_powered(false));

        let worker = ZoneWorker {
            devices: Arc::clone(&devices),
            debouncer: Debouncer::new(policy.changes_for_trigger),
            signal_tx,
        };
        tokio::spawn(worker.run(rx).instrument(info_span!("zone", name = %name)));

        Self {
            name,
            policy,
            devices,
            commands,
            signal,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn policy(&self) -> ZonePolicy {
        self.policy
    }

    #[must_use]
    pub fn devices(&self) -> &[DeviceHandle] {
        &self.devices
    }

    #[must_use]
    pub fn device(&self, name: &str) -> Option<&DeviceHandle> {
        self.devices.iter().find(|d| d.name() == name)
    }

    /// Last published signal.
    #[must_use]
    pub fn signal(&self) -> ZoneSignal {
        *self.signal.borrow()
    }

    /// Runs one debounced poll round and returns the raw aggregate of that round.
    ///
    /// # Errors
    ///
    /// [`ZoneError::Unavailable`] if the worker stopped.
    pub async fn poll(&self) -> Result<bool, ZoneError> {
        let (done, rx) = oneshot::channel();
        self.commands
            .send(ZoneCommand::Poll {
                immediate: false,
                done,
            })
            .await
            .map_err(|_| ZoneError::Unavailable)?;
        rx.await.map_err(|_| ZoneError::Unavailable)
    }

    /// Wakes or sleeps one device of the zone and publishes the zone state immediately.
    ///
    /// # Errors
    ///
    /// Unknown device, the transport failure, or [`ZoneError::Unavailable`].
    pub async fn set_power(&self, device: &str, action: PowerAction) -> Result<(), ZoneError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(ZoneCommand::SetPower {
                device: device.to_owned(),
                action,
                reply,
            })
            .await
            .map_err(|_| ZoneError::Unavailable)?;
        rx.await.map_err(|_| ZoneError::Unavailable)?
    }

    /// Starts periodic polling at the zone's interval.
    #[must_use = "dropping the task stops polling"]
    pub fn start_polling(&self) -> RepeatingTask {
        let zone = self.clone();
        RepeatingTask::spawn(self.policy.interval, move || {
            let zone = zone.clone();
            async move {
                if let Err(e) = zone.poll().await {
                    warn!(zone = zone.name(), error = %e, "periodic poll failed");
                }
            }
        })
    }
}

struct ZoneWorker {
    devices: Arc<[DeviceHandle]>,
    debouncer: Debouncer,
    signal_tx: watch::Sender<ZoneSignal>,
}

impl ZoneWorker {
    async fn run(mut self, mut commands: mpsc::Receiver<ZoneCommand>) {
        while let Some(command) = commands.recv().await {
            match command {
                ZoneCommand::Poll { immediate, done } => {
                    let is_on = self.poll_round(immediate).await;
                    if done.send(is_on).is_err() {
                        debug!("poll requester went away");
                    }
                }
                ZoneCommand::SetPower {
                    device,
                    action,
                    reply,
                } => {
                    let result = self.set_power(&device, action).await;
                    if reply.send(result).is_err() {
                        debug!("set power requester went away");
                    }
                }
            }
        }
        debug!("all handles dropped, zone worker exiting");
    }

    async fn poll_round(&mut self, immediate: bool) -> bool {
        let states = future::join_all(self.devices.iter().map(|device| async move {
            match device.status(false).await {
                Ok(powered) => powered,
                Err(e) => {
                    warn!(device = device.name(), error = %e, "status check failed, using cached state");
                    device.cached()
                }
            }
        }))
        .await;
        let is_on = states.into_iter().any(core::convert::identity);

        if let Some(published) = self.debouncer.observe(is_on, immediate) {
            let signal = ZoneSignal::from_powered(published);
            let previous = self.signal_tx.send_replace(signal);
            if previous == signal {
                debug!(awake = published, immediate, "republished zone state");
            } else {
                info!(awake = published, immediate, "zone state changed");
            }
        }
        is_on
    }

    async fn set_power(&mut self, name: &str, action: PowerAction) -> Result<(), ZoneError> {
        let device = self
            .devices
            .iter()
            .find(|d| d.name() == name)
            .cloned()
            .ok_or_else(|| ZoneError::UnknownDevice(name.to_owned()))?;

        let target = action.target_state();
        match device.status(false).await {
            Ok(powered) if powered == target => {
                info!(device = name, ?action, "device already in requested state");
                return Ok(());
            }
            Ok(_) => {}
            Err(e) => {
                warn!(device = name, error = %e, "status check before {action:?} failed, sending anyway");
            }
        }

        let pending = device.begin(action).await?;
        self.poll_round(true).await;
        pending.finish().await.map_err(ZoneError::from)
    }
}
