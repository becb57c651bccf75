//! Per-device power state machine.
//!
//! Every device runs as its own task owning the last known state, the suspend phase
//! and the grace deadline. [`DeviceHandle`]s talk to it through a command queue, so
//! probes and actuation of one device are serialized. The task publishes a
//! [`DeviceSnapshot`] on a watch channel, which is what cached reads are served from.
//!
//! ```text
//! Idle --probe--> Idle                      (probe failure keeps the cached value)
//! Idle --wake/sleep--> Suspended            (optimistic state applied first)
//! Suspended --command ok--> Suspended + grace deadline (re-armed, never stacked)
//! Suspended --command failed--> Idle
//! Suspended --grace deadline--> Idle
//! ```

use alloc::sync::Arc;
use core::{future, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;
use tokio::{
    sync::{mpsc, oneshot, watch},
    time::{Instant, sleep_until},
};
use tracing::{Instrument as _, debug, info, info_span, warn};

use wolzone_transport::{PowerTransport, TransportError};

const COMMAND_QUEUE_DEPTH: usize = 8;

/// Deadline used when a grace time does not fit into an [`Instant`], roughly 30 years out.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// A user initiated power transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerAction {
    Wake,
    Sleep,
}

impl PowerAction {
    /// The power state the device is expected to end up in.
    #[must_use]
    pub const fn target_state(self) -> bool {
        matches!(self, Self::Wake)
    }
}

/// Whether probe results are currently trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePhase {
    Idle,
    /// A command is in flight or its grace period has not elapsed yet.
    Suspended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceSnapshot {
    pub powered: bool,
    pub phase: DevicePhase,
}

/// How long probe results are distrusted after a successful command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraceTimes {
    pub wake: Duration,
    pub shutdown: Duration,
}

impl GraceTimes {
    const fn after(self, action: PowerAction) -> Duration {
        match action {
            PowerAction::Wake => self.wake,
            PowerAction::Sleep => self.shutdown,
        }
    }
}

#[derive(Debug, ThisError)]
pub enum DeviceError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("device task is no longer running")]
    Unavailable,
}

enum DeviceCommand {
    Probe {
        reply: oneshot::Sender<Result<bool, TransportError>>,
    },
    Actuate {
        action: PowerAction,
        accepted: oneshot::Sender<()>,
        reply: oneshot::Sender<Result<(), TransportError>>,
    },
}

/// Cloneable handle to a running device task.
#[derive(Debug, Clone)]
pub struct DeviceHandle {
    name: Arc<str>,
    commands: mpsc::Sender<DeviceCommand>,
    snapshot: watch::Receiver<DeviceSnapshot>,
}

impl core::fmt::Debug for DeviceCommand {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match *self {
            Self::Probe { .. } => f.write_str("Probe"),
            Self::Actuate { action, .. } => write!(f, "Actuate({action:?})"),
        }
    }
}

/// An actuation whose optimistic state is applied but whose command may still be in flight.
#[derive(Debug)]
#[must_use = "the command result is only observed through `finish`"]
pub struct PendingAction {
    action: PowerAction,
    reply: oneshot::Receiver<Result<(), TransportError>>,
}

impl PendingAction {
    #[must_use]
    pub const fn action(&self) -> PowerAction {
        self.action
    }

    /// Waits for the transport command to complete.
    ///
    /// # Errors
    ///
    /// The transport failure, or [`DeviceError::Unavailable`] if the device task stopped.
    pub async fn finish(self) -> Result<(), DeviceError> {
        self.reply
            .await
            .map_err(|_| DeviceError::Unavailable)?
            .map_err(DeviceError::from)
    }
}

impl DeviceHandle {
    /// Spawns the device task. The initial state is "off" and `Idle`.
    pub fn spawn<T: PowerTransport>(name: &str, transport: T, grace: GraceTimes) -> Self {
        let name: Arc<str> = Arc::from(name);
        let (commands, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let (snapshot_tx, snapshot) = watch::channel(DeviceSnapshot {
            powered: false,
            phase: DevicePhase::Idle,
        });

        let actor = DeviceActor {
            transport,
            grace,
            powered: false,
            phase: DevicePhase::Idle,
            grace_deadline: None,
            snapshot_tx,
        };
        tokio::spawn(actor.run(rx).instrument(info_span!("device", name = %name)));

        Self {
            name,
            commands,
            snapshot,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn snapshot(&self) -> DeviceSnapshot {
        *self.snapshot.borrow()
    }

    /// Last known power state, without any I/O.
    #[must_use]
    pub fn cached(&self) -> bool {
        self.snapshot.borrow().powered
    }

    /// Current power state.
    ///
    /// With `from_cache`, or while the device is suspended, this returns the cached
    /// state and never touches the transport. Otherwise the device is probed.
    ///
    /// # Errors
    ///
    /// A failed probe (the cached state stays as it was), or [`DeviceError::Unavailable`].
    pub async fn status(&self, from_cache: bool) -> Result<bool, DeviceError> {
        let snapshot = self.snapshot();
        if from_cache || snapshot.phase == DevicePhase::Suspended {
            return Ok(snapshot.powered);
        }

        let (reply, rx) = oneshot::channel();
        self.commands
            .send(DeviceCommand::Probe { reply })
            .await
            .map_err(|_| DeviceError::Unavailable)?;
        rx.await
            .map_err(|_| DeviceError::Unavailable)?
            .map_err(DeviceError::from)
    }

    /// Starts `action`: returns as soon as the optimistic state is visible.
    ///
    /// # Errors
    ///
    /// [`DeviceError::Unavailable`] if the device task stopped.
    pub async fn begin(&self, action: PowerAction) -> Result<PendingAction, DeviceError> {
        let (accepted, accepted_rx) = oneshot::channel();
        let (reply, reply_rx) = oneshot::channel();
        self.commands
            .send(DeviceCommand::Actuate {
                action,
                accepted,
                reply,
            })
            .await
            .map_err(|_| DeviceError::Unavailable)?;
        accepted_rx.await.map_err(|_| DeviceError::Unavailable)?;
        Ok(PendingAction {
            action,
            reply: reply_rx,
        })
    }

    /// # Errors
    ///
    /// The transport failure; the device resumes probing immediately in that case.
    pub async fn wake(&self) -> Result<(), DeviceError> {
        self.begin(PowerAction::Wake).await?.finish().await
    }

    /// # Errors
    ///
    /// The transport failure; the device resumes probing immediately in that case.
    pub async fn sleep(&self) -> Result<(), DeviceError> {
        self.begin(PowerAction::Sleep).await?.finish().await
    }
}

struct DeviceActor<T> {
    transport: T,
    grace: GraceTimes,
    powered: bool,
    phase: DevicePhase,
    grace_deadline: Option<Instant>,
    snapshot_tx: watch::Sender<DeviceSnapshot>,
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => future::pending().await,
    }
}

impl<T: PowerTransport> DeviceActor<T> {
    async fn run(mut self, mut commands: mpsc::Receiver<DeviceCommand>) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
                () = wait_for(self.grace_deadline) => self.end_grace(),
            }
        }
        debug!("all handles dropped, device task exiting");
    }

    async fn handle(&mut self, command: DeviceCommand) {
        match command {
            DeviceCommand::Probe { reply } => {
                let result = self.probe().await;
                if reply.send(result).is_err() {
                    debug!("probe caller went away");
                }
            }
            DeviceCommand::Actuate {
                action,
                accepted,
                reply,
            } => {
                self.apply_optimistic(action);
                if accepted.send(()).is_err() {
                    debug!("actuation caller went away, sending command anyway");
                }
                let result = self.actuate(action).await;
                if reply.send(result).is_err() {
                    debug!("actuation caller went away");
                }
            }
        }
    }

    async fn probe(&mut self) -> Result<bool, TransportError> {
        // a concurrent actuation may have been queued before this probe ran
        if self.phase == DevicePhase::Suspended {
            return Ok(self.powered);
        }
        let powered = self.transport.probe().await?;
        if powered != self.powered {
            debug!(powered, "probed state changed");
        }
        self.powered = powered;
        self.publish();
        Ok(powered)
    }

    fn apply_optimistic(&mut self, action: PowerAction) {
        self.grace_deadline = None;
        self.phase = DevicePhase::Suspended;
        self.powered = action.target_state();
        self.publish();
    }

    async fn actuate(&mut self, action: PowerAction) -> Result<(), TransportError> {
        info!(?action, "sending power command");
        let result = match action {
            PowerAction::Wake => self.transport.send_wake().await,
            PowerAction::Sleep => self.transport.send_sleep().await,
        };

        match result {
            Ok(()) => {
                let grace = self.grace.after(action);
                debug!(?grace, "command accepted, grace period armed");
                let now = Instant::now();
                let deadline = now
                    .checked_add(grace)
                    .or_else(|| now.checked_add(FAR_FUTURE))
                    .unwrap_or(now);
                self.grace_deadline = Some(deadline);
            }
            Err(ref e) => {
                warn!(?action, error = %e, "power command failed, resuming probes");
                self.grace_deadline = None;
                self.phase = DevicePhase::Idle;
                self.publish();
            }
        }
        result
    }

    fn end_grace(&mut self) {
        debug!("grace period over");
        self.grace_deadline = None;
        self.phase = DevicePhase::Idle;
        self.publish();
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(DeviceSnapshot {
            powered: self.powered,
            phase: self.phase,
        });
    }
}
