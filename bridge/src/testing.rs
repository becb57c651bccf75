//! Scriptable in-memory transport for unit tests.

use alloc::{collections::VecDeque, sync::Arc};
use core::time::Duration;
use std::sync::Mutex;

use tokio::time::sleep;
use wolzone_transport::{PowerTransport, TransportError};

#[derive(Debug, Default)]
struct Script {
    powered: bool,
    queued_probes: VecDeque<Result<bool, TransportError>>,
    fail_commands: bool,
    command_delay: Duration,
    probes: usize,
    sleeps: usize,
    wakes: usize,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ScriptedTransport(Arc<Mutex<Script>>);

fn refused() -> TransportError {
    TransportError::ConnectionRefused {
        host: "scripted".to_owned(),
    }
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// What probes report once the queued results are used up.
    pub(crate) fn set_powered(&self, powered: bool) {
        self.0.lock().unwrap().powered = powered;
    }

    pub(crate) fn push_probe_failure(&self) {
        self.0.lock().unwrap().queued_probes.push_back(Err(refused()));
    }

    pub(crate) fn fail_commands(&self, fail: bool) {
        self.0.lock().unwrap().fail_commands = fail;
    }

    pub(crate) fn delay_commands(&self, delay: Duration) {
        self.0.lock().unwrap().command_delay = delay;
    }

    pub(crate) fn probes(&self) -> usize {
        self.0.lock().unwrap().probes
    }

    pub(crate) fn sleeps(&self) -> usize {
        self.0.lock().unwrap().sleeps
    }

    pub(crate) fn wakes(&self) -> usize {
        self.0.lock().unwrap().wakes
    }

    async fn command(&self, record: impl FnOnce(&mut Script)) -> Result<(), TransportError> {
        let (delay, fail) = {
            let mut script = self.0.lock().unwrap();
            record(&mut script);
            (script.command_delay, script.fail_commands)
        };
        sleep(delay).await;
        if fail { Err(refused()) } else { Ok(()) }
    }
}

impl PowerTransport for ScriptedTransport {
    async fn probe(&self) -> Result<bool, TransportError> {
        let mut script = self.0.lock().unwrap();
        script.probes += 1;
        let fallback = script.powered;
        script.queued_probes.pop_front().unwrap_or(Ok(fallback))
    }

    async fn send_sleep(&self) -> Result<(), TransportError> {
        self.command(|s| s.sleeps += 1).await
    }

    async fn send_wake(&self) -> Result<(), TransportError> {
        self.command(|s| s.wakes += 1).await
    }
}
