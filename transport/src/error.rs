//! Error taxonomy shared by all transport providers.

use core::time::Duration;
use std::io;

use thiserror::Error as ThisError;

/// Failure of a single transport operation.
///
/// None of these mean "the host is off". A failed probe leaves the state unknown,
/// a failed sleep/wake means the command was not accepted or could not be delivered.
#[derive(Debug, ThisError)]
pub enum TransportError {
    #[error("`{program}` did not finish within {timeout:?}")]
    Timeout {
        program: String,
        timeout: Duration,
    },
    #[error("failed to spawn `{program}`")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("connection to {host} refused")]
    ConnectionRefused { host: String },
    #[error("authentication against {host} failed")]
    AuthenticationFailed { host: String },
    #[error("`{program}` exited with {code:?}: {stderr}")]
    CommandFailed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("unexpected status output: {0:?}")]
    UnexpectedOutput(String),
    #[error("failed to send magic packet")]
    MagicPacket(#[source] io::Error),
}

impl TransportError {
    /// Whether this error is the result of exceeding an operation timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(*self, Self::Timeout { .. })
    }
}
