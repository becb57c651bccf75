//! Bounded execution of external programs.
//!
//! Every command based transport operation (ssh, ping, net rpc) goes through [`run`],
//! which never waits longer than the given limit and kills the child when it gives up.

use core::time::Duration;
use std::process::{ExitStatus, Stdio};

use tokio::{process::Command, time::timeout};
use tracing::debug;

use crate::TransportError;

/// Captured result of a finished process.
#[derive(Debug)]
pub(crate) struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

/// Stderr fragments that mean the remote side rejected our credentials.
const AUTH_FAILURE_MARKERS: &[&str] = &[
    "Permission denied",
    "NT_STATUS_LOGON_FAILURE",
    "NT_STATUS_ACCESS_DENIED",
];

/// Stderr fragments that mean nothing was listening on the remote side.
const REFUSED_MARKERS: &[&str] = &["Connection refused", "NT_STATUS_CONNECTION_REFUSED"];

/// Exit code `sshpass` uses for a rejected password.
const SSHPASS_BAD_PASSWORD: i32 = 5;

/// Spawns `command` and waits for it to exit, at most `limit`.
///
/// # Errors
///
/// [`TransportError::Spawn`] if the program cannot be started or waited on,
/// [`TransportError::Timeout`] if it runs longer than `limit`.
pub(crate) async fn run(
    mut command: Command,
    limit: Duration,
) -> Result<ProcessOutput, TransportError> {
    let program = command
        .as_std()
        .get_program()
        .to_string_lossy()
        .into_owned();

    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command.spawn().map_err(|source| TransportError::Spawn {
        program: program.clone(),
        source,
    })?;

    match timeout(limit, child.wait_with_output()).await {
        Ok(Ok(output)) => {
            debug!(%program, status = %output.status, "process finished");
            Ok(ProcessOutput {
                status: output.status,
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
        Ok(Err(source)) => Err(TransportError::Spawn { program, source }),
        // dropping the wait future drops the child, which kills it
        Err(_elapsed) => Err(TransportError::Timeout {
            program,
            timeout: limit,
        }),
    }
}

/// Like [`run`], but turns a non-zero exit into a classified error.
///
/// # Errors
///
/// Everything [`run`] returns, plus [`TransportError::AuthenticationFailed`],
/// [`TransportError::ConnectionRefused`] or [`TransportError::CommandFailed`] for
/// unsuccessful exits.
pub(crate) async fn run_checked(
    command: Command,
    limit: Duration,
    host: &str,
) -> Result<String, TransportError> {
    let program = command
        .as_std()
        .get_program()
        .to_string_lossy()
        .into_owned();
    let output = run(command, limit).await?;
    if output.status.success() {
        Ok(output.stdout)
    } else {
        Err(classify_failure(program, host, &output))
    }
}

pub(crate) fn classify_failure(
    program: String,
    host: &str,
    output: &ProcessOutput,
) -> TransportError {
    let code = output.status.code();
    let stderr = output.stderr.trim();

    if (program == "sshpass" && code == Some(SSHPASS_BAD_PASSWORD))
        || AUTH_FAILURE_MARKERS.iter().any(|m| stderr.contains(m))
    {
        TransportError::AuthenticationFailed {
            host: host.to_owned(),
        }
    } else if REFUSED_MARKERS.iter().any(|m| stderr.contains(m)) {
        TransportError::ConnectionRefused {
            host: host.to_owned(),
        }
    } else {
        TransportError::CommandFailed {
            program,
            code,
            stderr: stderr.to_owned(),
        }
    }
}
