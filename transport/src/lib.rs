//! Transport providers that probe, sleep and wake remote machines.
//!
//! This crate provides:
//! - the [`PowerTransport`] contract every provider implements
//! - [`RemoteShell`] for hosts driven over ssh (macOS)
//! - [`LanBroadcast`] for ICMP + `net rpc` + Wake-on-LAN hosts (Windows)
//! - the tagged [`Transport`] variant that selects between them by [`OsFamily`]
//!
//! Every operation is bounded by a timeout; exceeding it is a [`TransportError`], never a hang.

extern crate alloc;
extern crate core;

mod error;
mod lan;
mod process;
mod remote_shell;
mod wol;

use core::future::Future;

pub use error::*;
pub use lan::*;
pub use remote_shell::*;
pub use wol::*;

/// Operations a device needs from whatever protocol reaches its physical host.
pub trait PowerTransport: Send + Sync + 'static {
    /// Whether the target currently appears powered on.
    ///
    /// An error means the state is unknown, not that the host is off.
    fn probe(&self) -> impl Future<Output = Result<bool, TransportError>> + Send;

    /// Issues the sleep/shutdown command. Success means it was accepted or transmitted,
    /// not that the host is already down.
    fn send_sleep(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Issues the wake mechanism of this family.
    fn send_wake(&self) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// Operating system family of a target, which determines its transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsFamily {
    Windows,
    MacOs,
}

/// A concrete provider, selected by the family tag of the device it serves.
#[derive(Debug, Clone)]
pub enum Transport {
    RemoteShell(RemoteShell),
    LanBroadcast(LanBroadcast),
}

impl Transport {
    #[must_use]
    pub const fn family(&self) -> OsFamily {
        match *self {
            Self::RemoteShell(_) => OsFamily::MacOs,
            Self::LanBroadcast(_) => OsFamily::Windows,
        }
    }

    #[must_use]
    pub fn host(&self) -> &str {
        match *self {
            Self::RemoteShell(ref t) => t.host(),
            Self::LanBroadcast(ref t) => t.host(),
        }
    }
}

impl PowerTransport for Transport {
    async fn probe(&self) -> Result<bool, TransportError> {
        match *self {
            Self::RemoteShell(ref t) => t.probe().await,
            Self::LanBroadcast(ref t) => t.probe().await,
        }
    }

    async fn send_sleep(&self) -> Result<(), TransportError> {
        match *self {
            Self::RemoteShell(ref t) => t.send_sleep().await,
            Self::LanBroadcast(ref t) => t.send_sleep().await,
        }
    }

    async fn send_wake(&self) -> Result<(), TransportError> {
        match *self {
            Self::RemoteShell(ref t) => t.send_wake().await,
            Self::LanBroadcast(ref t) => t.send_wake().await,
        }
    }
}
