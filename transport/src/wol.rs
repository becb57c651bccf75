//! Wake-on-LAN: MAC address parsing and magic packet transmission.

use core::{
    fmt,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
    str::FromStr,
    time::Duration,
};

use thiserror::Error as ThisError;
use tokio::{net::UdpSocket, time::timeout};
use tracing::debug;

use crate::TransportError;

/// Default broadcast address magic packets are sent to.
pub const DEFAULT_BROADCAST: IpAddr = IpAddr::V4(Ipv4Addr::BROADCAST);

/// Upper bound for binding the socket and handing the datagram to the kernel.
pub const MAGIC_PACKET_TIMEOUT: Duration = Duration::from_secs(2);

/// UDP port of the "discard" service, which WOL capable NICs listen on.
const WOL_PORT: u16 = 9;

const PACKET_LEN: usize = 6 + 16 * 6;

#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
#[error("invalid MAC address {0:?}, expected six hex octets separated by ':' or '-'")]
pub struct MacParseError(pub String);

/// Hardware address of a wake target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    #[must_use]
    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// The 102 byte magic packet: six `0xFF` followed by the address repeated 16 times.
    #[must_use]
    pub fn magic_packet(&self) -> [u8; PACKET_LEN] {
        let mut packet = [0xFF_u8; PACKET_LEN];
        for chunk in packet.chunks_exact_mut(6).skip(1) {
            chunk.copy_from_slice(&self.0);
        }
        packet
    }
}

impl FromStr for MacAddress {
    type Err = MacParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || MacParseError(s.to_owned());
        let separator = if s.contains('-') { '-' } else { ':' };
        let parts: Vec<&str> = s.split(separator).collect();
        if parts.len() != 6 {
            return Err(err());
        }

        let mut octets = [0_u8; 6];
        for (octet, part) in octets.iter_mut().zip(parts) {
            hex::decode_to_slice(part, core::slice::from_mut(octet)).map_err(|_| err())?;
        }
        Ok(Self(octets))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

/// Broadcasts a magic packet for `mac` to `broadcast`:9.
///
/// Success only means the datagram left this machine.
///
/// # Errors
///
/// [`TransportError::MagicPacket`] if the socket cannot be bound, configured or written,
/// [`TransportError::Timeout`] if that takes longer than [`MAGIC_PACKET_TIMEOUT`].
pub async fn send_magic_packet(mac: MacAddress, broadcast: IpAddr) -> Result<(), TransportError> {
    let target = SocketAddr::new(broadcast, WOL_PORT);
    within(MAGIC_PACKET_TIMEOUT, send_magic_packet_to(mac, target)).await
}

async fn within(
    limit: Duration,
    send: impl Future<Output = Result<(), TransportError>>,
) -> Result<(), TransportError> {
    timeout(limit, send)
        .await
        .map_err(|_| TransportError::Timeout {
            program: "magic packet".to_owned(),
            timeout: limit,
        })?
}

async fn send_magic_packet_to(mac: MacAddress, target: SocketAddr) -> Result<(), TransportError> {
    let packet = mac.magic_packet();

    let local: SocketAddr = match target {
        SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    let socket = UdpSocket::bind(local)
        .await
        .map_err(TransportError::MagicPacket)?;
    socket
        .set_broadcast(true)
        .map_err(TransportError::MagicPacket)?;
    socket
        .send_to(&packet, target)
        .await
        .map_err(TransportError::MagicPacket)?;

    debug!(%mac, %target, "magic packet sent");
    Ok(())
}
