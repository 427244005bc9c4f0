//! Async datagram channel abstraction.
//!
//! [`Channel`] is the transport boundary the sessions are written against: an
//! addressed, unordered, unreliable, possibly duplicating datagram primitive.
//! [`Socket`] is a thin wrapper around `tokio::net::UdpSocket` implementing it;
//! [`crate::simulator`] provides an in-memory, fault-injecting implementation
//! for tests.
//!
//! Channels move raw bytes. Encoding and decoding of RCMP packets happens in
//! the sessions so that malformed datagrams can be counted and skipped.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::UdpSocket;

/// An addressed datagram endpoint.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Hand one datagram to the transport. Success says nothing about delivery.
    async fn send_to(&self, buf: &[u8], dest: SocketAddr) -> io::Result<()>;

    /// Wait for the next datagram. A datagram longer than `buf` is truncated
    /// to `buf.len()` bytes, as with UDP.
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;
}

/// A UDP socket bound to a local address.
#[derive(Debug)]
pub struct Socket {
    /// Address this socket is bound to (filled in after OS assigns ephemeral port).
    pub local_addr: SocketAddr,
    inner: UdpSocket,
}

impl Socket {
    /// Bind a new socket to `local_addr`.
    ///
    /// Passing `0.0.0.0:0` lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr) -> io::Result<Self> {
        let inner = UdpSocket::bind(local_addr).await?;
        let local_addr = inner.local_addr()?;
        Ok(Self { local_addr, inner })
    }

    /// Bind an ephemeral port of the same address family as `peer`.
    pub async fn bind_for(peer: SocketAddr) -> io::Result<Self> {
        let any: SocketAddr = if peer.is_ipv4() {
            (std::net::Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        };
        Self::bind(any).await
    }
}

#[async_trait]
impl Channel for Socket {
    async fn send_to(&self, buf: &[u8], dest: SocketAddr) -> io::Result<()> {
        self.inner.send_to(buf, dest).await?;
        Ok(())
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.inner.recv_from(buf).await
    }
}

/// Pause after a transient receive error before asking the socket again.
pub(crate) const TRANSIENT_ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// Errors that say more about a previous datagram than about this socket,
/// e.g. an ICMP unreachable reported on a later call.
pub(crate) fn is_transient_io_error(e: &io::Error) -> bool {
    use io::ErrorKind;
    matches!(
        e.kind(),
        ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset | ErrorKind::Interrupted
    )
}
