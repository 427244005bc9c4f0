//! In-memory network simulator for deterministic testing.
//!
//! Real networks drop, reorder, and duplicate packets. To exercise the
//! reliability mechanisms without depending on actual network conditions,
//! [`link`] builds a pair of connected [`SimChannel`] endpoints that
//! implement [`Channel`] and apply a configurable fault model per direction:
//!
//! | Fault            | Description                                      |
//! |------------------|--------------------------------------------------|
//! | Packet loss      | Drop a datagram with probability `loss_rate`.    |
//! | Duplication      | Deliver a datagram twice.                        |
//! | Reordering       | Hold a datagram back until the next one has been |
//! |                  | delivered, letting it overtake.                  |
//!
//! All randomness comes from a seeded `StdRng`, so a failing run can be
//! replayed exactly. Queues are unbounded tokio channels; combined with a
//! paused tokio clock, timeout-driven tests run instantly.
//!
//! When one endpoint is dropped the other simply stops hearing anything, as a
//! datagram socket would.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{mpsc, Mutex};

use crate::socket::Channel;

/// Fault-injection model for one direction of a link.
///
/// All probabilities are in the range `[0.0, 1.0]`; values outside it are clamped.
#[derive(Debug, Clone, Default)]
pub struct FaultModel {
    /// Probability that any given datagram is silently dropped.
    pub loss_rate: f64,
    /// Probability that a datagram is delivered twice.
    pub duplicate_rate: f64,
    /// Probability that a datagram is held back behind the next one.
    pub reorder_rate: f64,
}

impl FaultModel {
    /// A transparent pass-through.
    pub fn perfect() -> Self {
        Self::default()
    }

    pub fn lossy(loss_rate: f64) -> Self {
        Self {
            loss_rate,
            ..Self::default()
        }
    }
}

/// Build two connected endpoints at `a_addr` and `b_addr`.
///
/// `a_to_b` governs datagrams sent by the first endpoint, `b_to_a` those sent
/// by the second.
pub fn link(
    a_addr: SocketAddr,
    b_addr: SocketAddr,
    a_to_b: FaultModel,
    b_to_a: FaultModel,
    seed: u64,
) -> (SimChannel, SimChannel) {
    let (to_b, from_a) = mpsc::unbounded_channel();
    let (to_a, from_b) = mpsc::unbounded_channel();
    let a = SimChannel::new(a_addr, b_addr, a_to_b, to_b, from_b, seed);
    let b = SimChannel::new(b_addr, a_addr, b_to_a, to_a, from_a, seed.wrapping_add(1));
    (a, b)
}

/// One end of a simulated link.
#[derive(Debug)]
pub struct SimChannel {
    pub local_addr: SocketAddr,
    peer_addr: SocketAddr,
    faults: FaultModel,
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    outbound: Mutex<Outbound>,
    sent: AtomicUsize,
}

#[derive(Debug)]
struct Outbound {
    rng: StdRng,
    /// Datagram waiting to be overtaken.
    held: Option<Vec<u8>>,
}

impl SimChannel {
    fn new(
        local_addr: SocketAddr,
        peer_addr: SocketAddr,
        faults: FaultModel,
        tx: mpsc::UnboundedSender<Vec<u8>>,
        rx: mpsc::UnboundedReceiver<Vec<u8>>,
        seed: u64,
    ) -> Self {
        Self {
            local_addr,
            peer_addr,
            faults,
            tx,
            rx: Mutex::new(rx),
            outbound: Mutex::new(Outbound {
                rng: StdRng::seed_from_u64(seed),
                held: None,
            }),
            sent: AtomicUsize::new(0),
        }
    }

    /// Number of datagrams handed to [`Channel::send_to`], delivered or not.
    pub fn sent_count(&self) -> usize {
        self.sent.load(Ordering::Relaxed)
    }

    fn deliver(&self, datagram: Vec<u8>) {
        // The peer may be gone; like UDP, sending still "succeeds".
        let _ = self.tx.send(datagram);
    }
}

fn chance(rng: &mut StdRng, p: f64) -> bool {
    let p = p.clamp(0.0, 1.0);
    p > 0.0 && rng.random_bool(p)
}

#[async_trait]
impl Channel for SimChannel {
    async fn send_to(&self, buf: &[u8], _dest: SocketAddr) -> io::Result<()> {
        self.sent.fetch_add(1, Ordering::Relaxed);
        let mut out = self.outbound.lock().await;

        if chance(&mut out.rng, self.faults.loss_rate) {
            log::trace!("[sim] {} dropped {} bytes", self.local_addr, buf.len());
            return Ok(());
        }
        let copies = if chance(&mut out.rng, self.faults.duplicate_rate) { 2 } else { 1 };
        if out.held.is_none() && chance(&mut out.rng, self.faults.reorder_rate) {
            log::trace!("[sim] {} holding back {} bytes", self.local_addr, buf.len());
            out.held = Some(buf.to_vec());
            return Ok(());
        }

        for _ in 0..copies {
            self.deliver(buf.to_vec());
        }
        if let Some(held) = out.held.take() {
            self.deliver(held);
        }
        Ok(())
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let mut rx = self.rx.lock().await;
        match rx.recv().await {
            Some(datagram) => {
                let n = datagram.len().min(buf.len());
                buf[..n].copy_from_slice(&datagram[..n]);
                Ok((n, self.peer_addr))
            }
            None => std::future::pending().await,
        }
    }
}
