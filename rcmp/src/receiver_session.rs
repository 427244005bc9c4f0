//! Receiver session: accepts data packets from a [`Channel`] and appends
//! in-order payloads to the output.
//!
//! The first datagram is awaited without a deadline so that a slow-starting
//! sender is never penalised; after the first data packet every receive is
//! bounded by the idle timeout. Acknowledgments answer the ack-request flag,
//! not successful delivery: a duplicate or future packet that asks for one
//! gets one, subject to the [`LossSimulator`].

use std::net::SocketAddr;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::{sleep, timeout};

use crate::config::ReceiverConfig;
use crate::error::TransferError;
use crate::loss::LossSimulator;
use crate::packet::{AckPacket, DataPacket, DATA_PACKET_LEN};
use crate::receiver::{Classification, ReceiverState};
use crate::socket::{is_transient_io_error, Channel, TRANSIENT_ERROR_BACKOFF};
use crate::state::{ReceiverPhase, Step};

/// Counters accumulated over one receive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiveReport {
    /// Connection id of the first data packet, once one arrived.
    pub connection_id: Option<u32>,
    pub bytes_written: u64,
    /// Well-formed data packets, whatever their classification.
    pub packets_received: u64,
    pub duplicates: u64,
    /// Packets ahead of the cursor, discarded.
    pub future: u64,
    /// Datagrams that did not decode as a data packet.
    pub malformed: u64,
    pub acks_sent: u64,
    /// Acknowledgments suppressed by the loss simulator.
    pub acks_withheld: u64,
    pub ack_send_failures: u64,
}

pub struct ReceiverSession<C, W> {
    channel: C,
    output: W,
    config: ReceiverConfig,
    state: ReceiverState,
    phase: ReceiverPhase,
    loss: LossSimulator,
    report: ReceiveReport,
}

impl<C, W> ReceiverSession<C, W>
where
    C: Channel,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(channel: C, output: W, config: ReceiverConfig) -> Result<Self, TransferError> {
        config.validate()?;
        let loss = LossSimulator::with_seed(config.ack_drop_probability, config.seed)?;
        Ok(Self {
            channel,
            output,
            config,
            state: ReceiverState::new(),
            phase: ReceiverPhase::default(),
            loss,
            report: ReceiveReport::default(),
        })
    }

    /// Replace the loss simulator built from the config.
    pub fn with_loss_simulator(mut self, loss: LossSimulator) -> Self {
        self.loss = loss;
        self
    }

    pub fn phase(&self) -> ReceiverPhase {
        self.phase
    }

    pub fn state(&self) -> &ReceiverState {
        &self.state
    }

    pub fn report(&self) -> &ReceiveReport {
        &self.report
    }

    /// Hand back the channel and output.
    pub fn into_parts(self) -> (C, W) {
        (self.channel, self.output)
    }

    /// Receive until the stream is complete or the sender goes quiet.
    ///
    /// The output is flushed on every exit path.
    pub async fn run(&mut self) -> Result<ReceiveReport, TransferError> {
        let outcome = self.drive().await;
        let flushed = self.output.flush().await;
        match (outcome, flushed) {
            (Err(e), _) => Err(e),
            (Ok(_), Err(e)) => Err(e.into()),
            (Ok(()), Ok(())) => Ok(self.report.clone()),
        }
    }

    async fn drive(&mut self) -> Result<(), TransferError> {
        loop {
            match self.step().await {
                Ok(Step::Continue) => {}
                Ok(Step::Finished) => {
                    self.set_phase(ReceiverPhase::Done);
                    log::info!(
                        "[rcmp:recv] reached end of expected data: \
                         {} bytes, {} duplicates, {} acks withheld",
                        self.report.bytes_written,
                        self.report.duplicates,
                        self.report.acks_withheld
                    );
                    return Ok(());
                }
                Err(e) => {
                    if matches!(e, TransferError::ReceiverIdleTimeout { .. }) {
                        self.set_phase(ReceiverPhase::IdleTimeoutAbort);
                    } else {
                        self.set_phase(ReceiverPhase::Aborted);
                    }
                    log::warn!("[rcmp:recv] aborted: {e}");
                    return Err(e);
                }
            }
        }
    }

    /// Receive, classify and answer one datagram.
    pub async fn step(&mut self) -> Result<Step, TransferError> {
        // One spare byte so an oversized datagram shows up as a length mismatch.
        let mut buf = vec![0u8; DATA_PACKET_LEN + 1];
        let (n, from) = match self.receive(&mut buf).await? {
            Some(received) => received,
            None => return Ok(Step::Continue),
        };

        let packet = match DataPacket::decode(&buf[..n]) {
            Ok(packet) => packet,
            Err(e) => {
                self.report.malformed += 1;
                log::warn!("[rcmp:recv] discarding datagram from {from}: {e}");
                return Ok(Step::Continue);
            }
        };
        self.report.packets_received += 1;
        self.note_connection(&packet, from);

        let mut finished = false;
        match self.state.classify(packet.seq) {
            Classification::Duplicate => {
                self.report.duplicates += 1;
                log::debug!("[rcmp:recv] ← DATA seq={} duplicate", packet.seq);
            }
            Classification::Future => {
                self.report.future += 1;
                log::debug!(
                    "[rcmp:recv] ← DATA seq={} ahead of expected {}, dropped",
                    packet.seq,
                    self.state.next_expected()
                );
            }
            Classification::InOrder => {
                let data = packet.valid_payload();
                self.output.write_all(data).await?;
                self.report.bytes_written += data.len() as u64;
                finished = self.state.record_write(&packet);
                log::debug!(
                    "[rcmp:recv] ← DATA seq={} wrote {} bytes{}",
                    packet.seq,
                    data.len(),
                    if finished { " (final)" } else { "" }
                );
            }
        }

        if packet.ack_requested {
            self.send_ack(&packet, from).await;
        }

        Ok(if finished { Step::Finished } else { Step::Continue })
    }

    /// One datagram; `None` when a transient socket error was swallowed.
    async fn receive(
        &mut self,
        buf: &mut [u8],
    ) -> Result<Option<(usize, SocketAddr)>, TransferError> {
        let received = if self.phase == ReceiverPhase::AwaitingFirstPacket {
            self.channel.recv_from(buf).await
        } else {
            let idle = self.config.idle_timeout;
            match timeout(idle, self.channel.recv_from(buf)).await {
                Ok(received) => received,
                Err(_elapsed) => return Err(TransferError::ReceiverIdleTimeout { idle }),
            }
        };
        match received {
            Ok(received) => Ok(Some(received)),
            Err(e) if is_transient_io_error(&e) => {
                log::warn!("[rcmp:recv] transient receive error: {e}");
                sleep(TRANSIENT_ERROR_BACKOFF).await;
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn set_phase(&mut self, next: ReceiverPhase) {
        if self.phase == next {
            return;
        }
        if next.is_terminal() {
            log::debug!("[rcmp:recv] phase {} → {next}", self.phase);
        } else {
            log::trace!("[rcmp:recv] phase {} → {next}", self.phase);
        }
        self.phase = next;
    }

    fn note_connection(&mut self, packet: &DataPacket, from: SocketAddr) {
        match self.report.connection_id {
            None => {
                self.report.connection_id = Some(packet.connection_id);
                self.set_phase(ReceiverPhase::Receiving);
                log::info!(
                    "[rcmp:recv] connection {} from {from}, expecting {} bytes",
                    packet.connection_id,
                    packet.total_size
                );
            }
            Some(id) if id != packet.connection_id => log::debug!(
                "[rcmp:recv] packet seq={} carries connection id {}, first packet had {id}",
                packet.seq,
                packet.connection_id
            ),
            Some(_) => {}
        }
    }

    /// Acknowledge `packet` unless the loss simulator withholds it.
    async fn send_ack(&mut self, packet: &DataPacket, to: SocketAddr) {
        if self.loss.should_withhold() {
            self.report.acks_withheld += 1;
            log::debug!("[rcmp:recv] withholding ACK seq={}", packet.seq);
            return;
        }
        let ack = AckPacket {
            connection_id: packet.connection_id,
            seq: packet.seq,
        };
        match self.channel.send_to(&ack.encode(), to).await {
            Ok(()) => {
                self.report.acks_sent += 1;
                log::debug!("[rcmp:recv] → ACK seq={}", ack.seq);
            }
            Err(e) => {
                self.report.ack_send_failures += 1;
                log::warn!("[rcmp:recv] error while sending ACK seq={}: {e}", ack.seq);
            }
        }
    }
}
