//! Sender session: reads the file chunk by chunk and drives it across a
//! [`Channel`].
//!
//! ```text
//!   file ──next_chunk──▶ DataPacket ──transmit──▶ channel
//!                             ▲                      │ ack (if requested)
//!                             │ rewind on timeout    ▼
//!                        SenderState ◀───await_ack───┘
//! ```
//!
//! Transmission is unthrottled: the session only pauses while it waits for
//! an acknowledgment it asked for. A timeout rewinds both the sequence cursor
//! and the file cursor to the last acknowledged chunk (go back N).

use std::io::SeekFrom;
use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};
use tokio::time::{sleep_until, timeout_at, Instant};

use rand::Rng;

use crate::config::SenderConfig;
use crate::error::TransferError;
use crate::packet::{AckPacket, DataPacket, ACK_PACKET_LEN, CHUNK_SIZE};
use crate::sender::{Recovery, SenderState};
use crate::socket::{is_transient_io_error, Channel, TRANSIENT_ERROR_BACKOFF};
use crate::state::{SenderPhase, Step};

/// Counters accumulated over one send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendReport {
    /// Declared size of the file.
    pub total_size: u32,
    /// Data packets handed to the channel, retransmissions included.
    pub packets_sent: u64,
    /// Packets carrying a sequence number that had been sent before.
    pub retransmissions: u64,
    pub acks_received: u64,
    /// Acknowledgments discarded by validation.
    pub acks_ignored: u64,
    pub timeouts: u64,
    /// Local send failures (never fatal).
    pub send_failures: u64,
    /// Datagrams that were not a well-formed acknowledgment.
    pub malformed: u64,
    /// Receive errors seen while awaiting acknowledgments.
    pub recv_errors: u64,
}

pub struct SenderSession<C, F> {
    channel: C,
    peer: SocketAddr,
    file: F,
    config: SenderConfig,
    connection_id: u32,
    total_size: u32,
    state: SenderState,
    phase: SenderPhase,
    /// First sequence number never sent so far.
    high_water: u32,
    report: SendReport,
}

impl<C, F> SenderSession<C, F>
where
    C: Channel,
    F: AsyncRead + AsyncSeek + Unpin + Send,
{
    /// Prepare to send `file` (of `file_len` bytes) to `peer`.
    ///
    /// The connection id is drawn at random from `1..=15`.
    pub fn new(
        channel: C,
        peer: SocketAddr,
        file: F,
        file_len: u64,
        config: SenderConfig,
    ) -> Result<Self, TransferError> {
        config.validate()?;
        let total_size =
            u32::try_from(file_len).map_err(|_| TransferError::FileTooLarge { len: file_len })?;
        let connection_id = rand::rng().random_range(1..=15);
        log::debug!("[rcmp:send] connection_id={connection_id} total_size={total_size}");
        Ok(Self {
            channel,
            peer,
            file,
            state: SenderState::new(config.max_consecutive_timeouts),
            config,
            connection_id,
            total_size,
            phase: SenderPhase::default(),
            high_water: 0,
            report: SendReport {
                total_size,
                ..SendReport::default()
            },
        })
    }

    /// Override the random connection id.
    pub fn with_connection_id(mut self, connection_id: u32) -> Self {
        self.connection_id = connection_id;
        self
    }

    pub fn connection_id(&self) -> u32 {
        self.connection_id
    }

    pub fn phase(&self) -> SenderPhase {
        self.phase
    }

    pub fn state(&self) -> &SenderState {
        &self.state
    }

    pub fn report(&self) -> &SendReport {
        &self.report
    }

    /// Hand back the channel and file.
    pub fn into_parts(self) -> (C, F) {
        (self.channel, self.file)
    }

    /// Drive the transfer to completion.
    pub async fn run(&mut self) -> Result<SendReport, TransferError> {
        loop {
            match self.step().await {
                Ok(Step::Continue) => {}
                Ok(Step::Finished) => {
                    self.set_phase(SenderPhase::Done);
                    log::info!(
                        "[rcmp:send] done: {} bytes, {} packets ({} retransmitted), {} timeouts",
                        self.total_size,
                        self.report.packets_sent,
                        self.report.retransmissions,
                        self.report.timeouts
                    );
                    return Ok(self.report.clone());
                }
                Err(e) => {
                    self.set_phase(SenderPhase::Aborted);
                    log::warn!("[rcmp:send] aborted: {e}");
                    return Err(e);
                }
            }
        }
    }

    /// Read, send and (when requested) confirm one chunk.
    pub async fn step(&mut self) -> Result<Step, TransferError> {
        self.set_phase(SenderPhase::Reading);
        let Some(chunk) = self.next_chunk().await? else {
            return Ok(Step::Finished);
        };

        let packet = DataPacket {
            connection_id: self.connection_id,
            total_size: self.total_size,
            seq: self.state.sequence(),
            ack_requested: self.state.should_request_ack(),
            payload: chunk,
        };
        self.set_phase(SenderPhase::Sending);
        self.transmit(&packet).await?;

        if packet.ack_requested {
            self.set_phase(SenderPhase::AwaitingAck);
            self.await_ack().await?;
        }
        Ok(Step::Continue)
    }

    /// Read up to one chunk at the file cursor; `None` at end of file.
    ///
    /// An empty file still produces one empty chunk so that the receiver
    /// learns the transfer is complete.
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, TransferError> {
        let mut chunk = vec![0u8; CHUNK_SIZE];
        let mut filled = 0;
        while filled < CHUNK_SIZE {
            let n = self.file.read(&mut chunk[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled == 0 && !(self.total_size == 0 && self.state.sequence() == 0) {
            return Ok(None);
        }
        chunk.truncate(filled);
        Ok(Some(chunk))
    }

    /// Best-effort send. A local failure is logged and counted; the packet is
    /// then simply lost, and recovery happens through the ack timeout.
    async fn transmit(&mut self, packet: &DataPacket) -> Result<(), TransferError> {
        let bytes = packet.encode()?;
        match self.channel.send_to(&bytes, self.peer).await {
            Ok(()) => log::debug!(
                "[rcmp:send] → DATA seq={} len={} ack_requested={} gap={}",
                packet.seq,
                packet.payload.len(),
                packet.ack_requested,
                self.state.ack_gap()
            ),
            Err(e) => {
                self.report.send_failures += 1;
                log::warn!("[rcmp:send] error while transmitting seq={}: {e}", packet.seq);
            }
        }

        self.report.packets_sent += 1;
        if packet.seq < self.high_water {
            self.report.retransmissions += 1;
        } else {
            self.high_water = packet.seq + 1;
        }
        self.state.on_sent();
        Ok(())
    }

    /// Wait up to the ack timeout for one acknowledgment.
    async fn await_ack(&mut self) -> Result<(), TransferError> {
        let deadline = Instant::now() + self.config.ack_timeout;
        // One spare byte so an oversized datagram shows up as a length mismatch.
        let mut buf = [0u8; ACK_PACKET_LEN + 1];

        loop {
            let (n, from) = match timeout_at(deadline, self.channel.recv_from(&mut buf)).await {
                Err(_elapsed) => return self.recover().await,
                Ok(Err(e)) if is_transient_io_error(&e) => {
                    // Keep waiting for the same deadline; an ICMP error from an
                    // earlier datagram is not an answer.
                    self.report.recv_errors += 1;
                    log::debug!("[rcmp:send] transient receive error while awaiting ack: {e}");
                    sleep_until((Instant::now() + TRANSIENT_ERROR_BACKOFF).min(deadline)).await;
                    // timeout_at polls the receive before its timer, so an
                    // error that is always ready would never see the deadline.
                    if Instant::now() >= deadline {
                        return self.recover().await;
                    }
                    continue;
                }
                Ok(Err(e)) => {
                    self.report.recv_errors += 1;
                    log::warn!("[rcmp:send] receive error while awaiting ack: {e}");
                    return self.recover().await;
                }
                Ok(Ok(received)) => received,
            };

            let ack = match AckPacket::decode(&buf[..n]) {
                Ok(ack) => ack,
                Err(e) => {
                    self.report.malformed += 1;
                    log::warn!("[rcmp:send] discarding datagram from {from}: {e}");
                    continue;
                }
            };

            if self.config.validate_acks && !self.is_acceptable(&ack) {
                self.report.acks_ignored += 1;
                log::debug!(
                    "[rcmp:send] ← ACK seq={} conn={} ignored (expecting conn={} in [{}, {}))",
                    ack.seq,
                    ack.connection_id,
                    self.connection_id,
                    self.state.last_acked(),
                    self.state.sequence()
                );
                continue;
            }

            self.state.on_ack(ack.seq);
            self.report.acks_received += 1;
            log::debug!(
                "[rcmp:send] ← ACK seq={} conn={}; gap now {}",
                ack.seq,
                ack.connection_id,
                self.state.ack_gap()
            );
            return Ok(());
        }
    }

    fn set_phase(&mut self, next: SenderPhase) {
        if self.phase == next {
            return;
        }
        if next.is_terminal() {
            log::debug!("[rcmp:send] phase {} → {next}", self.phase);
        } else {
            log::trace!("[rcmp:send] phase {} → {next}", self.phase);
        }
        self.phase = next;
    }

    fn is_acceptable(&self, ack: &AckPacket) -> bool {
        ack.connection_id == self.connection_id && self.state.is_outstanding(ack.seq)
    }

    /// Timeout handling: rewind, or give up on the configured limit.
    async fn recover(&mut self) -> Result<(), TransferError> {
        self.set_phase(SenderPhase::Recovering);
        self.report.timeouts += 1;
        match self.state.on_timeout() {
            Recovery::GiveUp { timeouts } => Err(TransferError::ReceiverUnresponsive { timeouts }),
            Recovery::Rewind { seq, offset } => {
                log::info!(
                    "[rcmp:send] packet loss detected ({} in a row), retransmitting from seq={seq}",
                    self.state.consecutive_timeouts()
                );
                self.file.seek(SeekFrom::Start(offset)).await?;
                Ok(())
            }
        }
    }
}
