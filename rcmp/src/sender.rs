//! Send-side protocol state: ack-request policy and go-back-N recovery.
//!
//! [`SenderState`] tracks sequence numbers and the adaptive ack gap. It does
//! **not** touch the socket or the file; [`crate::sender_session::SenderSession`]
//! calls these methods and owns the actual I/O loop.
//!
//! # Contract
//! - A packet requests an acknowledgment iff
//!   `sequence - last_acked == ack_gap`.
//! - Each acknowledgment received bumps `ack_gap` by one (fewer checks while
//!   the path is healthy) and clears the consecutive-timeout counter.
//! - Each timeout resets `ack_gap` to 0 and rewinds the sequence cursor to
//!   `last_acked`; every packet from there on is sent again (go back N).
//! - The timeout that brings the counter to the limit aborts the session.

use crate::packet::chunk_offset;

/// What the session must do after an acknowledgment timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Resume sending at `seq`, reading the file from byte `offset`.
    Rewind { seq: u32, offset: u64 },
    /// Retry limit reached.
    GiveUp { timeouts: u32 },
}

/// Go-back-N send-side state for one transfer.
///
/// ```text
///  last_acked          sequence
///      │                  │
///  ────┼──────────────────┼──────────────────▶ seq space
///      │ <── unconfirmed ▶│ <── not yet read ▶
/// ```
#[derive(Debug, Clone)]
pub struct SenderState {
    /// Sequence number the next packet will carry.
    sequence: u32,
    /// Packets between two acknowledgment requests.
    ack_gap: u32,
    /// Sequence number carried by the most recent acknowledgment.
    last_acked: u32,
    /// Timeouts since the last acknowledgment.
    consecutive_timeouts: u32,
    max_consecutive_timeouts: u32,
}

impl SenderState {
    pub fn new(max_consecutive_timeouts: u32) -> Self {
        Self {
            sequence: 0,
            ack_gap: 0,
            last_acked: 0,
            consecutive_timeouts: 0,
            max_consecutive_timeouts,
        }
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn ack_gap(&self) -> u32 {
        self.ack_gap
    }

    pub fn last_acked(&self) -> u32 {
        self.last_acked
    }

    pub fn consecutive_timeouts(&self) -> u32 {
        self.consecutive_timeouts
    }

    /// Byte offset in the file of the chunk the next packet carries.
    pub fn file_offset(&self) -> u64 {
        chunk_offset(self.sequence)
    }

    /// Whether the packet about to be sent should ask for an acknowledgment.
    pub fn should_request_ack(&self) -> bool {
        // Wrapping: a stale acknowledgment can leave last_acked ahead of sequence.
        self.sequence.wrapping_sub(self.last_acked) == self.ack_gap
    }

    /// Advance past a packet that was just handed to the channel.
    pub fn on_sent(&mut self) {
        self.sequence = self.sequence.wrapping_add(1);
    }

    /// Record an acknowledgment carrying `seq`.
    pub fn on_ack(&mut self, seq: u32) {
        self.ack_gap += 1;
        self.consecutive_timeouts = 0;
        self.last_acked = seq;
    }

    /// `true` when `seq` names a packet sent since the last acknowledgment,
    /// i.e. it lies in `[last_acked, sequence)`.
    pub fn is_outstanding(&self, seq: u32) -> bool {
        seq.wrapping_sub(self.last_acked) < self.sequence.wrapping_sub(self.last_acked)
    }

    /// Handle an acknowledgment timeout.
    pub fn on_timeout(&mut self) -> Recovery {
        self.consecutive_timeouts += 1;
        if self.consecutive_timeouts >= self.max_consecutive_timeouts {
            return Recovery::GiveUp {
                timeouts: self.consecutive_timeouts,
            };
        }
        self.ack_gap = 0;
        self.sequence = self.last_acked;
        Recovery::Rewind {
            seq: self.sequence,
            offset: self.file_offset(),
        }
    }
}
