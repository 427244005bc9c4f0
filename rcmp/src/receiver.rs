//! Receive-side protocol state.
//!
//! [`ReceiverState`] implements strict in-order acceptance:
//!
//! - Only the packet whose sequence equals `next_expected` is written.
//! - Duplicates (`seq < next_expected`) and future packets
//!   (`seq > next_expected`) are discarded without buffering.
//! - The stream ends after the final packet, or once the bytes written reach
//!   the declared total size.
//!
//! This module only manages state; all socket and file I/O is the caller's
//! responsibility (see [`crate::receiver_session`]).

use crate::packet::DataPacket;

/// Where an inbound packet falls relative to the receive cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Duplicate,
    InOrder,
    Future,
}

#[derive(Debug, Clone, Default)]
pub struct ReceiverState {
    /// Sequence number of the only packet that may be written next.
    next_expected: u32,
    /// Bytes appended to the output so far.
    bytes_written: u64,
}

impl ReceiverState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_expected(&self) -> u32 {
        self.next_expected
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn classify(&self, seq: u32) -> Classification {
        use std::cmp::Ordering;
        match seq.cmp(&self.next_expected) {
            Ordering::Less => Classification::Duplicate,
            Ordering::Equal => Classification::InOrder,
            Ordering::Greater => Classification::Future,
        }
    }

    /// Account for an in-order packet whose valid payload has been written.
    ///
    /// Returns `true` when the stream is complete. Otherwise `next_expected`
    /// advances by one.
    pub fn record_write(&mut self, packet: &DataPacket) -> bool {
        debug_assert_eq!(self.classify(packet.seq), Classification::InOrder);
        self.bytes_written += packet.valid_payload().len() as u64;
        if packet.is_final() || self.bytes_written >= u64::from(packet.total_size) {
            return true;
        }
        self.next_expected += 1;
        false
    }
}
