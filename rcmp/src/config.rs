//! Tunable session parameters.
//!
//! The defaults are the protocol constants: a 1-second acknowledgment timeout,
//! abort on the 5th consecutive timeout, a 10-second receiver idle timeout and
//! a 20% acknowledgment drop rate in the loss simulator.

use std::time::Duration;

use crate::error::TransferError;

pub const ACK_TIMEOUT: Duration = Duration::from_secs(1);
pub const MAX_CONSECUTIVE_TIMEOUTS: u32 = 5;
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(10);
pub const ACK_DROP_PROBABILITY: f64 = 0.2;

/// Sender-side parameters.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// How long to wait for a requested acknowledgment.
    pub ack_timeout: Duration,
    /// The sender gives up when this many timeouts happen back to back.
    pub max_consecutive_timeouts: u32,
    /// Ignore acknowledgments whose connection id or sequence number cannot
    /// answer an outstanding request. Off by default: any acknowledgment
    /// received while waiting is accepted.
    pub validate_acks: bool,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            ack_timeout: ACK_TIMEOUT,
            max_consecutive_timeouts: MAX_CONSECUTIVE_TIMEOUTS,
            validate_acks: false,
        }
    }
}

impl SenderConfig {
    pub fn validate(&self) -> Result<(), TransferError> {
        if self.max_consecutive_timeouts == 0 {
            return Err(TransferError::InvalidConfig(
                "max_consecutive_timeouts must be at least 1".into(),
            ));
        }
        if self.ack_timeout.is_zero() {
            return Err(TransferError::InvalidConfig("ack_timeout must be non-zero".into()));
        }
        Ok(())
    }
}

/// Receiver-side parameters.
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Give up when no datagram arrives for this long after the first packet.
    pub idle_timeout: Duration,
    /// Probability in `[0.0, 1.0]` that a requested acknowledgment is withheld.
    pub ack_drop_probability: f64,
    /// Seed for the loss simulator; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            idle_timeout: IDLE_TIMEOUT,
            ack_drop_probability: ACK_DROP_PROBABILITY,
            seed: None,
        }
    }
}

impl ReceiverConfig {
    pub fn validate(&self) -> Result<(), TransferError> {
        if !(0.0..=1.0).contains(&self.ack_drop_probability) {
            return Err(TransferError::InvalidConfig(format!(
                "ack_drop_probability {} is outside [0, 1]",
                self.ack_drop_probability
            )));
        }
        if self.idle_timeout.is_zero() {
            return Err(TransferError::InvalidConfig("idle_timeout must be non-zero".into()));
        }
        Ok(())
    }
}
