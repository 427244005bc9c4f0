//! Transfer-level error taxonomy.
//!
//! Only fatal conditions are represented here. End of data is a normal
//! [`crate::state::Step::Finished`] outcome, and local send failures or
//! malformed datagrams are logged and counted in the session reports.

use std::time::Duration;

use thiserror::Error;

use crate::packet::PacketError;

#[derive(Debug, Error)]
pub enum TransferError {
    /// The sender saw too many acknowledgment timeouts in a row. Whether the
    /// receiver got the whole file is unknown.
    #[error("receiver not responding: {timeouts} consecutive acks not received, outcome unknown")]
    ReceiverUnresponsive { timeouts: u32 },

    /// The receiver heard nothing from the sender within the idle interval.
    #[error("no datagram from sender within {idle:?}, closing connection")]
    ReceiverIdleTimeout { idle: Duration },

    /// The declared total size is a 32-bit field.
    #[error("file is {len} bytes, larger than the 4294967295 bytes a transfer can declare")]
    FileTooLarge { len: u64 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("packet encoding failed: {0}")]
    Packet(#[from] PacketError),

    /// Local file or socket failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
