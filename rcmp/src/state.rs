//! Session finite-state machine types.
//!
//! This module defines every phase a sender or receiver session can occupy,
//! plus the [`Step`] outcome each session step reports to its driving loop.
//! Transitions themselves live in [`crate::sender_session`] and
//! [`crate::receiver_session`].

/// Phases of a [`crate::sender_session::SenderSession`].
///
/// ```text
///  READING ──chunk──▶ SENDING ──ack requested──▶ AWAITING_ACK
///     ▲  │               │                          │    │
///     │  │ EOF           └──────no ack requested────┤    │ timeout
///     │  ▼                                          │    ▼
///     │ DONE                                 ack ◀──┘  RECOVERING ──5th──▶ ABORTED
///     └─────────────────────────────────────────────────────┘ rewind
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SenderPhase {
    /// About to read the next chunk at the file cursor.
    #[default]
    Reading,
    /// Handing a data packet to the channel.
    Sending,
    /// Blocked on an acknowledgment, bounded by the ack timeout.
    AwaitingAck,
    /// An ack timed out; cursors are being rewound.
    Recovering,
    /// File exhausted; transfer finished.
    Done,
    /// Too many consecutive timeouts; outcome unknown.
    Aborted,
}

/// Phases of a [`crate::receiver_session::ReceiverSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReceiverPhase {
    /// Nothing received yet; waiting without a deadline.
    #[default]
    AwaitingFirstPacket,
    /// At least one data packet seen; the idle timeout is armed.
    Receiving,
    /// Final packet written.
    Done,
    /// The sender went quiet for longer than the idle timeout.
    IdleTimeoutAbort,
    /// A local write or socket failure ended the session.
    Aborted,
}

impl SenderPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Aborted)
    }
}

impl ReceiverPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::IdleTimeoutAbort | Self::Aborted)
    }
}

impl std::fmt::Display for SenderPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::fmt::Display for ReceiverPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Outcome of one session step.
///
/// Fatal conditions travel as `Err(TransferError)`; end of data is the
/// ordinary `Finished` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Keep driving the loop.
    Continue,
    /// End of data reached; the session completed successfully.
    Finished,
}
