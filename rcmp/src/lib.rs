//! `rcmp`: reliable whole-file transfer over UDP.
//!
//! # Architecture
//!
//! ```text
//!  ┌────────────────┐  DATA (2061 B)   ┌──────────────────┐
//!  │ SenderSession  │─────────────────▶│ ReceiverSession  │
//!  │  SenderState   │                  │  ReceiverState   │
//!  └───────┬────────┘◀─────────────────└────────┬─────────┘
//!          │            ACK (8 B)               │ LossSimulator
//!          │                                    │
//!  ┌───────▼────────────────────────────────────▼─────────┐
//!  │                  Channel (trait)                      │
//!  │   Socket (tokio UdpSocket)  |  SimChannel (in-memory) │
//!  └───────────────────────────────────────────────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`packet`]: wire format (serialise / deserialise)
//! - [`sender`]: outbound cursor, ack spacing and go-back-N rewind
//! - [`receiver`]: inbound cursor and packet classification
//! - [`sender_session`]: drives a file across a channel
//! - [`receiver_session`]: writes in-order payloads and answers ack requests
//! - [`loss`]: acknowledgment withholding for fault injection
//! - [`state`]: phase and step outcome types
//! - [`config`]: tunables and their defaults
//! - [`error`]: transfer error type
//! - [`simulator`]: lossy/reorder network layer for testing
//! - [`socket`]: async datagram channel abstraction

pub mod config;
pub mod error;
pub mod loss;
pub mod packet;
pub mod receiver;
pub mod receiver_session;
pub mod sender;
pub mod sender_session;
pub mod simulator;
pub mod socket;
pub mod state;

pub use config::{ReceiverConfig, SenderConfig};
pub use error::TransferError;
pub use receiver_session::{ReceiveReport, ReceiverSession};
pub use sender_session::{SendReport, SenderSession};
pub use socket::{Channel, Socket};
