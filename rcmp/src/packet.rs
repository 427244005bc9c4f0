//! Wire-format definitions for RCMP datagrams.
//!
//! Two fixed-size shapes travel over the channel:
//! - [`DataPacket`]: sender → receiver, one file chunk per datagram.
//! - [`AckPacket`]: receiver → sender, answers a data packet that asked for it.
//!
//! No I/O happens here; this is pure data transformation.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//! Data packet (2061 bytes)
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                         Connection ID                         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                      Declared Total Size                      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Sequence Number                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |  Ack Request  |          Payload (2048 bytes, zero padded) ...
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!
//! Acknowledgment packet (8 bytes)
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                         Connection ID                         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                 Acknowledged Sequence Number                  |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! There is no length field and no end-of-stream marker: the receiver derives
//! how many trailing payload bytes are real from `declared_total_size` and the
//! sequence number (see [`is_final`] and [`valid_len`]).

use thiserror::Error;

/// Bytes of file data carried by one data packet.
pub const CHUNK_SIZE: usize = 2048;

/// Byte length of the fixed data-packet header.
/// connection_id(4) + total_size(4) + seq(4) + ack_requested(1)
pub const DATA_HEADER_LEN: usize = 13;

/// Byte length of an encoded [`DataPacket`].
pub const DATA_PACKET_LEN: usize = DATA_HEADER_LEN + CHUNK_SIZE;

/// Byte length of an encoded [`AckPacket`].
pub const ACK_PACKET_LEN: usize = 8;

// Byte offsets of each field within the serialised data packet.
const OFF_CONN_ID: usize = 0;
const OFF_TOTAL_SIZE: usize = 4;
const OFF_SEQ: usize = 8;
const OFF_ACK_REQUESTED: usize = 12;

// Byte offsets within the serialised ack packet.
const OFF_ACK_CONN_ID: usize = 0;
const OFF_ACK_SEQ: usize = 4;

/// Errors that can arise when encoding or parsing a datagram.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    /// The datagram is not exactly the fixed size of the expected shape.
    #[error("datagram is {actual} bytes, expected exactly {expected}")]
    WrongLength { expected: usize, actual: usize },
    /// A data packet cannot carry more than one chunk.
    #[error("payload of {0} bytes exceeds the 2048-byte chunk size")]
    PayloadTooLarge(usize),
}

/// One chunk of the file in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPacket {
    /// Sender-chosen identifier, constant for the whole transfer.
    pub connection_id: u32,
    /// Byte length of the file being transferred.
    pub total_size: u32,
    /// Zero-based chunk index.
    pub seq: u32,
    /// Whether the receiver should answer with an [`AckPacket`].
    pub ack_requested: bool,
    /// Chunk bytes. At most [`CHUNK_SIZE`] on encode; exactly [`CHUNK_SIZE`]
    /// after decode (the tail of the final chunk is padding).
    pub payload: Vec<u8>,
}

impl DataPacket {
    /// Serialise into a [`DATA_PACKET_LEN`]-byte buffer, zero-padding a short payload.
    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        if self.payload.len() > CHUNK_SIZE {
            return Err(PacketError::PayloadTooLarge(self.payload.len()));
        }
        let mut buf = vec![0u8; DATA_PACKET_LEN];
        buf[OFF_CONN_ID..OFF_CONN_ID + 4].copy_from_slice(&self.connection_id.to_be_bytes());
        buf[OFF_TOTAL_SIZE..OFF_TOTAL_SIZE + 4].copy_from_slice(&self.total_size.to_be_bytes());
        buf[OFF_SEQ..OFF_SEQ + 4].copy_from_slice(&self.seq.to_be_bytes());
        buf[OFF_ACK_REQUESTED] = u8::from(self.ack_requested);
        buf[DATA_HEADER_LEN..DATA_HEADER_LEN + self.payload.len()].copy_from_slice(&self.payload);
        Ok(buf)
    }

    /// Parse a data packet. Any non-zero ack-request byte reads as `true`.
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() != DATA_PACKET_LEN {
            return Err(PacketError::WrongLength {
                expected: DATA_PACKET_LEN,
                actual: buf.len(),
            });
        }
        Ok(Self {
            connection_id: read_u32(buf, OFF_CONN_ID),
            total_size: read_u32(buf, OFF_TOTAL_SIZE),
            seq: read_u32(buf, OFF_SEQ),
            ack_requested: buf[OFF_ACK_REQUESTED] != 0,
            payload: buf[DATA_HEADER_LEN..].to_vec(),
        })
    }

    /// `true` when this is the last packet of the transfer.
    pub fn is_final(&self) -> bool {
        is_final(self.seq, self.total_size)
    }

    /// The bytes of the payload that belong to the file.
    pub fn valid_payload(&self) -> &[u8] {
        let n = valid_len(self.seq, self.total_size).min(self.payload.len());
        &self.payload[..n]
    }
}

/// Answer to a data packet that requested acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckPacket {
    /// Echo of the data packet's connection id.
    pub connection_id: u32,
    /// Echo of the data packet's sequence number.
    pub seq: u32,
}

impl AckPacket {
    pub fn encode(&self) -> [u8; ACK_PACKET_LEN] {
        let mut buf = [0u8; ACK_PACKET_LEN];
        buf[OFF_ACK_CONN_ID..OFF_ACK_CONN_ID + 4]
            .copy_from_slice(&self.connection_id.to_be_bytes());
        buf[OFF_ACK_SEQ..OFF_ACK_SEQ + 4].copy_from_slice(&self.seq.to_be_bytes());
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() != ACK_PACKET_LEN {
            return Err(PacketError::WrongLength {
                expected: ACK_PACKET_LEN,
                actual: buf.len(),
            });
        }
        Ok(Self {
            connection_id: read_u32(buf, OFF_ACK_CONN_ID),
            seq: read_u32(buf, OFF_ACK_SEQ),
        })
    }
}

/// `true` iff chunk `seq` overruns the declared size, i.e. it is the last one.
///
/// A file whose size is an exact multiple of [`CHUNK_SIZE`] has no final
/// packet under this rule; the receiver detects completion by byte count instead.
pub fn is_final(seq: u32, total_size: u32) -> bool {
    (u64::from(seq) + 1) * CHUNK_SIZE as u64 > u64::from(total_size)
}

/// Number of real file bytes carried by chunk `seq`.
pub fn valid_len(seq: u32, total_size: u32) -> usize {
    let start = chunk_offset(seq);
    let remaining = u64::from(total_size).saturating_sub(start);
    remaining.min(CHUNK_SIZE as u64) as usize
}

/// Byte offset of chunk `seq` within the file.
pub fn chunk_offset(seq: u32) -> u64 {
    u64::from(seq) * CHUNK_SIZE as u64
}

#[inline]
fn read_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_be_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}
