//! Relay packet types and framing
//!
//! Every datagram exchanged between Leaves, Relays and the Root has the same
//! fixed layout. There is no header length field: both sides agree on the
//! payload length out of band (the default is a single state byte).
//!
//! ## Packet Structure
//!
//! ```text
//! ┌──────────────┬──────────────┬──────────────────────────┐
//! │  Dest (4B)   │  Src (4B)    │  Payload (payload_len B) │
//! └──────────────┴──────────────┴──────────────────────────┘
//! ```

use tracing::warn;

use crate::address::Address;
use crate::error::{RelayError, Result};

/// Size of the two address fields
pub const HEADER_SIZE: usize = 8;

/// Default payload length (one state/command byte)
pub const DEFAULT_PAYLOAD_LEN: usize = 1;

/// A decoded relay packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Embedded destination address
    pub destination: Address,
    /// Embedded source address
    pub source: Address,
    /// Opaque payload bytes
    pub payload: Vec<u8>,
}

impl Packet {
    /// Create a new packet
    pub fn new(destination: Address, source: Address, payload: &[u8]) -> Self {
        Self {
            destination,
            source,
            payload: payload.to_vec(),
        }
    }

    /// Total wire length of this packet
    pub fn wire_len(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Fixed-length codec for [`Packet`]
///
/// Decoding rejects anything whose length differs from
/// `HEADER_SIZE + payload_len`, so a truncated or padded datagram never
/// reaches the forwarding engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketCodec {
    payload_len: usize,
}

impl PacketCodec {
    /// Create a codec for the given payload length
    pub fn new(payload_len: usize) -> Self {
        Self { payload_len }
    }

    /// Payload length this codec expects
    pub fn payload_len(&self) -> usize {
        self.payload_len
    }

    /// Total wire size (`2 * 4 + payload_len`)
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload_len
    }

    /// Serialize a packet, rejecting payloads longer than `payload_len`
    ///
    /// Shorter payloads are zero-padded.
    pub fn try_encode(&self, packet: &Packet) -> Result<Vec<u8>> {
        if packet.payload.len() > self.payload_len {
            return Err(RelayError::MalformedPacket {
                expected: self.wire_size(),
                actual: packet.wire_len(),
            });
        }
        Ok(self.encode(packet))
    }

    /// Serialize a packet to bytes
    ///
    /// The payload is truncated or zero-padded to the codec's payload length.
    /// Truncation is logged; use [`PacketCodec::try_encode`] to reject it.
    pub fn encode(&self, packet: &Packet) -> Vec<u8> {
        if packet.payload.len() > self.payload_len {
            warn!(
                len = packet.payload.len(),
                max = self.payload_len,
                "Truncating oversized payload"
            );
        }
        let mut bytes = Vec::with_capacity(self.wire_size());
        bytes.extend_from_slice(packet.destination.as_bytes());
        bytes.extend_from_slice(packet.source.as_bytes());
        let take = packet.payload.len().min(self.payload_len);
        bytes.extend_from_slice(&packet.payload[..take]);
        bytes.resize(self.wire_size(), 0);
        bytes
    }

    /// Deserialize a packet from bytes
    pub fn decode(&self, bytes: &[u8]) -> Result<Packet> {
        if bytes.len() != self.wire_size() {
            return Err(RelayError::MalformedPacket {
                expected: self.wire_size(),
                actual: bytes.len(),
            });
        }
        Ok(Packet {
            destination: Address::new(bytes[0], bytes[1], bytes[2], bytes[3]),
            source: Address::new(bytes[4], bytes[5], bytes[6], bytes[7]),
            payload: bytes[HEADER_SIZE..].to_vec(),
        })
    }
}

impl Default for PacketCodec {
    fn default() -> Self {
        Self::new(DEFAULT_PAYLOAD_LEN)
    }
}
