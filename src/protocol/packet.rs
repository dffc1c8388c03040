//! # NIIMBOT Packet Framing
//!
//! Every request and response exchanged with the printer is wrapped in the
//! same fixed frame:
//!
//! ```text
//! ┌───────┬───────┬──────┬─────┬─────────────┬──────────┬───────┬───────┐
//! │ 0x55  │ 0x55  │ type │ len │ payload ... │ checksum │ 0xAA  │ 0xAA  │
//! └───────┴───────┴──────┴─────┴─────────────┴──────────┴───────┴───────┘
//!   preamble                       len bytes                postamble
//! ```
//!
//! - `len` is a single byte, so a payload holds at most 255 bytes.
//! - Frame length on the wire is always `len + 7`.
//! - `checksum` is the XOR of `type`, `len` and every payload byte.
//!
//! ## Example
//!
//! ```
//! use niimbot::protocol::packet::{self, Packet};
//!
//! let bytes = packet::encode(0x21, &[3]).unwrap();
//! assert_eq!(bytes, vec![0x55, 0x55, 0x21, 0x01, 0x03, 0x23, 0xAA, 0xAA]);
//!
//! let (pkt, consumed) = packet::try_decode(&bytes).unwrap().unwrap();
//! assert_eq!(pkt, Packet::new(0x21, vec![3]).unwrap());
//! assert_eq!(consumed, 8);
//! ```

use crate::error::{NiimbotError, Result};

/// Frame preamble
pub const PREAMBLE: [u8; 2] = [0x55, 0x55];

/// Frame postamble
pub const POSTAMBLE: [u8; 2] = [0xAA, 0xAA];

/// Bytes added around the payload: preamble, type, len, checksum, postamble
pub const FRAME_OVERHEAD: usize = 7;

/// Largest payload the length byte can describe
pub const MAX_PAYLOAD: usize = u8::MAX as usize;

/// Offset of the length byte within a frame
const LEN_OFFSET: usize = 3;

/// A single protocol frame: command type plus payload.
///
/// Immutable once built. The payload length is checked at construction so
/// [`Packet::to_bytes`] cannot fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    command: u8,
    payload: Vec<u8>,
}

impl Packet {
    /// Build a packet, rejecting payloads longer than 255 bytes.
    pub fn new(command: u8, payload: impl Into<Vec<u8>>) -> Result<Self> {
        let payload = payload.into();
        if payload.len() > MAX_PAYLOAD {
            return Err(NiimbotError::Encoding { len: payload.len() });
        }
        Ok(Self { command, payload })
    }

    /// Command or response code
    #[inline]
    pub fn command(&self) -> u8 {
        self.command
    }

    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Total frame length on the wire
    #[inline]
    pub fn wire_len(&self) -> usize {
        self.payload.len() + FRAME_OVERHEAD
    }

    /// Boolean result carried by most acknowledgements (`payload[0] != 0`).
    ///
    /// `None` when the payload is empty.
    pub fn flag(&self) -> Option<bool> {
        self.payload.first().map(|&b| b != 0)
    }

    /// Serialize to the wire format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.wire_len());
        self.write_to(&mut out);
        out
    }

    /// Append the wire format to an existing buffer.
    ///
    /// Used when several frames are batched into a single transport write.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&PREAMBLE);
        out.push(self.command);
        out.push(self.payload.len() as u8);
        out.extend_from_slice(&self.payload);
        out.push(checksum(self.command, &self.payload));
        out.extend_from_slice(&POSTAMBLE);
    }
}

/// XOR-fold of the command type, payload length and payload bytes.
///
/// Payload length is truncated to its wire byte.
pub fn checksum(command: u8, payload: &[u8]) -> u8 {
    payload
        .iter()
        .fold(command ^ payload.len() as u8, |acc, &b| acc ^ b)
}

/// Encode a command and payload into a complete frame.
///
/// Fails with [`NiimbotError::Encoding`] if the payload exceeds 255 bytes.
pub fn encode(command: u8, payload: &[u8]) -> Result<Vec<u8>> {
    Ok(Packet::new(command, payload)?.to_bytes())
}

/// Try to decode one frame from the head of `buf`.
///
/// ## Returns
///
/// - `Ok(None)` if the buffer does not yet hold a complete frame (fewer than
///   4 bytes, or fewer than `buf[3] + 7`). Nothing is consumed.
/// - `Ok(Some((packet, consumed)))` for a valid frame.
/// - `Err(NiimbotError::CorruptFrame { consumed, .. })` on checksum mismatch.
///   The caller should still drop `consumed` bytes to stay frame-aligned.
///
/// The buffer is assumed to start on a frame boundary; there is no
/// preamble search.
pub fn try_decode(buf: &[u8]) -> Result<Option<(Packet, usize)>> {
    if buf.len() <= LEN_OFFSET {
        return Ok(None);
    }

    let len = buf[LEN_OFFSET] as usize;
    let frame_len = len + FRAME_OVERHEAD;
    if buf.len() < frame_len {
        return Ok(None);
    }

    let command = buf[2];
    let payload = &buf[4..4 + len];
    let actual = buf[4 + len];
    let expected = checksum(command, payload);
    if actual != expected {
        return Err(NiimbotError::CorruptFrame {
            command,
            expected,
            actual,
            consumed: frame_len,
        });
    }

    let packet = Packet {
        command,
        payload: payload.to_vec(),
    };
    Ok(Some((packet, frame_len)))
}

// ============================================================================
// TESTS
// ============================================================================
