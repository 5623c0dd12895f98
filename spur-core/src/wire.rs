//! Framing: fixed binary header shared with node firmware.
//!
//! Outbound (gateway to node):
//! - Bytes 0-1: destination (BE)
//! - Bytes 2-3: source (BE)
//! - Byte 4: function code
//! - Byte 5: declared length (4 + payload length)
//! - Bytes 6-9: timestamp, always zero, host byte order
//! - Bytes 10-11: wakeup interval in half-seconds (BE)
//! - Bytes 12..: payload
//!
//! Beacons carry only the two addresses followed by 10 reserved bytes, of which
//! the first two repeat the function code and a zero length.
//!
//! Inbound frames share the first ten bytes; their payload starts at byte 10.

use crate::identity::{NodeId, ShortAddr};
use crate::protocol::Function;

/// Bytes `decode_frame` needs before it can report addresses, function and length.
pub const MIN_FRAME_LEN: usize = 6;

/// Offset of the payload in an inbound frame.
pub const INBOUND_HEADER_LEN: usize = 10;

/// Bytes counted by the declared length besides the payload.
const DECLARED_HEADER_LEN: usize = 4;

/// Largest payload whose declared length still fits the length byte.
pub const MAX_PAYLOAD_LEN: usize = u8::MAX as usize - DECLARED_HEADER_LEN;

/// Reserved bytes following the addresses in a beacon.
const BEACON_RESERVED_LEN: usize = 10;

/// Decoded frame header plus a view of the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    pub destination: ShortAddr,
    pub source: ShortAddr,
    pub function: Function,
    pub length: u8,
    pub payload: &'a [u8],
}

impl<'a> Frame<'a> {
    /// Node ID carried by an `include_req`.
    pub fn include_node(&self) -> Result<NodeId, FrameDecodeError> {
        let b = self.payload.get(..4).ok_or(FrameDecodeError::ShortPayload {
            expected: 4,
            actual: self.payload.len(),
        })?;
        Ok(NodeId(u32::from_be_bytes([b[0], b[1], b[2], b[3]])))
    }

    /// Alert code carried by an `alert`. `None` if the payload is cut short.
    pub fn alert_code(&self) -> Option<u16> {
        self.payload
            .get(..2)
            .map(|b| u16::from_be_bytes([b[0], b[1]]))
    }
}

/// Encode a frame from the gateway (`source`) to `destination`.
pub fn encode_frame(
    destination: ShortAddr,
    source: ShortAddr,
    function: Function,
    wakeup: u16,
    payload: &[u8],
) -> Result<Vec<u8>, FrameEncodeError> {
    if function == Function::Beacon {
        let mut out = Vec::with_capacity(4 + BEACON_RESERVED_LEN);
        out.extend_from_slice(&destination.to_be_bytes());
        out.extend_from_slice(&source.to_be_bytes());
        let mut reserved = [0u8; BEACON_RESERVED_LEN];
        reserved[0] = function.code();
        out.extend_from_slice(&reserved);
        return Ok(out);
    }
    let length = u8::try_from(DECLARED_HEADER_LEN + payload.len())
        .map_err(|_| FrameEncodeError::TooLarge(payload.len()))?;
    let timestamp: u32 = 0;
    let mut out = Vec::with_capacity(12 + payload.len());
    out.extend_from_slice(&destination.to_be_bytes());
    out.extend_from_slice(&source.to_be_bytes());
    out.push(function.code());
    out.push(length);
    // Node firmware reads this field in host order; only the surrounding fields are BE.
    out.extend_from_slice(&timestamp.to_ne_bytes());
    out.extend_from_slice(&wakeup.to_be_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

/// Error encoding a frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameEncodeError {
    #[error("payload of {0} bytes does not fit the length field")]
    TooLarge(usize),
}

/// Decode the header of `bytes`. Destination filtering is left to the caller.
pub fn decode_frame(bytes: &[u8]) -> Result<Frame<'_>, FrameDecodeError> {
    if bytes.len() < MIN_FRAME_LEN {
        return Err(FrameDecodeError::TooShort(bytes.len()));
    }
    Ok(Frame {
        destination: ShortAddr::from_be_bytes([bytes[0], bytes[1]]),
        source: ShortAddr::from_be_bytes([bytes[2], bytes[3]]),
        function: Function::from_code(bytes[4]),
        length: bytes[5],
        payload: bytes.get(INBOUND_HEADER_LEN..).unwrap_or(&[]),
    })
}

/// Error decoding a frame.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameDecodeError {
    #[error("frame too short: {0} bytes")]
    TooShort(usize),
    #[error("payload too short: expected {expected}, got {actual}")]
    ShortPayload { expected: usize, actual: usize },
}
