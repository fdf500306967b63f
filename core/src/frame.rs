/// Fixed-size frame codec for the TCP side of the bridge
///
/// Every payload relayed toward the TCP peer is serialized into a
/// 256-byte frame: one length byte, the payload, then zero padding.
/// Bytes flowing the other way (TCP peer to wireless notification)
/// are never framed.
use thiserror::Error;

/// Size of every frame on the TCP wire
pub const FRAME_LEN: usize = 256;

/// Maximum payload representable by the one-byte length prefix
pub const MAX_PAYLOAD_LEN: usize = FRAME_LEN - 1;

/// Errors for frame encoding and decoding
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Payload too large for frame: {0} bytes (max {MAX_PAYLOAD_LEN})")]
    PayloadTooLarge(usize),
    #[error("Malformed frame: expected {FRAME_LEN} bytes, got {0}")]
    MalformedFrame(usize),
}

/// Encode a payload into a fixed-size frame.
///
/// Byte 0 carries the payload length, bytes `1..=len` the payload and
/// the remainder is zero padding. A zero-length payload is valid and
/// produces a frame with a zero length byte.
pub fn encode(payload: &[u8]) -> Result<[u8; FRAME_LEN], FrameError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(FrameError::PayloadTooLarge(payload.len()));
    }
    let mut frame = [0u8; FRAME_LEN];
    frame[0] = payload.len() as u8;
    frame[1..=payload.len()].copy_from_slice(payload);
    Ok(frame)
}

/// Decode a frame back into its payload.
///
/// The input must be exactly [`FRAME_LEN`] bytes. Trailing padding is
/// discarded without validation; non-zero padding is accepted.
pub fn decode(frame: &[u8]) -> Result<Vec<u8>, FrameError> {
    if frame.len() != FRAME_LEN {
        return Err(FrameError::MalformedFrame(frame.len()));
    }
    let len = frame[0] as usize;
    Ok(frame[1..=len].to_vec())
}

// ============================================================================
// TESTS
// ============================================================================
