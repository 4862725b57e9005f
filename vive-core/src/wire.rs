//! Framing: length-prefix (4 bytes BE) + protobuf payload.

use prost::Message as _;

use crate::protocol::Frame;

pub const LEN_SIZE: usize = 4;
/// Default ceiling on a single payload, applied by readers.
pub const DEFAULT_MAX_FRAME_LEN: u32 = 16 * 1024 * 1024; // 16 MiB

/// Encode a frame into its canonical protobuf payload (no length prefix).
pub fn encode_payload(frame: &Frame) -> Vec<u8> {
    frame.encode_to_vec()
}

/// Decode a payload produced by `encode_payload`.
pub fn decode_payload(bytes: &[u8]) -> Result<Frame, MalformedMessage> {
    Ok(Frame::decode(bytes)?)
}

/// Payload is not a valid frame encoding (truncated, bad tag structure, wrong field type).
#[derive(Debug, thiserror::Error)]
#[error("malformed message: {0}")]
pub struct MalformedMessage(#[from] prost::DecodeError);

/// Prefix `payload` with its length. `None` if the payload does not fit a u32 length.
pub fn prefix_payload(payload: &[u8]) -> Option<Vec<u8>> {
    let len = u32::try_from(payload.len()).ok()?;
    let mut out = Vec::with_capacity(LEN_SIZE + payload.len());
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(payload);
    Some(out)
}

/// Payload length announced by a frame header.
pub fn frame_len(header: [u8; LEN_SIZE]) -> u32 {
    u32::from_be_bytes(header)
}
