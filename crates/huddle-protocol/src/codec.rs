//! Codec for encoding and decoding Huddle events.
//!
//! Every WebSocket text frame carries exactly one JSON-encoded event.

use thiserror::Error;

use crate::events::{ClientEvent, ServerEvent};

/// Maximum inbound frame size (64 KiB).
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds maximum size.
    #[error("Frame size {0} exceeds maximum {MAX_FRAME_SIZE}")]
    FrameTooLarge(usize),

    /// Payload is not a known event.
    #[error("Malformed message: {0}")]
    Malformed(#[source] serde_json::Error),

    /// JSON encoding error.
    #[error("Encoding error: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Encode a server event to a JSON text frame.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode(event: &ServerEvent) -> Result<String, ProtocolError> {
    serde_json::to_string(event).map_err(ProtocolError::Encode)
}

/// Decode a client event from a text frame.
///
/// # Errors
///
/// Returns an error if the frame is too large, is not JSON, or names an
/// unknown event type.
pub fn decode(text: &str) -> Result<ClientEvent, ProtocolError> {
    decode_bytes(text.as_bytes())
}

/// Decode a client event from raw bytes (binary frames are accepted as UTF-8 JSON).
///
/// # Errors
///
/// Returns an error if the frame is too large or is not a valid event.
pub fn decode_bytes(data: &[u8]) -> Result<ClientEvent, ProtocolError> {
    if data.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(data.len()));
    }
    serde_json::from_slice(data).map_err(ProtocolError::Malformed)
}
