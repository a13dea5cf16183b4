//! Error types for framing.

use thiserror::Error;

/// Errors produced while framing or unframing messages.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FramingError {
    /// Header mode outside 0..=13.
    #[error("invalid header mode: {0}")]
    InvalidMode(String),

    /// The payload does not fit the mode's length field.
    #[error("payload of {len} bytes exceeds the {max} byte limit of this header mode")]
    PayloadTooLarge { len: usize, max: usize },

    /// A frame announced fewer bytes than its own header occupies.
    #[error("frame length {len} is shorter than its {header} byte header")]
    FrameTooShort { len: usize, header: usize },

    /// A frame announced more bytes than the connection accepts.
    #[error("frame length {len} exceeds maximum message size {max}")]
    FrameTooLarge { len: usize, max: usize },

    /// RC4 keys must be 1 to 256 bytes.
    #[error("invalid RC4 key length: {0}")]
    InvalidKeyLength(usize),
}

impl FramingError {
    /// Returns true for violations detected in data received from a peer.
    pub fn is_protocol_fault(&self) -> bool {
        matches!(
            self,
            FramingError::FrameTooShort { .. } | FramingError::FrameTooLarge { .. }
        )
    }
}
