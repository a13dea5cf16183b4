//! Error types for event handling.

use thiserror::Error;

/// Errors that can occur when reading or decoding events.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventError {
    /// The caller's buffer cannot hold the next record's payload.
    #[error("buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    /// The event kind is unknown.
    #[error("unknown event kind: {0}")]
    UnknownKind(u16),

    /// The record is truncated or its length field is inconsistent.
    #[error("malformed event record: {0}")]
    Malformed(String),
}

impl EventError {
    /// Returns true if retrying with a larger buffer would succeed.
    pub fn is_buffer_too_small(&self) -> bool {
        matches!(self, EventError::BufferTooSmall { .. })
    }
}
