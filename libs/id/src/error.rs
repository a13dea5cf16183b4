//! Error types for handle allocation and parsing.

use thiserror::Error;

/// Errors that can occur when allocating or decoding handles.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// Every slot of the table is occupied.
    #[error("handle table exhausted: {capacity} live handles")]
    Exhausted { capacity: usize },

    /// The raw value cannot be a handle (negative, zero generation, or too wide).
    #[error("invalid handle value: {0}")]
    InvalidRaw(i64),
}

impl IdError {
    /// Returns true if this error indicates the table is full.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, IdError::Exhausted { .. })
    }
}
