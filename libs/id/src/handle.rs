//! The handle type.

use crate::IdError;

/// Number of bits used by the slot index.
const SLOT_BITS: u32 = 16;

/// Mask selecting the slot index.
const SLOT_MASK: u32 = (1 << SLOT_BITS) - 1;

/// Generations live in `1..GENERATION_CEILING`.
pub(crate) const GENERATION_CEILING: u16 = 0x7fff;

/// Identifies one connection until it is closed.
///
/// Handles are plain values; holding one does not keep anything alive. Once
/// the connection behind it is closed, the handle simply stops resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle(u32);

impl Handle {
    /// Builds a handle from its parts. The generation must be non-zero.
    pub(crate) const fn new(slot: u16, generation: u16) -> Self {
        Self(((generation as u32) << SLOT_BITS) | slot as u32)
    }

    /// Returns the slot index.
    #[must_use]
    pub const fn slot(&self) -> usize {
        (self.0 & SLOT_MASK) as usize
    }

    /// Returns the generation tag.
    #[must_use]
    pub const fn generation(&self) -> u16 {
        (self.0 >> SLOT_BITS) as u16
    }

    /// Returns the raw 31-bit value.
    #[must_use]
    pub const fn raw(&self) -> u32 {
        self.0
    }

    /// Decodes a raw value, rejecting anything no table could have issued.
    pub fn from_raw(raw: u32) -> Result<Self, IdError> {
        let handle = Self(raw);
        let generation = handle.generation();
        if generation == 0 || generation >= GENERATION_CEILING {
            return Err(IdError::InvalidRaw(raw as i64));
        }
        Ok(handle)
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "h{}.{}", self.slot(), self.generation())
    }
}

impl From<Handle> for i32 {
    fn from(handle: Handle) -> Self {
        handle.0 as i32
    }
}

impl TryFrom<i32> for Handle {
    type Error = IdError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        if value <= 0 {
            return Err(IdError::InvalidRaw(value as i64));
        }
        Self::from_raw(value as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parts_roundtrip() {
        let handle = Handle::new(0xfffe, 0x7ffe);
        assert_eq!(handle.slot(), 0xfffe);
        assert_eq!(handle.generation(), 0x7ffe);
        assert!(i32::from(handle) > 0);
    }

    #[test]
    fn test_from_raw_rejects_zero_generation() {
        assert!(matches!(Handle::from_raw(42), Err(IdError::InvalidRaw(42))));
        assert!(Handle::from_raw(0x7fff_0000).is_err());
        assert!(Handle::from_raw(0x0001_0005).is_ok());
    }

    #[test]
    fn test_i32_conversion() {
        let handle = Handle::new(7, 3);
        let raw: i32 = handle.into();
        assert_eq!(Handle::try_from(raw).unwrap(), handle);
        assert!(Handle::try_from(-1).is_err());
        assert!(Handle::try_from(0).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Handle::new(12, 5).to_string(), "h12.5");
    }
}
