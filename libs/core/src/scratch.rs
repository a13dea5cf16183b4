//! Shared scratch buffer.
//!
//! One buffer serves every connection as the receive working area and as
//! the staging area for decoded frames. It only ever grows. Each growth bumps
//! a generation; connections record the generation and capacity they were
//! last pointed at, and the core repoints all of them after a growth.

use std::collections::TryReserveError;

/// Growth step while the buffer is at most this large.
const LINEAR_LIMIT: usize = 0x80_0000;

/// Linear growth step.
const LINEAR_STEP: usize = 0x10_0000;

/// A connection's view of the scratch buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ScratchView {
    pub generation: u64,
    pub capacity: usize,
}

#[derive(Debug)]
pub(crate) struct Scratch {
    buf: Vec<u8>,
    generation: u64,
}

impl Scratch {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity.max(1)],
            generation: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn view(&self) -> ScratchView {
        ScratchView {
            generation: self.generation,
            capacity: self.buf.len(),
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    /// Grows to hold at least `needed` bytes.
    ///
    /// Returns `Ok(false)` if it was already large enough. On allocation
    /// failure the old buffer is left in place.
    pub fn grow_to(&mut self, needed: usize) -> Result<bool, TryReserveError> {
        if needed <= self.buf.len() {
            return Ok(false);
        }
        let capacity = next_capacity(self.buf.len(), needed);
        let mut next = Vec::new();
        next.try_reserve_exact(capacity)?;
        next.resize(capacity, 0);
        self.buf = next;
        self.generation += 1;
        Ok(true)
    }
}

/// Steps of 1 MiB up to 8 MiB, then by half again, until `needed` fits.
pub(crate) fn next_capacity(current: usize, needed: usize) -> usize {
    let mut size = current.max(1);
    while size < needed {
        if size <= LINEAR_LIMIT {
            size += LINEAR_STEP;
        } else {
            size += size >> 1;
        }
    }
    size
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_then_geometric_growth() {
        assert_eq!(next_capacity(0x40_0000, 0x40_0001), 0x50_0000);
        assert_eq!(next_capacity(0x40_0000, 0x80_0000), 0x80_0000);
        assert_eq!(next_capacity(0x80_0000, 0x80_0001), 0x90_0000);
        // Past 8 MiB each step adds half.
        assert_eq!(next_capacity(0x90_0000, 0x90_0001), 0xd8_0000);
        assert_eq!(next_capacity(1024, 10), 1024);
    }

    #[test]
    fn test_grow_bumps_generation() {
        let mut scratch = Scratch::new(1024);
        let before = scratch.view();
        assert!(!scratch.grow_to(512).unwrap());
        assert_eq!(scratch.view(), before);

        assert!(scratch.grow_to(4096).unwrap());
        let after = scratch.view();
        assert_eq!(after.generation, before.generation + 1);
        assert_eq!(after.capacity, 1024 + LINEAR_STEP);
        assert_eq!(scratch.as_mut_slice().len(), after.capacity);
    }
}
