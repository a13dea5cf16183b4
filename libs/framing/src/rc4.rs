//! RC4 keystream.
//!
//! Used as a lightweight stream obfuscation layer, never as real security.
//! Each direction of a connection owns its own state, and the keystream
//! advances by exactly the number of bytes passed through it.

use crate::FramingError;

/// Longest key the key schedule consumes.
pub const MAX_KEY_LEN: usize = 256;

/// RC4 cipher state.
#[derive(Clone)]
pub struct Rc4 {
    sbox: [u8; 256],
    x: u8,
    y: u8,
}

impl Rc4 {
    /// Runs the key schedule. Keys must be 1 to 256 bytes.
    pub fn new(key: &[u8]) -> Result<Self, FramingError> {
        if key.is_empty() || key.len() > MAX_KEY_LEN {
            return Err(FramingError::InvalidKeyLength(key.len()));
        }

        let mut sbox = [0u8; 256];
        for (i, b) in sbox.iter_mut().enumerate() {
            *b = i as u8;
        }
        let mut j = 0u8;
        for i in 0..256 {
            j = j.wrapping_add(sbox[i]).wrapping_add(key[i % key.len()]);
            sbox.swap(i, j as usize);
        }

        Ok(Self { sbox, x: 0, y: 0 })
    }

    /// XORs `data` with the next `data.len()` keystream bytes, in place.
    pub fn apply(&mut self, data: &mut [u8]) {
        for byte in data {
            *byte ^= self.next_byte();
        }
    }

    fn next_byte(&mut self) -> u8 {
        self.x = self.x.wrapping_add(1);
        let a = self.sbox[self.x as usize];
        self.y = self.y.wrapping_add(a);
        self.sbox.swap(self.x as usize, self.y as usize);
        let k = self.sbox[self.x as usize].wrapping_add(self.sbox[self.y as usize]);
        self.sbox[k as usize]
    }
}

impl std::fmt::Debug for Rc4 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rc4").finish_non_exhaustive()
    }
}
