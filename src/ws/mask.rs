//! Payload masking (RFC 6455 section 5.3).

use rand::RngCore;

/// XOR cipher over a 4-byte key. The cursor survives across [`Mask::apply`]
/// calls so a payload can be (un)masked in chunks.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Mask {
    key: [u8; 4],
    cursor: usize,
}

impl Mask {
    pub const fn new(key: [u8; 4]) -> Self {
        Self { key, cursor: 0 }
    }

    /// Creates a mask with a fresh key drawn from `rng`.
    pub fn generate<R: RngCore + ?Sized>(rng: &mut R) -> Self {
        Self::new(generate_mask_key(rng))
    }

    #[inline]
    pub const fn key(&self) -> [u8; 4] {
        self.key
    }

    #[inline]
    pub const fn cursor(&self) -> usize {
        self.cursor
    }

    /// Must be called at the start of every frame payload.
    #[inline]
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Masks (or unmasks) `data` in place and advances the cursor.
    #[inline]
    pub fn apply(&mut self, data: &mut [u8]) {
        let cursor = self.cursor;
        for (i, byte) in data.iter_mut().enumerate() {
            *byte ^= self.key[(cursor + i) & 3];
        }
        self.cursor = (cursor + data.len()) & 3;
    }
}

/// Draws a masking key. The key has to be unpredictable to the application
/// producing the payload, so `rng` should be a CSPRNG.
#[inline]
pub fn generate_mask_key<R: RngCore + ?Sized>(rng: &mut R) -> [u8; 4] {
    let mut key = [0u8; 4];
    rng.fill_bytes(&mut key);
    key
}
