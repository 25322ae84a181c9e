use aes::Aes128;
use aes::cipher::{KeyIvInit, StreamCipher as _};

use crate::keys::KEY_LEN;

type Aes128Ctr = ctr::Ctr128BE<Aes128>;

const BLOCK: u64 = 16;

/// AES-128-CTR positioned at an arbitrary byte offset of the content stream.
///
/// The counter is the full 128-bit IV, incremented big-endian once per 16-byte block.
pub struct StreamCipher {
    inner: Aes128Ctr,
    position: u64,
}

impl StreamCipher {
    pub fn new(key: &[u8; KEY_LEN], iv: &[u8; 16]) -> Self {
        Self::seek(key, iv, 0)
    }

    /// Build a cipher whose next output byte is keystream byte `offset`.
    ///
    /// The counter block for `offset / 16` is computed directly, then `offset % 16` keystream
    /// bytes are discarded so the cipher sits mid-block exactly where the stream does.
    pub fn seek(key: &[u8; KEY_LEN], iv: &[u8; 16], offset: u64) -> Self {
        let counter = counter_at(iv, offset / BLOCK);
        let mut inner = Aes128Ctr::new(key.into(), (&counter).into());

        let skip = (offset % BLOCK) as usize;
        if skip > 0 {
            let mut scratch = [0u8; BLOCK as usize];
            inner.apply_keystream(&mut scratch[..skip]);
        }

        Self { inner, position: offset }
    }

    /// Encrypt or decrypt `buf` in place and advance.
    pub fn apply(&mut self, buf: &mut [u8]) {
        self.inner.apply_keystream(buf);
        self.position += buf.len() as u64;
    }

    /// Absolute stream offset of the next byte.
    pub fn position(&self) -> u64 {
        self.position
    }
}

/// Counter block for block index `block`: the IV read as a big-endian integer plus `block`,
/// carrying across all 16 bytes and wrapping at 2^128.
pub fn counter_at(iv: &[u8; 16], block: u64) -> [u8; 16] {
    u128::from_be_bytes(*iv).wrapping_add(u128::from(block)).to_be_bytes()
}
