use aes::Aes128;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};

use crate::keys::KEY_LEN;
use crate::{Error, Result};

/// Size increment of MAC chunks: chunk `i` spans `min(i + 1, 8) * CHUNK_UNIT` bytes.
pub const CHUNK_UNIT: u64 = 131_072;

const MAX_CHUNK_UNITS: u64 = 8;
const BLOCK: usize = 16;

/// Incremental digest fed with slices of any size.
pub trait Hasher: Send {
    fn update(&mut self, data: &[u8]);
    fn finalize(self) -> Vec<u8>;
}

/// Length of MAC chunk `index` (0-based).
pub fn chunk_size(index: u64) -> u64 {
    (index + 1).min(MAX_CHUNK_UNITS) * CHUNK_UNIT
}

/// Streaming chunked CBC-MAC over decrypted content.
///
/// Each chunk is CBC-MACed with AES-128 starting from `nonce || nonce`; every closed chunk MAC
/// is folded into a running meta-MAC. The 8-byte tag is the meta-MAC's two halves, each folded
/// by XOR of its 32-bit words.
pub struct ChunkMac {
    cipher: Aes128,
    seed: [u8; BLOCK],
    chunk: [u8; BLOCK],
    meta: [u8; BLOCK],
    position: u64,
    chunk_start: u64,
    chunk_index: u64,
    boundary: u64,
    chunks_closed: u64,
}

impl ChunkMac {
    pub fn new(key: &[u8; KEY_LEN], nonce: &[u8; 8]) -> Self {
        let mut seed = [0u8; BLOCK];
        seed[..8].copy_from_slice(nonce);
        seed[8..].copy_from_slice(nonce);

        Self {
            cipher: Aes128::new(key.into()),
            seed,
            chunk: seed,
            meta: [0u8; BLOCK],
            position: 0,
            chunk_start: 0,
            chunk_index: 0,
            boundary: chunk_size(0),
            chunks_closed: 0,
        }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Number of chunks folded into the meta-MAC so far.
    pub fn chunks_closed(&self) -> u64 {
        self.chunks_closed
    }

    pub fn update(&mut self, mut data: &[u8]) {
        while !data.is_empty() {
            let lane = (self.position % BLOCK as u64) as usize;

            if lane == 0 && data.len() >= BLOCK {
                // boundaries are block aligned, so a whole block never straddles one
                for (acc, byte) in self.chunk.iter_mut().zip(&data[..BLOCK]) {
                    *acc ^= byte;
                }
                self.position += BLOCK as u64;
                data = &data[BLOCK..];
                self.seal_block();
            } else {
                self.chunk[lane] ^= data[0];
                self.position += 1;
                data = &data[1..];
                if self.position % BLOCK as u64 == 0 {
                    self.seal_block();
                }
            }
        }
    }

    /// Close the stream and return the 8-byte tag.
    ///
    /// A trailing partial block is zero padded, which leaves the accumulator untouched, and a
    /// short final chunk is closed like a full one. An empty stream closes no chunk at all.
    pub fn finish(mut self) -> [u8; 8] {
        if self.position % BLOCK as u64 != 0 {
            self.position += BLOCK as u64 - self.position % BLOCK as u64;
            self.cipher.encrypt_block(GenericArray::from_mut_slice(&mut self.chunk));
        }
        if self.position > self.chunk_start {
            self.close_chunk();
        }

        let m = &self.meta;
        let mut tag = [0u8; 8];
        for i in 0..4 {
            tag[i] = m[i] ^ m[i + 4];
            tag[i + 4] = m[i + 8] ^ m[i + 12];
        }
        tag
    }

    /// Finish and compare against `expected`.
    pub fn verify(self, expected: &[u8; 8]) -> Result<()> {
        let actual = self.finish();
        if &actual == expected {
            Ok(())
        } else {
            Err(Error::IntegrityMismatch {
                expected: hex::encode(expected),
                actual: hex::encode(actual),
            })
        }
    }

    fn seal_block(&mut self) {
        self.cipher.encrypt_block(GenericArray::from_mut_slice(&mut self.chunk));
        if self.position == self.boundary {
            self.close_chunk();
        }
    }

    fn close_chunk(&mut self) {
        for (meta, chunk) in self.meta.iter_mut().zip(&self.chunk) {
            *meta ^= chunk;
        }
        self.cipher.encrypt_block(GenericArray::from_mut_slice(&mut self.meta));

        self.chunk = self.seed;
        self.chunks_closed += 1;
        self.chunk_index += 1;
        self.chunk_start = self.position;
        self.boundary = self.chunk_start + chunk_size(self.chunk_index);
    }
}

impl Hasher for ChunkMac {
    fn update(&mut self, data: &[u8]) {
        ChunkMac::update(self, data);
    }

    fn finalize(self) -> Vec<u8> {
        self.finish().to_vec()
    }
}
