use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use crate::keys::KEY_LEN;
use crate::{ChunkMac, Error, Hasher, Result};

const READ_BUFFER: usize = 1 << 20;

/// Streaming reader that feeds everything it reads into a digest.
pub struct VerifiedReader<R, H> {
    reader: R,
    hasher: H,
    consumed: u64,
}

impl<R, H> VerifiedReader<R, H> {
    pub fn new(reader: R, hasher: H) -> Self {
        Self {
            reader,
            hasher,
            consumed: 0,
        }
    }

    pub fn consumed(&self) -> u64 {
        self.consumed
    }
}

impl<R: Read, H: Hasher> VerifiedReader<R, H> {
    /// Read data, hashing it in place.
    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.reader.read(buf)?;
        if n > 0 {
            self.hasher.update(&buf[..n]);
            self.consumed += n as u64;
        }
        Ok(n)
    }

    /// Drain the reader, calling `on_progress` with the running total after every read.
    pub fn drain(&mut self, mut on_progress: impl FnMut(u64)) -> io::Result<u64> {
        let mut buf = vec![0u8; READ_BUFFER];
        loop {
            match self.read(&mut buf) {
                Ok(0) => return Ok(self.consumed),
                Ok(_) => on_progress(self.consumed),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Finalize against the expected digest.
    pub fn finish(self, expected: &[u8]) -> Result<()> {
        let actual = self.hasher.finalize();
        if actual == expected {
            Ok(())
        } else {
            Err(Error::IntegrityMismatch {
                expected: hex::encode(expected),
                actual: hex::encode(actual),
            })
        }
    }
}

/// Authenticate a decrypted file on disk against its expected tag.
///
/// `on_progress` receives the number of bytes verified so far, monotonically increasing.
pub fn verify_file(
    path: &Path,
    key: &[u8; KEY_LEN],
    nonce: &[u8; 8],
    expected: &[u8; 8],
    on_progress: impl FnMut(u64),
) -> Result<u64> {
    let file = File::open(path)?;
    let mut reader = VerifiedReader::new(file, ChunkMac::new(key, nonce));
    let total = reader.drain(on_progress)?;
    reader.finish(expected)?;
    Ok(total)
}
