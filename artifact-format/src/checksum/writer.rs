use std::io::{self, Write};

use sha2::{Digest, Sha256};

/// A `Write` tee that forwards every byte to an inner sink while updating a
/// running SHA-256 digest. Generalizes `hash_on_disk_sha256`'s chunked
/// hashing loop into a streaming writer so it can sit inline in a tar/
/// compressor pipeline instead of re-reading a finished file from disk.
pub struct WriterChecksum<W> {
    inner: W,
    hasher: Sha256,
}

impl<W: Write> WriterChecksum<W> {
    pub fn new(inner: W) -> Self {
        WriterChecksum {
            inner,
            hasher: Sha256::new(),
        }
    }

    /// Lowercase hex digest of everything written so far.
    pub fn checksum(&self) -> String {
        hex::encode(self.hasher.clone().finalize())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for WriterChecksum<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_matches_known_vector() {
        let mut w = WriterChecksum::new(Vec::new());
        w.write_all(b"data").unwrap();
        assert_eq!(w.checksum(), "3a6eb0790f39ac87c94f3856b2dd2c5d110e6811602261a9a923d3bb23adc8b7");
    }
}
