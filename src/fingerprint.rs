use std::{
    fmt,
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{MarkError, Result};

const CHUNK_SIZE: usize = 8192;

/// Lowercase hex SHA-256 of a file's byte content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ContentDigest(String);

impl ContentDigest {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First `hex_chars` characters of the digest, clamped to its length.
    pub fn truncated(&self, hex_chars: usize) -> &str {
        &self.0[..hex_chars.min(self.0.len())]
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub struct ContentFingerprinter;

impl ContentFingerprinter {
    pub fn digest_file<P: AsRef<Path>>(path: P) -> Result<ContentDigest> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => MarkError::InputMissing(path.to_path_buf()),
            _ => MarkError::Io(e),
        })?;

        Self::digest_reader(BufReader::new(file))
    }

    /// Hashes the stream in fixed-size chunks; the stream is never buffered whole.
    pub fn digest_reader<R: Read>(mut reader: R) -> Result<ContentDigest> {
        let mut hasher = Sha256::new();
        let mut chunk = [0u8; CHUNK_SIZE];

        loop {
            let read = match reader.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            hasher.update(&chunk[..read]);
        }

        Ok(ContentDigest(hex::encode(hasher.finalize())))
    }
}

/// Bit sequence embedded into the frequency domain.
///
/// Each character of the truncated digest contributes its 8-bit ASCII code,
/// most significant bit first, so 16 hex characters yield 128 bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatermarkPayload {
    bits: Vec<u8>,
}

impl WatermarkPayload {
    pub fn from_digest(digest: &ContentDigest, hex_chars: usize) -> Self {
        let bits = digest
            .truncated(hex_chars)
            .bytes()
            .flat_map(|byte| (0..8).rev().map(move |shift| (byte >> shift) & 1))
            .collect();

        Self { bits }
    }

    pub fn bits(&self) -> &[u8] {
        &self.bits
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }
}
