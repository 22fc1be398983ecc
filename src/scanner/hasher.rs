//! Content fingerprinting: a cheap CRC32 checksum followed by a
//! collision-resistant confirmation digest.
//!
//! # Overview
//!
//! The checksum only narrows candidates. Two files are reported as
//! duplicates when their sizes, checksums and digests all agree.
//! All readers stream in [`CHUNK_SIZE`] blocks, so memory use does not
//! depend on file size.
//!
//! # Example
//!
//! ```
//! use dupsweep::scanner::{fingerprint, DigestAlgorithm};
//!
//! let a = fingerprint(b"hello", DigestAlgorithm::Blake3);
//! let b = fingerprint(b"hello", DigestAlgorithm::Blake3);
//! assert_eq!(a, b);
//! ```

use std::io::{self, Read};

use serde::{Deserialize, Serialize};
use sha2::Digest as _;

/// Read buffer size for streaming hashes (64 KiB).
pub const CHUNK_SIZE: usize = 64 * 1024;

/// First-stage checksum (CRC32).
pub type Checksum = u32;

/// 256-bit confirmation digest.
pub type Digest = [u8; 32];

/// Algorithm used for the confirmation digest.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    /// BLAKE3 (default, fastest)
    #[default]
    Blake3,
    /// SHA-256
    Sha256,
}

impl std::fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blake3 => write!(f, "blake3"),
            Self::Sha256 => write!(f, "sha256"),
        }
    }
}

/// Checksum and digest of one byte sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    /// CRC32 of the content
    pub checksum: Checksum,
    /// Confirmation digest of the content
    pub digest: Digest,
}

enum DigestState {
    Blake3(Box<blake3::Hasher>),
    Sha256(sha2::Sha256),
}

impl DigestState {
    fn new(algorithm: DigestAlgorithm) -> Self {
        match algorithm {
            DigestAlgorithm::Blake3 => Self::Blake3(Box::new(blake3::Hasher::new())),
            DigestAlgorithm::Sha256 => Self::Sha256(sha2::Sha256::new()),
        }
    }

    fn update(&mut self, bytes: &[u8]) {
        match self {
            Self::Blake3(hasher) => {
                hasher.update(bytes);
            }
            Self::Sha256(hasher) => hasher.update(bytes),
        }
    }

    fn finalize(self) -> Digest {
        match self {
            Self::Blake3(hasher) => *hasher.finalize().as_bytes(),
            Self::Sha256(hasher) => {
                let mut digest = [0u8; 32];
                digest.copy_from_slice(&hasher.finalize());
                digest
            }
        }
    }
}

/// Fingerprint an in-memory byte sequence.
///
/// Pure: the same bytes always produce the same result.
#[must_use]
pub fn fingerprint(bytes: &[u8], algorithm: DigestAlgorithm) -> Fingerprint {
    let mut state = DigestState::new(algorithm);
    state.update(bytes);
    Fingerprint {
        checksum: crc32fast::hash(bytes),
        digest: state.finalize(),
    }
}

/// Feed every chunk of `reader` to `sink`, returning the number of bytes read.
fn stream_chunks<R: Read>(mut reader: R, mut sink: impl FnMut(&[u8])) -> io::Result<u64> {
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        match reader.read(&mut buffer) {
            Ok(0) => return Ok(total),
            Ok(n) => {
                sink(&buffer[..n]);
                total += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
}

/// Stream a CRC32 over `reader`. Returns the checksum and the byte count.
///
/// # Errors
///
/// Propagates read errors.
pub fn checksum_reader<R: Read>(reader: R) -> io::Result<(Checksum, u64)> {
    let mut hasher = crc32fast::Hasher::new();
    let len = stream_chunks(reader, |chunk| hasher.update(chunk))?;
    Ok((hasher.finalize(), len))
}

/// Stream a confirmation digest over `reader`. Returns the digest and the
/// byte count.
///
/// # Errors
///
/// Propagates read errors.
pub fn digest_reader<R: Read>(reader: R, algorithm: DigestAlgorithm) -> io::Result<(Digest, u64)> {
    let mut state = DigestState::new(algorithm);
    let len = stream_chunks(reader, |chunk| state.update(chunk))?;
    Ok((state.finalize(), len))
}

/// Format a digest as lowercase hex.
#[must_use]
pub fn hash_to_hex(digest: &Digest) -> String {
    use std::fmt::Write;
    digest.iter().fold(String::with_capacity(64), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}
