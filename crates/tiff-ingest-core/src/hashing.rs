//! Content fingerprints.
//!
//! A file's fingerprint is the lowercase hex digest of its full byte content.
//! Files are streamed in fixed-size chunks so arbitrarily large scans never
//! have to be held in memory, and every call builds its own hashing context.

use std::fmt;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;

const CHUNK_SIZE: usize = 8 * 1024;

/// Digest algorithm used for content fingerprints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// SHA-256, the format existing manifests are written in
    Sha256,

    /// BLAKE3
    Blake3,
}

/// Lowercase hex encoded content digest
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash(String);

impl ContentHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ContentHash {
    fn from(value: String) -> Self {
        Self(value)
    }
}

enum Context {
    Sha256(Sha256),
    Blake3(Box<blake3::Hasher>),
}

impl Context {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
            HashAlgorithm::Blake3 => Self::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    fn update(&mut self, bytes: &[u8]) {
        match self {
            Self::Sha256(h) => h.update(bytes),
            Self::Blake3(h) => {
                h.update(bytes);
            }
        }
    }

    fn finalize(self) -> ContentHash {
        let hex = match self {
            Self::Sha256(h) => format!("{:x}", h.finalize()),
            Self::Blake3(h) => h.finalize().to_hex().to_string(),
        };
        ContentHash(hex)
    }
}

/// Hash everything `reader` yields until end of stream
pub fn hash_reader<R: Read>(mut reader: R, algorithm: HashAlgorithm) -> Result<ContentHash> {
    let mut context = Context::new(algorithm);
    let mut buffer = [0u8; CHUNK_SIZE];

    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        context.update(&buffer[..bytes_read]);
    }

    Ok(context.finalize())
}

/// Compute the content hash of the file at `path`
pub fn compute_content_hash<P: AsRef<Path>>(path: P, algorithm: HashAlgorithm) -> Result<ContentHash> {
    // File is closed as soon as hashing returns
    let file = File::open(path.as_ref())?;
    hash_reader(file, algorithm)
}
