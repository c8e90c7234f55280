// Content hashing for file-backed evidence
//
// Streaming digests over MD5, SHA-1, SHA-256, SHA-512 and BLAKE3. SHA-256 is
// the default recorded with new evidence; the legacy digests exist so hashes
// supplied by outside collection tools can still be re-verified.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

use blake3::Hasher as Blake3Hasher;
use md5::Md5;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use sha2::{Sha256, Sha512};
use tracing::{debug, instrument};

use crate::error::{EngineError, EngineResult};

/// Read buffer for evidence files
const BUFFER_SIZE: usize = 1024 * 1024;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    #[default]
    Sha256,
    Sha512,
    Blake3,
}

impl HashAlgorithm {
    /// Storage key (lowercase, no punctuation)
    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "md5",
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha512 => "sha512",
            HashAlgorithm::Blake3 => "blake3",
        }
    }

    /// Display name used in reports
    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "MD5",
            HashAlgorithm::Sha1 => "SHA-1",
            HashAlgorithm::Sha256 => "SHA-256",
            HashAlgorithm::Sha512 => "SHA-512",
            HashAlgorithm::Blake3 => "BLAKE3",
        }
    }

    /// Expected digest length in hex characters
    pub fn hex_len(&self) -> usize {
        match self {
            HashAlgorithm::Md5 => 32,
            HashAlgorithm::Sha1 => 40,
            HashAlgorithm::Sha256 => 64,
            HashAlgorithm::Sha512 => 128,
            HashAlgorithm::Blake3 => 64,
        }
    }
}

impl FromStr for HashAlgorithm {
    type Err = EngineError;

    fn from_str(algorithm: &str) -> Result<Self, Self::Err> {
        match algorithm.trim().to_lowercase().as_str() {
            "md5" => Ok(HashAlgorithm::Md5),
            "sha1" | "sha-1" => Ok(HashAlgorithm::Sha1),
            "sha256" | "sha-256" => Ok(HashAlgorithm::Sha256),
            "sha512" | "sha-512" => Ok(HashAlgorithm::Sha512),
            "blake3" => Ok(HashAlgorithm::Blake3),
            _ => Err(EngineError::validation(format!(
                "Unsupported hash algorithm: '{}'. Supported: md5, sha1, sha256, sha512, blake3",
                algorithm
            ))),
        }
    }
}

/// Incremental hasher over any supported algorithm
pub enum ContentHasher {
    Md5(Md5),
    Sha1(Sha1),
    Sha256(Sha256),
    Sha512(Sha512),
    Blake3(Box<Blake3Hasher>),
}

impl ContentHasher {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Md5 => ContentHasher::Md5(Md5::new()),
            HashAlgorithm::Sha1 => ContentHasher::Sha1(Sha1::new()),
            HashAlgorithm::Sha256 => ContentHasher::Sha256(Sha256::new()),
            HashAlgorithm::Sha512 => ContentHasher::Sha512(Sha512::new()),
            HashAlgorithm::Blake3 => ContentHasher::Blake3(Box::new(Blake3Hasher::new())),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            ContentHasher::Md5(h) => Digest::update(h, data),
            ContentHasher::Sha1(h) => Digest::update(h, data),
            ContentHasher::Sha256(h) => Digest::update(h, data),
            ContentHasher::Sha512(h) => Digest::update(h, data),
            ContentHasher::Blake3(h) => {
                h.update(data);
            }
        }
    }

    /// Finalize and return the digest as lowercase hex
    pub fn finalize(self) -> String {
        match self {
            ContentHasher::Md5(h) => hex::encode(h.finalize()),
            ContentHasher::Sha1(h) => hex::encode(h.finalize()),
            ContentHasher::Sha256(h) => hex::encode(h.finalize()),
            ContentHasher::Sha512(h) => hex::encode(h.finalize()),
            ContentHasher::Blake3(h) => h.finalize().to_hex().to_string(),
        }
    }
}

/// One-shot digest of an in-memory buffer
pub fn compute_hash(data: &[u8], algorithm: HashAlgorithm) -> String {
    let mut hasher = ContentHasher::new(algorithm);
    hasher.update(data);
    hasher.finalize()
}

/// Stream a file through the hasher
#[instrument(skip_all, fields(path = %path.display(), algorithm = algorithm.name()))]
pub fn hash_file(path: &Path, algorithm: HashAlgorithm) -> EngineResult<String> {
    if !path.exists() {
        return Err(EngineError::not_found("Evidence file", path.display().to_string()));
    }

    let file = File::open(path)?;
    let mut reader = BufReader::with_capacity(BUFFER_SIZE, file);
    let mut hasher = ContentHasher::new(algorithm);
    let mut total = 0u64;

    loop {
        let buf = reader.fill_buf()?;
        let len = buf.len();
        if len == 0 {
            break;
        }
        hasher.update(buf);
        reader.consume(len);
        total += len as u64;
    }

    let hash = hasher.finalize();
    debug!(bytes = total, hash = %hash, "Evidence file hashed");
    Ok(hash)
}

/// Well-formed hex digest for the algorithm
pub fn is_valid_hash(digest: &str, algorithm: HashAlgorithm) -> bool {
    digest.len() == algorithm.hex_len() && digest.chars().all(|c| c.is_ascii_hexdigit())
}

/// Case-insensitive digest comparison
pub fn hashes_match(recorded: &str, actual: &str) -> bool {
    recorded.trim().eq_ignore_ascii_case(actual.trim())
}
