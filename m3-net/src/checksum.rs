// m3-net/src/checksum.rs
//! Hash algorithms, digests and file verification.
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use m3_common::error::{M3Error, ResolutionError, Result};
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HashAlgorithm {
    Sha512,
    Sha256,
    Sha1,
    Md5,
    /// SHA-1 over a git blob header plus content; equals the object id git
    /// assigns to the same bytes.
    GitBlob,
}

impl HashAlgorithm {
    pub fn name(self) -> &'static str {
        match self {
            HashAlgorithm::Sha512 => "sha512",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Md5 => "md5",
            HashAlgorithm::GitBlob => "git",
        }
    }

    pub fn hasher(self) -> Hasher {
        match self {
            HashAlgorithm::Sha512 => Hasher::Sha512(Sha512::new()),
            HashAlgorithm::Sha256 => Hasher::Sha256(Sha256::new()),
            HashAlgorithm::Sha1 => Hasher::Sha1(Sha1::new()),
            HashAlgorithm::Md5 => Hasher::Md5(Md5::new()),
            HashAlgorithm::GitBlob => Hasher::GitBlob(GitBlobHasher::default()),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Running hash state for any supported algorithm.
pub enum Hasher {
    Sha512(Sha512),
    Sha256(Sha256),
    Sha1(Sha1),
    Md5(Md5),
    GitBlob(GitBlobHasher),
}

impl Hasher {
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Sha512(h) => h.update(data),
            Hasher::Sha256(h) => h.update(data),
            Hasher::Sha1(h) => h.update(data),
            Hasher::Md5(h) => h.update(data),
            Hasher::GitBlob(h) => h.update(data),
        }
    }

    pub fn finalize(self) -> Vec<u8> {
        match self {
            Hasher::Sha512(h) => h.finalize().to_vec(),
            Hasher::Sha256(h) => h.finalize().to_vec(),
            Hasher::Sha1(h) => h.finalize().to_vec(),
            Hasher::Md5(h) => h.finalize().to_vec(),
            Hasher::GitBlob(h) => h.finalize(),
        }
    }

    pub fn finalize_hex(self) -> String {
        hex::encode(self.finalize())
    }
}

impl Write for Hasher {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Buffers everything written to it; the header needs the total length,
/// so nothing can be hashed before finalization.
#[derive(Debug, Default, Clone)]
pub struct GitBlobHasher {
    buffer: Vec<u8>,
}

impl GitBlobHasher {
    pub fn update(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn finalize(self) -> Vec<u8> {
        let mut sha = Sha1::new();
        sha.update(format!("blob {}\0", self.buffer.len()).as_bytes());
        sha.update(&self.buffer);
        sha.finalize().to_vec()
    }
}

/// An expected digest. An empty `hex` means the file is accepted without
/// verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksum {
    pub algorithm: HashAlgorithm,
    pub hex: String,
}

impl Checksum {
    pub fn new(algorithm: HashAlgorithm, hex: impl Into<String>) -> Self {
        Self {
            algorithm,
            hex: hex.into().trim().to_ascii_lowercase(),
        }
    }

    pub fn unverified(algorithm: HashAlgorithm) -> Self {
        Self::new(algorithm, "")
    }

    pub fn is_empty(&self) -> bool {
        self.hex.is_empty()
    }

    /// Hex-decoded digest, `None` when empty or not valid hex.
    pub fn decode(&self) -> Option<Vec<u8>> {
        if self.is_empty() {
            return None;
        }
        hex::decode(&self.hex).ok()
    }

    pub fn matches_hex(&self, actual: &str) -> bool {
        self.hex.eq_ignore_ascii_case(actual)
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

/// Maps algorithm names to implementations and fixes the default algorithm.
/// Passed explicitly to everything that parses checksums or derives
/// identifiers.
#[derive(Debug, Clone)]
pub struct HashRegistry {
    default: HashAlgorithm,
    algorithms: BTreeMap<String, HashAlgorithm>,
}

impl HashRegistry {
    /// A registry containing only `default`.
    pub fn new(default: HashAlgorithm) -> Self {
        let mut algorithms = BTreeMap::new();
        algorithms.insert(default.name().to_string(), default);
        Self {
            default,
            algorithms,
        }
    }

    /// sha512, sha256, sha1, md5 and git, defaulting to sha256.
    pub fn standard() -> Self {
        Self::new(HashAlgorithm::Sha256)
            .with(HashAlgorithm::Sha512)
            .with(HashAlgorithm::Sha1)
            .with(HashAlgorithm::Md5)
            .with(HashAlgorithm::GitBlob)
    }

    pub fn with(mut self, algorithm: HashAlgorithm) -> Self {
        self.algorithms
            .insert(algorithm.name().to_string(), algorithm);
        self
    }

    pub fn default_algorithm(&self) -> HashAlgorithm {
        self.default
    }

    pub fn lookup(&self, name: &str) -> std::result::Result<HashAlgorithm, ResolutionError> {
        self.algorithms
            .get(name)
            .copied()
            .ok_or_else(|| ResolutionError::UnsupportedAlgorithm {
                record: String::new(),
                algorithm: name.to_string(),
            })
    }

    pub fn new_hash(&self, name: &str) -> std::result::Result<Hasher, ResolutionError> {
        self.lookup(name).map(HashAlgorithm::hasher)
    }

    /// Parses `"<algorithm>:<hex>"`; a value without a colon uses the
    /// default algorithm.
    pub fn parse_checksum(&self, raw: &str) -> std::result::Result<Checksum, ResolutionError> {
        match raw.split_once(':') {
            Some((name, hex)) => Ok(Checksum::new(self.lookup(name.trim())?, hex)),
            None => Ok(Checksum::new(self.default, raw)),
        }
    }

    /// First `n` hex characters of the default digest of `input`. Only used
    /// to derive short stable identifiers.
    pub fn digest(&self, input: &str, n: usize) -> String {
        let mut hasher = self.default.hasher();
        hasher.update(input.as_bytes());
        let mut hex = hasher.finalize_hex();
        hex.truncate(n);
        hex
    }
}

impl Default for HashRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

pub fn bytes_checksum(data: &[u8], algorithm: HashAlgorithm) -> String {
    let mut hasher = algorithm.hasher();
    hasher.update(data);
    hasher.finalize_hex()
}

pub fn file_digest(path: &Path, algorithm: HashAlgorithm) -> Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let mut hasher = algorithm.hasher();
    let bytes_copied = io::copy(&mut file, &mut hasher)?;
    let digest = hasher.finalize();
    debug!(
        "Calculated {} of {}: {} ({} bytes read)",
        algorithm,
        path.display(),
        hex::encode(&digest),
        bytes_copied
    );
    Ok(digest)
}

pub fn file_checksum(path: &Path, algorithm: HashAlgorithm) -> Result<String> {
    file_digest(path, algorithm).map(hex::encode)
}

/// Compares a file against `checksum` without touching it. An empty
/// checksum always matches.
pub fn file_matches(path: &Path, checksum: &Checksum) -> Result<bool> {
    if checksum.is_empty() {
        return Ok(true);
    }
    let actual = file_checksum(path, checksum.algorithm)?;
    Ok(checksum.matches_hex(&actual))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Matched,
    /// No checksum was given; the file is kept as-is.
    Unverified,
    /// The digest did not match and the file has been deleted.
    Purged,
}

/// Verifies `path` against `checksum` and deletes the file on mismatch.
/// Callers must expect the file to be gone when this returns `Purged`.
pub fn verify_and_purge(path: &Path, checksum: &Checksum) -> Result<Verification> {
    if checksum.is_empty() {
        debug!("No checksum for {}, accepting as-is", path.display());
        return Ok(Verification::Unverified);
    }
    let actual = file_checksum(path, checksum.algorithm)?;
    if checksum.matches_hex(&actual) {
        return Ok(Verification::Matched);
    }
    debug!(
        "Checksum mismatch for {}: expected {}, got {}. Removing.",
        path.display(),
        checksum,
        actual
    );
    fs::remove_file(path).map_err(|e| {
        M3Error::IoError(format!(
            "Failed to remove mismatched file {}: {}",
            path.display(),
            e
        ))
    })?;
    Ok(Verification::Purged)
}
