//! BLAKE3 hashing primitives for content hashes and Merkle combination

use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;

/// 32-byte BLAKE3 digest; also used for Merkle and fingerprint hashes
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Blake3Hash([u8; 32]);

/// Error returned when parsing a hash from its hex form
#[derive(Debug, thiserror::Error)]
pub enum HashParseError {
    #[error("invalid hex length: expected 64 characters, got {0}")]
    InvalidLength(usize),
    #[error("invalid hex digest")]
    InvalidHex(#[from] hex::FromHexError),
}

impl Blake3Hash {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex, 64 characters
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, HashParseError> {
        if hex_str.len() != 64 {
            return Err(HashParseError::InvalidLength(hex_str.len()));
        }
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(hex_str, &mut bytes)?;
        Ok(Self(bytes))
    }

    /// Reserved hash that no real BLAKE3 digest is expected to produce.
    ///
    /// Used for signatures of entries that have no content of their own.
    const fn signature(tag: u8) -> Self {
        let mut bytes = [0xffu8; 32];
        bytes[0] = 0x00;
        bytes[31] = tag;
        Self(bytes)
    }
}

/// Hash standing in for the content of a missing file
pub const MISSING_FILE_SIGNATURE: Blake3Hash = Blake3Hash::signature(0x01);

/// Hash standing in for the content of a directory inside a fingerprint
pub const DIR_SIGNATURE: Blake3Hash = Blake3Hash::signature(0x02);

impl std::fmt::Debug for Blake3Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Blake3Hash({})", self.to_hex())
    }
}

impl std::fmt::Display for Blake3Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

pub fn hash_bytes(data: &[u8]) -> Blake3Hash {
    Blake3Hash::from(blake3::hash(data))
}

impl From<blake3::Hash> for Blake3Hash {
    fn from(hash: blake3::Hash) -> Self {
        Self(*hash.as_bytes())
    }
}

/// Stream the file at `path` through the hasher
pub fn hash_file(path: &Path) -> io::Result<Blake3Hash> {
    let mut reader = io::BufReader::new(std::fs::File::open(path)?);
    let mut hasher = blake3::Hasher::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(hasher.finalize().into())
}

/// Hash through a read-only memory map, for files above the snapshotter's threshold
pub fn hash_file_mmap(path: &Path) -> io::Result<Blake3Hash> {
    use memmap2::Mmap;
    use std::fs::File;

    let file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        // Mapping an empty file fails on some platforms
        return Ok(hash_bytes(&[]));
    }
    // SAFETY: the mapping is read-only and dropped before returning. A
    // concurrent writer can only produce a torn digest, which the snapshotter
    // detects through its before/after metadata check.
    let mmap = unsafe { Mmap::map(&file)? };
    Ok(hash_bytes(&mmap))
}

/// Hasher for structured input such as Merkle children and fingerprint entries
pub struct IncrementalHasher {
    inner: blake3::Hasher,
}

impl IncrementalHasher {
    pub fn new() -> Self {
        Self {
            inner: blake3::Hasher::new(),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Update with a length-prefixed string, so that adjacent strings cannot run together
    pub fn update_str(&mut self, value: &str) {
        self.update_u64(value.len() as u64);
        self.inner.update(value.as_bytes());
    }

    /// Update with a little-endian u64
    pub fn update_u64(&mut self, value: u64) {
        self.inner.update(&value.to_le_bytes());
    }

    /// Update with a single tag byte
    pub fn update_u8(&mut self, value: u8) {
        self.inner.update(&[value]);
    }

    pub fn update_hash(&mut self, hash: &Blake3Hash) {
        self.inner.update(hash.as_bytes());
    }

    pub fn finalize(self) -> Blake3Hash {
        self.inner.finalize().into()
    }
}

impl Default for IncrementalHasher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::io::Write;

    #[test]
    fn test_hash_is_deterministic() {
        assert_eq!(hash_bytes(b"uptodate"), hash_bytes(b"uptodate"));
        assert_ne!(hash_bytes(b"uptodate"), hash_bytes(b"up-to-date"));
    }

    #[test]
    fn test_hex_form_parses_back() {
        let hash = hash_bytes(b"content");
        assert_eq!(hash.to_hex().len(), 64);
        assert_eq!(Blake3Hash::from_hex(&hash.to_hex()).unwrap(), hash);
    }

    #[test]
    fn test_hex_decoding_invalid_input() {
        assert!(matches!(
            Blake3Hash::from_hex("abc"),
            Err(HashParseError::InvalidLength(3))
        ));
        assert!(Blake3Hash::from_hex(&"g".repeat(64)).is_err());
    }

    #[test]
    fn test_chunked_input_matches_whole() {
        let mut hasher = IncrementalHasher::new();
        hasher.update(b"src/");
        hasher.update(b"main.rs");
        assert_eq!(hasher.finalize(), hash_bytes(b"src/main.rs"));
    }

    #[test]
    fn test_length_prefixed_strings_are_unambiguous() {
        let mut a = IncrementalHasher::new();
        a.update_str("ab");
        a.update_str("c");

        let mut b = IncrementalHasher::new();
        b.update_str("a");
        b.update_str("bc");

        assert_ne!(a.finalize(), b.finalize());
    }

    #[test]
    fn test_signatures_are_distinct() {
        assert_ne!(MISSING_FILE_SIGNATURE, DIR_SIGNATURE);
        assert_ne!(DIR_SIGNATURE, hash_bytes(b""));
    }

    #[test]
    fn test_hash_file_matches_bytes() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let file_path = temp_dir.path().join("test.txt");

        let data = b"test file content";
        std::fs::write(&file_path, data)?;

        assert_eq!(hash_file(&file_path)?, hash_bytes(data));
        assert_eq!(hash_file_mmap(&file_path)?, hash_bytes(data));
        Ok(())
    }

    #[test]
    fn test_hash_empty_file_mmap() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let file_path = temp_dir.path().join("empty");
        std::fs::write(&file_path, b"")?;

        assert_eq!(hash_file_mmap(&file_path)?, hash_bytes(b""));
        Ok(())
    }

    #[test]
    fn test_hash_large_file() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let file_path = temp_dir.path().join("large.bin");

        let mut file = std::fs::File::create(&file_path)?;
        let chunk = vec![0xAB; 1024 * 1024];
        for _ in 0..5 {
            file.write_all(&chunk)?;
        }
        drop(file);

        assert_eq!(hash_file(&file_path)?, hash_file_mmap(&file_path)?);
        Ok(())
    }
}
