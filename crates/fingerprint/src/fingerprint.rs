//! Normalized, hashable summaries of file collections

use crate::normalizer::EntryOrdering;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uptodate_core::{Blake3Hash, FileSystemSnapshot, FileType, IncrementalHasher};

const FINGERPRINT_DOMAIN: &[u8] = b"uptodate:fingerprint:v1";
const COLLISION_DOMAIN: &[u8] = b"uptodate:collision:v1";

/// One normalized entry of a fingerprint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintEntry {
    pub absolute_path: PathBuf,
    pub content_hash: Blake3Hash,
    pub file_type: FileType,
}

/// Immutable fingerprint of a file collection
///
/// Keys are unique. Equality compares only the combined hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileCollectionFingerprint {
    entries: IndexMap<String, FingerprintEntry>,
    ordering: EntryOrdering,
    hash: Blake3Hash,
}

static EMPTY: Lazy<FileCollectionFingerprint> = Lazy::new(|| FileCollectionFingerprint {
    entries: IndexMap::new(),
    ordering: EntryOrdering::Unordered,
    hash: empty_hash(),
});

fn empty_hash() -> Blake3Hash {
    let mut hasher = IncrementalHasher::new();
    hasher.update(FINGERPRINT_DOMAIN);
    hasher.update(b"empty");
    hasher.finalize()
}

impl FileCollectionFingerprint {
    /// The fingerprint of a collection without entries
    pub fn empty() -> Self {
        EMPTY.clone()
    }

    /// Shared instance of [`FileCollectionFingerprint::empty`]
    pub fn empty_ref() -> &'static Self {
        &EMPTY
    }

    pub fn entries(&self) -> &IndexMap<String, FingerprintEntry> {
        &self.entries
    }

    pub fn get(&self, key: &str) -> Option<&FingerprintEntry> {
        self.entries.get(key)
    }

    pub fn ordering(&self) -> EntryOrdering {
        self.ordering
    }

    pub fn hash(&self) -> Blake3Hash {
        self.hash
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Absolute paths of every entry, in entry order
    pub fn absolute_paths(&self) -> impl Iterator<Item = &Path> {
        self.entries.values().map(|entry| entry.absolute_path.as_path())
    }
}

impl PartialEq for FileCollectionFingerprint {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for FileCollectionFingerprint {}

impl Default for FileCollectionFingerprint {
    fn default() -> Self {
        Self::empty()
    }
}

/// Accumulates entries in visit order and computes the combined hash
pub struct FingerprintBuilder {
    entries: IndexMap<String, FingerprintEntry>,
    colliding: IndexMap<String, Vec<FingerprintEntry>>,
    ordering: EntryOrdering,
    collisions: usize,
}

impl FingerprintBuilder {
    pub fn new(ordering: EntryOrdering) -> Self {
        Self {
            entries: IndexMap::new(),
            colliding: IndexMap::new(),
            ordering,
            collisions: 0,
        }
    }

    /// Add an entry under `key`
    ///
    /// A repeated key keeps its first position. Order-sensitive
    /// fingerprints fold the new content hash into the existing one as
    /// they arrive. Unordered fingerprints fold every colliding hash in
    /// sorted order on [`build`](Self::build) and keep the entry with the
    /// smallest absolute path.
    pub fn add(&mut self, key: String, entry: FingerprintEntry) {
        let Some(existing) = self.entries.get_mut(&key) else {
            self.entries.insert(key, entry);
            return;
        };
        self.collisions += 1;
        match self.ordering {
            EntryOrdering::OrderSensitive => {
                existing.content_hash = fold_hashes([existing.content_hash, entry.content_hash]);
            }
            EntryOrdering::Unordered => {
                self.colliding
                    .entry(key)
                    .or_insert_with(|| vec![existing.clone()])
                    .push(entry);
            }
        }
    }

    /// Number of entries folded into an existing key
    pub fn collisions(&self) -> usize {
        self.collisions
    }

    pub fn build(mut self) -> FileCollectionFingerprint {
        for (key, mut group) in std::mem::take(&mut self.colliding) {
            group.sort_by(|a, b| a.absolute_path.cmp(&b.absolute_path));
            let mut hashes: Vec<_> = group.iter().map(|entry| entry.content_hash).collect();
            hashes.sort();
            if let (Some(slot), Some(first)) = (self.entries.get_mut(&key), group.into_iter().next()) {
                *slot = FingerprintEntry {
                    content_hash: fold_hashes(hashes),
                    ..first
                };
            }
        }

        if self.entries.is_empty() {
            return FileCollectionFingerprint::empty();
        }

        let mut hasher = IncrementalHasher::new();
        hasher.update(FINGERPRINT_DOMAIN);
        hasher.update_u8(match self.ordering {
            EntryOrdering::Unordered => 0,
            EntryOrdering::OrderSensitive => 1,
        });
        hasher.update_u64(self.entries.len() as u64);

        let mut hash_entry = |key: &str, entry: &FingerprintEntry| {
            hasher.update_str(key);
            hasher.update_u8(entry.file_type.tag());
            hasher.update_hash(&entry.content_hash);
        };
        match self.ordering {
            EntryOrdering::OrderSensitive => {
                for (key, entry) in &self.entries {
                    hash_entry(key, entry);
                }
            }
            EntryOrdering::Unordered => {
                let mut sorted: Vec<_> = self.entries.iter().collect();
                sorted.sort_by(|a, b| a.0.cmp(b.0));
                for (key, entry) in sorted {
                    hash_entry(key, entry);
                }
            }
        }

        FileCollectionFingerprint {
            entries: self.entries,
            ordering: self.ordering,
            hash: hasher.finalize(),
        }
    }
}

fn fold_hashes(hashes: impl IntoIterator<Item = Blake3Hash>) -> Blake3Hash {
    let mut hasher = IncrementalHasher::new();
    hasher.update(COLLISION_DOMAIN);
    for hash in hashes {
        hasher.update_hash(&hash);
    }
    hasher.finalize()
}

/// A fingerprint together with the live snapshot it was computed from
#[derive(Debug, Clone)]
pub struct CurrentFileCollectionFingerprint {
    fingerprint: FileCollectionFingerprint,
    snapshot: FileSystemSnapshot,
}

impl CurrentFileCollectionFingerprint {
    pub fn new(fingerprint: FileCollectionFingerprint, snapshot: FileSystemSnapshot) -> Self {
        Self {
            fingerprint,
            snapshot,
        }
    }

    pub fn empty() -> Self {
        Self::new(FileCollectionFingerprint::empty(), FileSystemSnapshot::empty())
    }

    pub fn fingerprint(&self) -> &FileCollectionFingerprint {
        &self.fingerprint
    }

    pub fn snapshot(&self) -> &FileSystemSnapshot {
        &self.snapshot
    }

    pub fn hash(&self) -> Blake3Hash {
        self.fingerprint.hash()
    }

    pub fn is_empty(&self) -> bool {
        self.fingerprint.is_empty()
    }

    pub fn into_fingerprint(self) -> FileCollectionFingerprint {
        self.fingerprint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uptodate_core::hash::hash_bytes;

    fn entry(path: &str, content: &[u8]) -> FingerprintEntry {
        FingerprintEntry {
            absolute_path: PathBuf::from(path),
            content_hash: hash_bytes(content),
            file_type: FileType::RegularFile,
        }
    }

    fn build(ordering: EntryOrdering, items: &[(&str, &[u8])]) -> FileCollectionFingerprint {
        let mut builder = FingerprintBuilder::new(ordering);
        for (key, content) in items {
            builder.add(key.to_string(), entry(&format!("/{key}"), content));
        }
        builder.build()
    }

    #[test]
    fn test_empty_is_distinguished() {
        let empty = FileCollectionFingerprint::empty();
        assert!(empty.is_empty());
        assert_eq!(empty, *FileCollectionFingerprint::empty_ref());
        assert_eq!(FingerprintBuilder::new(EntryOrdering::OrderSensitive).build(), empty);
        assert_ne!(build(EntryOrdering::Unordered, &[("a", b"")]), empty);
    }

    #[test]
    fn test_unordered_ignores_insertion_order() {
        let forward = build(EntryOrdering::Unordered, &[("p", b"1"), ("q", b"2")]);
        let backward = build(EntryOrdering::Unordered, &[("q", b"2"), ("p", b"1")]);
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_order_sensitive_distinguishes_order() {
        let forward = build(EntryOrdering::OrderSensitive, &[("p", b"1"), ("q", b"2")]);
        let backward = build(EntryOrdering::OrderSensitive, &[("q", b"2"), ("p", b"1")]);
        assert_ne!(forward, backward);
        let keys: Vec<_> = backward.entries().keys().cloned().collect();
        assert_eq!(keys, vec!["q", "p"]);
    }

    #[test]
    fn test_equality_uses_combined_hash() {
        let a = build(EntryOrdering::Unordered, &[("a", b"1")]);
        let b = build(EntryOrdering::Unordered, &[("a", b"2")]);
        assert_ne!(a, b);
        assert_eq!(a.hash(), a.clone().hash());
    }

    #[test]
    fn test_colliding_keys_fold_content() {
        let mut builder = FingerprintBuilder::new(EntryOrdering::Unordered);
        builder.add("same".into(), entry("/one/same", b"1"));
        builder.add("same".into(), entry("/two/same", b"2"));
        assert_eq!(builder.collisions(), 1);
        let folded = builder.build();

        assert_eq!(folded.len(), 1);
        let kept = folded.get("same").unwrap();
        assert_eq!(kept.absolute_path, PathBuf::from("/one/same"));
        assert_eq!(kept.content_hash, fold_hashes({
            let mut hashes = [hash_bytes(b"1"), hash_bytes(b"2")];
            hashes.sort();
            hashes
        }));
        assert_ne!(kept.content_hash, hash_bytes(b"1"));

        // A change in the second colliding file changes the fingerprint
        let mut changed = FingerprintBuilder::new(EntryOrdering::Unordered);
        changed.add("same".into(), entry("/one/same", b"1"));
        changed.add("same".into(), entry("/two/same", b"3"));
        assert_ne!(folded, changed.build());
    }

    #[test]
    fn test_unordered_collisions_ignore_arrival_order() {
        let mut forward = FingerprintBuilder::new(EntryOrdering::Unordered);
        forward.add("same".into(), entry("/b/same", b"2"));
        forward.add("same".into(), entry("/a/same", b"1"));
        forward.add("same".into(), entry("/c/same", b"3"));
        let mut backward = FingerprintBuilder::new(EntryOrdering::Unordered);
        backward.add("same".into(), entry("/c/same", b"3"));
        backward.add("same".into(), entry("/a/same", b"1"));
        backward.add("same".into(), entry("/b/same", b"2"));

        let (forward, backward) = (forward.build(), backward.build());
        assert_eq!(forward, backward);
        assert_eq!(forward.get("same"), backward.get("same"));
        assert_eq!(forward.get("same").unwrap().absolute_path, PathBuf::from("/a/same"));
    }

    #[test]
    fn test_order_sensitive_collisions_follow_arrival_order() {
        let mut forward = FingerprintBuilder::new(EntryOrdering::OrderSensitive);
        forward.add("same".into(), entry("/a/same", b"1"));
        forward.add("same".into(), entry("/b/same", b"2"));
        let mut backward = FingerprintBuilder::new(EntryOrdering::OrderSensitive);
        backward.add("same".into(), entry("/b/same", b"2"));
        backward.add("same".into(), entry("/a/same", b"1"));
        assert_ne!(forward.build(), backward.build());
    }
}
