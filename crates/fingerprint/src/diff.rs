//! Key-level differences between two fingerprints

use crate::fingerprint::{FileCollectionFingerprint, FingerprintEntry};
use crate::normalizer::EntryOrdering;

/// A single key-level difference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FingerprintChange<'a> {
    Added {
        key: &'a str,
        current: &'a FingerprintEntry,
    },
    Removed {
        key: &'a str,
        previous: &'a FingerprintEntry,
    },
    Modified {
        key: &'a str,
        previous: &'a FingerprintEntry,
        current: &'a FingerprintEntry,
    },
}

impl<'a> FingerprintChange<'a> {
    pub fn key(&self) -> &'a str {
        match self {
            FingerprintChange::Added { key, .. }
            | FingerprintChange::Removed { key, .. }
            | FingerprintChange::Modified { key, .. } => key,
        }
    }
}

fn entry_changed(previous: &FingerprintEntry, current: &FingerprintEntry) -> bool {
    previous.content_hash != current.content_hash || previous.file_type != current.file_type
}

/// Compare `previous` with `current`
///
/// Equal combined hashes short-circuit to no changes. When either side is
/// order sensitive the entries are compared as sequences.
pub fn diff_fingerprints<'a>(
    previous: &'a FileCollectionFingerprint,
    current: &'a FileCollectionFingerprint,
) -> Vec<FingerprintChange<'a>> {
    if previous.hash() == current.hash() {
        return Vec::new();
    }
    let order_sensitive = previous.ordering() == EntryOrdering::OrderSensitive
        || current.ordering() == EntryOrdering::OrderSensitive;
    if order_sensitive {
        diff_ordered(previous, current)
    } else {
        diff_unordered(previous, current)
    }
}

/// Walk previous keys, then append keys new in `current` in their order
fn diff_unordered<'a>(
    previous: &'a FileCollectionFingerprint,
    current: &'a FileCollectionFingerprint,
) -> Vec<FingerprintChange<'a>> {
    let mut changes = Vec::new();
    for (key, before) in previous.entries() {
        match current.get(key) {
            None => changes.push(FingerprintChange::Removed {
                key,
                previous: before,
            }),
            Some(after) if entry_changed(before, after) => {
                changes.push(FingerprintChange::Modified {
                    key,
                    previous: before,
                    current: after,
                })
            }
            Some(_) => {}
        }
    }
    for (key, after) in current.entries() {
        if previous.get(key).is_none() {
            changes.push(FingerprintChange::Added {
                key,
                current: after,
            });
        }
    }
    changes
}

/// Lock-step walk; after the first key mismatch everything left is removed then added
fn diff_ordered<'a>(
    previous: &'a FileCollectionFingerprint,
    current: &'a FileCollectionFingerprint,
) -> Vec<FingerprintChange<'a>> {
    let mut changes = Vec::new();
    let mut before = previous.entries().iter().peekable();
    let mut after = current.entries().iter().peekable();

    while let (Some((old_key, _)), Some((new_key, _))) = (before.peek(), after.peek()) {
        if old_key != new_key {
            break;
        }
        if let (Some((key, old)), Some((_, new))) = (before.next(), after.next()) {
            if entry_changed(old, new) {
                changes.push(FingerprintChange::Modified {
                    key,
                    previous: old,
                    current: new,
                });
            }
        }
    }

    changes.extend(before.map(|(key, old)| FingerprintChange::Removed {
        key,
        previous: old,
    }));
    changes.extend(after.map(|(key, new)| FingerprintChange::Added {
        key,
        current: new,
    }));
    changes
}
