//! Uptodate Core - filesystem snapshots for incremental build change detection
//!
//! This crate provides:
//! - BLAKE3 hashing
//! - Immutable file and directory snapshots with Merkle hashes
//! - An owned, single-traversal Merkle directory builder
//! - A filesystem snapshotter with default excludes and cancellation
//! - Merkle-aware snapshot comparison

pub mod cancel;
pub mod compare;
pub mod error;
pub mod excludes;
pub mod hash;
pub mod merkle;
pub mod snapshot;
pub mod snapshotter;

// Re-export main types for convenience
pub use cancel::CancellationToken;
pub use compare::{compare_snapshots, ComparisonStats, SnapshotChange};
pub use error::{Result, SnapshotError};
pub use excludes::{SnapshotExcludes, SnapshotExcludesBuilder, DEFAULT_EXCLUDES};
pub use hash::{Blake3Hash, IncrementalHasher, DIR_SIGNATURE, MISSING_FILE_SIGNATURE};
pub use merkle::{EmptyDirectoryHandling, MerkleDirectorySnapshotBuilder};
pub use snapshot::{
    DirectorySnapshot, FileMetadata, FileSystemLocationSnapshot, FileSystemSnapshot, FileType,
    MissingFileSnapshot, RegularFileSnapshot, RelativePath, SnapshotHierarchyVisitor,
    VisitControl,
};
pub use snapshotter::{FileSystemSnapshotter, SnapshotterOptions};
