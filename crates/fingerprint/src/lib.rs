//! Uptodate Fingerprint - normalized summaries of file collections
//!
//! This crate provides:
//! - Path normalizers and an explicit strategy registry
//! - Immutable fingerprints with a combined hash
//! - Fingerprinting of snapshots, including the fixed policy for outputs
//! - Key-level fingerprint diffs, ordered and unordered

pub mod diff;
pub mod error;
pub mod fingerprint;
pub mod fingerprinter;
pub mod normalizer;

// Re-exports
pub use diff::{diff_fingerprints, FingerprintChange};
pub use error::{FingerprintError, Result};
pub use fingerprint::{
    CurrentFileCollectionFingerprint, FileCollectionFingerprint, FingerprintBuilder,
    FingerprintEntry,
};
pub use fingerprinter::{fingerprint_outputs, fingerprint_with_strategy, Fingerprinter};
pub use normalizer::{
    DirectorySensitivity, EntryOrdering, FingerprintSpec, FingerprintingStrategy, Normalizer,
    NormalizerRegistry,
};
