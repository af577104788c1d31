//! Turn filesystem snapshots into fingerprints

use crate::error::Result;
use crate::fingerprint::{
    CurrentFileCollectionFingerprint, FileCollectionFingerprint, FingerprintBuilder,
    FingerprintEntry,
};
use crate::normalizer::{
    AbsolutePathStrategy, DirectorySensitivity, FingerprintSpec, FingerprintingStrategy,
    NormalizerRegistry,
};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;
use uptodate_core::{
    FileSystemLocationSnapshot, FileSystemSnapshot, FileSystemSnapshotter, FileType,
    RelativePath, SnapshotHierarchyVisitor, VisitControl, DIR_SIGNATURE, MISSING_FILE_SIGNATURE,
};

/// Fingerprints snapshots with strategies from an explicit registry
#[derive(Clone)]
pub struct Fingerprinter {
    registry: Arc<NormalizerRegistry>,
}

impl Fingerprinter {
    pub fn new(registry: Arc<NormalizerRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &NormalizerRegistry {
        &self.registry
    }

    pub fn fingerprint(
        &self,
        snapshot: &FileSystemSnapshot,
        spec: &FingerprintSpec,
    ) -> Result<FileCollectionFingerprint> {
        let strategy = self.registry.get(spec.normalizer)?;
        Ok(fingerprint_with_strategy(strategy, snapshot, spec))
    }

    /// Fingerprint `snapshot` and keep it alongside the result
    pub fn fingerprint_current(
        &self,
        snapshot: FileSystemSnapshot,
        spec: &FingerprintSpec,
    ) -> Result<CurrentFileCollectionFingerprint> {
        let fingerprint = self.fingerprint(&snapshot, spec)?;
        Ok(CurrentFileCollectionFingerprint::new(fingerprint, snapshot))
    }

    /// Snapshot `roots` and fingerprint the result
    pub fn snapshot_and_fingerprint<P: AsRef<Path>>(
        &self,
        snapshotter: &FileSystemSnapshotter,
        roots: &[P],
        spec: &FingerprintSpec,
    ) -> Result<CurrentFileCollectionFingerprint> {
        let snapshot = snapshotter.snapshot_roots(roots)?;
        self.fingerprint_current(snapshot, spec)
    }
}

impl Default for Fingerprinter {
    fn default() -> Self {
        Self::new(Arc::new(NormalizerRegistry::standard()))
    }
}

/// Fingerprint an output snapshot: absolute paths, unordered
pub fn fingerprint_outputs(snapshot: &FileSystemSnapshot) -> FileCollectionFingerprint {
    fingerprint_with_strategy(&AbsolutePathStrategy, snapshot, &FingerprintSpec::outputs())
}

/// Fingerprint `snapshot` with an already resolved strategy
pub fn fingerprint_with_strategy(
    strategy: &dyn FingerprintingStrategy,
    snapshot: &FileSystemSnapshot,
    spec: &FingerprintSpec,
) -> FileCollectionFingerprint {
    let mut builder = FingerprintBuilder::new(spec.ordering);

    for root in snapshot.roots() {
        if root.file_type() == FileType::Missing && !spec.track_missing {
            debug!("Missing root {} contributes nothing", root.absolute_path().display());
            continue;
        }
        let mut collector = EntryCollector {
            strategy,
            spec,
            root,
            builder: &mut builder,
        };
        root.accept(&mut collector);
    }

    if builder.collisions() > 0 {
        debug!(
            "{} entries share a normalized key under {}",
            builder.collisions(),
            strategy.normalizer()
        );
    }
    builder.build()
}

struct EntryCollector<'a> {
    strategy: &'a dyn FingerprintingStrategy,
    spec: &'a FingerprintSpec,
    root: &'a FileSystemLocationSnapshot,
    builder: &'a mut FingerprintBuilder,
}

impl SnapshotHierarchyVisitor for EntryCollector<'_> {
    fn visit_entry(
        &mut self,
        entry: &FileSystemLocationSnapshot,
        relative_path: &RelativePath<'_>,
    ) -> VisitControl {
        let content_hash = match entry {
            FileSystemLocationSnapshot::RegularFile(file) => file.content_hash(),
            FileSystemLocationSnapshot::Directory(_) => {
                if self.spec.directory_sensitivity == DirectorySensitivity::IgnoreDirectories {
                    return VisitControl::Continue;
                }
                DIR_SIGNATURE
            }
            FileSystemLocationSnapshot::Missing(_) => {
                if !self.spec.track_missing {
                    return VisitControl::Continue;
                }
                MISSING_FILE_SIGNATURE
            }
        };
        if let Some(key) = self.strategy.normalized_key(self.root, entry, relative_path) {
            self.builder.add(
                key,
                FingerprintEntry {
                    absolute_path: entry.absolute_path().to_path_buf(),
                    content_hash,
                    file_type: entry.file_type(),
                },
            );
        }
        VisitControl::Continue
    }
}
