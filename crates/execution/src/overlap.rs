//! Outputs shared with other producers
//!
//! A task's output directory may also hold files written by someone else.
//! Those files are detected before execution and filtered out of the
//! fingerprint recorded afterwards, so the task never claims them.

use ahash::{AHashMap, AHashSet};
use std::path::{Path, PathBuf};
use uptodate_core::{
    EmptyDirectoryHandling, FileSystemLocationSnapshot, FileSystemSnapshot, FileType,
    MerkleDirectorySnapshotBuilder,
};
use uptodate_fingerprint::{
    fingerprint_outputs, CurrentFileCollectionFingerprint, FileCollectionFingerprint,
};

/// An output location that contained something this task did not produce
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlappingOutputs {
    pub property_name: String,
    pub overlapped_path: PathBuf,
}

impl OverlappingOutputs {
    /// Find the first entry in `before` that the previous execution did not leave behind
    pub fn detect(
        property_name: &str,
        after_previous: &FileCollectionFingerprint,
        before: &FileCollectionFingerprint,
    ) -> Option<Self> {
        before
            .entries()
            .values()
            .filter(|entry| entry.file_type != FileType::Missing)
            .find(|entry| match after_previous.get(&entry.absolute_path.to_string_lossy()) {
                None => true,
                Some(previous) => {
                    previous.content_hash != entry.content_hash
                        || previous.file_type != entry.file_type
                }
            })
            .map(|entry| OverlappingOutputs {
                property_name: property_name.to_string(),
                overlapped_path: entry.absolute_path.clone(),
            })
    }

    pub fn description(&self) -> String {
        format!(
            "Output property '{1}' overlaps with another producer: file '{0}' was not created by this task. Caching requires exclusive access to output paths.",
            self.overlapped_path.display(),
            self.property_name
        )
    }
}

/// Keep only the entries of `after` that this execution produced
///
/// An entry belongs to the task when it is new since `before`, was modified
/// since `before`, or was already owned by the previous execution.
pub fn filter_output_fingerprint(
    after_previous: Option<&FileCollectionFingerprint>,
    before: &CurrentFileCollectionFingerprint,
    after: &CurrentFileCollectionFingerprint,
) -> FileCollectionFingerprint {
    if before.is_empty() || after.is_empty() {
        return after.fingerprint().clone();
    }

    let mut before_index = AHashMap::new();
    for root in before.snapshot().roots() {
        index_snapshot(root, &mut before_index);
    }
    let previous: AHashSet<&Path> = after_previous
        .map(|fingerprint| fingerprint.absolute_paths().collect())
        .unwrap_or_default();

    let mut filter = OutputFilter {
        before: &before_index,
        previous: &previous,
        dropped: false,
    };
    let mut roots = Vec::new();
    for root in after.snapshot().roots() {
        let mut builder = MerkleDirectorySnapshotBuilder::new();
        filter.visit(root, &mut builder);
        if let Some(kept) = builder.finish() {
            roots.push(kept);
        }
    }

    if !filter.dropped {
        return after.fingerprint().clone();
    }
    fingerprint_outputs(&FileSystemSnapshot::new(roots))
}

fn index_snapshot<'a>(
    snapshot: &'a FileSystemLocationSnapshot,
    index: &mut AHashMap<&'a Path, &'a FileSystemLocationSnapshot>,
) {
    index.insert(snapshot.absolute_path(), snapshot);
    if let FileSystemLocationSnapshot::Directory(directory) = snapshot {
        for child in directory.children() {
            index_snapshot(child, index);
        }
    }
}

struct OutputFilter<'a> {
    before: &'a AHashMap<&'a Path, &'a FileSystemLocationSnapshot>,
    previous: &'a AHashSet<&'a Path>,
    dropped: bool,
}

impl OutputFilter<'_> {
    fn is_output_entry(&self, entry: &FileSystemLocationSnapshot) -> bool {
        if entry.file_type() == FileType::Missing {
            return false;
        }
        match self.before.get(entry.absolute_path()) {
            None => true,
            // Modified since before execution wins over previous ownership
            Some(before) if !before.is_content_and_metadata_up_to_date(entry) => true,
            Some(_) => self.previous.contains(entry.absolute_path()),
        }
    }

    fn visit(&mut self, entry: &FileSystemLocationSnapshot, builder: &mut MerkleDirectorySnapshotBuilder) {
        match entry {
            FileSystemLocationSnapshot::Directory(directory) => {
                builder.previsit_directory(entry.absolute_path(), entry.name());
                for child in directory.children() {
                    self.visit(child, builder);
                }
                let handling = if self.is_output_entry(entry) {
                    EmptyDirectoryHandling::Include
                } else {
                    EmptyDirectoryHandling::Exclude
                };
                if !builder.post_visit_directory(handling) {
                    self.dropped = true;
                }
            }
            _ if self.is_output_entry(entry) => builder.visit_leaf(entry.clone()),
            _ => self.dropped = true,
        }
    }
}
