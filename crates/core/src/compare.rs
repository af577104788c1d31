//! Merkle-aware comparison of two snapshots

use crate::snapshot::FileSystemLocationSnapshot;
use std::path::PathBuf;

/// A location that differs between two snapshots
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotChange {
    Added(PathBuf),
    Removed(PathBuf),
    Modified(PathBuf),
}

impl SnapshotChange {
    pub fn path(&self) -> &PathBuf {
        match self {
            SnapshotChange::Added(path)
            | SnapshotChange::Removed(path)
            | SnapshotChange::Modified(path) => path,
        }
    }
}

/// Work done by [`compare_snapshots`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComparisonStats {
    /// Pairs of nodes whose hashes were compared
    pub nodes_compared: usize,
    /// Directory pairs skipped because their Merkle hashes matched
    pub subtrees_skipped: usize,
}

/// List the locations that changed between `previous` and `current`
///
/// Directories with equal Merkle hashes are not descended into. An added or
/// removed directory is reported once, not per descendant. A type change is
/// reported as `Modified` at the location where it happened.
pub fn compare_snapshots(
    previous: &FileSystemLocationSnapshot,
    current: &FileSystemLocationSnapshot,
    stats: &mut ComparisonStats,
) -> Vec<SnapshotChange> {
    let mut changes = Vec::new();
    compare_into(previous, current, stats, &mut changes);
    changes
}

fn compare_into(
    previous: &FileSystemLocationSnapshot,
    current: &FileSystemLocationSnapshot,
    stats: &mut ComparisonStats,
    changes: &mut Vec<SnapshotChange>,
) {
    stats.nodes_compared += 1;
    let same_type = previous.file_type() == current.file_type();
    if same_type && previous.hash() == current.hash() {
        if let FileSystemLocationSnapshot::Directory(_) = current {
            stats.subtrees_skipped += 1;
        }
        return;
    }

    match (previous, current) {
        (
            FileSystemLocationSnapshot::Directory(before),
            FileSystemLocationSnapshot::Directory(after),
        ) => {
            // Both child lists are sorted by name; merge them
            let (old, new) = (before.children(), after.children());
            let (mut i, mut j) = (0, 0);
            while i < old.len() || j < new.len() {
                match (old.get(i), new.get(j)) {
                    (Some(a), Some(b)) if a.name() == b.name() => {
                        compare_into(a, b, stats, changes);
                        i += 1;
                        j += 1;
                    }
                    (Some(a), Some(b)) if a.name() < b.name() => {
                        changes.push(SnapshotChange::Removed(a.absolute_path().to_path_buf()));
                        i += 1;
                    }
                    (Some(a), None) => {
                        changes.push(SnapshotChange::Removed(a.absolute_path().to_path_buf()));
                        i += 1;
                    }
                    (_, Some(b)) => {
                        changes.push(SnapshotChange::Added(b.absolute_path().to_path_buf()));
                        j += 1;
                    }
                    (None, None) => break,
                }
            }
        }
        (FileSystemLocationSnapshot::Missing(_), _) => {
            changes.push(SnapshotChange::Added(current.absolute_path().to_path_buf()));
        }
        (_, FileSystemLocationSnapshot::Missing(_)) => {
            changes.push(SnapshotChange::Removed(previous.absolute_path().to_path_buf()));
        }
        _ => changes.push(SnapshotChange::Modified(current.absolute_path().to_path_buf())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash_bytes;
    use crate::snapshot::{DirectorySnapshot, FileMetadata, RegularFileSnapshot};

    fn file(path: &str, content: &[u8]) -> FileSystemLocationSnapshot {
        let name = path.rsplit('/').next().unwrap_or(path);
        FileSystemLocationSnapshot::RegularFile(RegularFileSnapshot::new(
            path,
            name,
            hash_bytes(content),
            FileMetadata {
                length: content.len() as u64,
                last_modified_millis: 0,
            },
        ))
    }

    fn dir(path: &str, children: Vec<FileSystemLocationSnapshot>) -> FileSystemLocationSnapshot {
        let name = path.rsplit('/').next().unwrap_or(path);
        FileSystemLocationSnapshot::Directory(DirectorySnapshot::new(path, name, children))
    }

    /// Ten untouched subdirectories with ten files each, plus one changing file
    fn wide_tree(changed: &[u8]) -> FileSystemLocationSnapshot {
        let mut children = Vec::new();
        for d in 0..10 {
            let files = (0..10)
                .map(|f| file(&format!("/r/d{d}/f{f}"), format!("{d}-{f}").as_bytes()))
                .collect();
            children.push(dir(&format!("/r/d{d}"), files));
        }
        children.push(file("/r/zz", changed));
        dir("/r", children)
    }

    #[test]
    fn test_identical_trees_compare_once() {
        let tree = wide_tree(b"x");
        let mut stats = ComparisonStats::default();
        assert!(compare_snapshots(&tree, &tree.clone(), &mut stats).is_empty());
        assert_eq!(stats.nodes_compared, 1);
        assert_eq!(stats.subtrees_skipped, 1);
    }

    #[test]
    fn test_unchanged_subtrees_are_skipped() {
        let mut stats = ComparisonStats::default();
        let changes = compare_snapshots(&wide_tree(b"x"), &wide_tree(b"y"), &mut stats);

        assert_eq!(changes, vec![SnapshotChange::Modified("/r/zz".into())]);
        // Root, ten skipped directories and the changed file; none of the 100 leaves
        assert_eq!(stats.nodes_compared, 12);
        assert_eq!(stats.subtrees_skipped, 10);
    }

    #[test]
    fn test_added_and_removed_children() {
        let before = dir("/r", vec![file("/r/a", b"a"), file("/r/b", b"b")]);
        let after = dir("/r", vec![file("/r/b", b"b"), file("/r/c", b"c")]);
        let changes = compare_snapshots(&before, &after, &mut ComparisonStats::default());
        assert_eq!(
            changes,
            vec![
                SnapshotChange::Removed("/r/a".into()),
                SnapshotChange::Added("/r/c".into()),
            ]
        );
    }

    #[test]
    fn test_type_change_is_modified() {
        let before = dir("/r", vec![file("/r/x", b"x")]);
        let after = dir("/r", vec![dir("/r/x", vec![])]);
        let changes = compare_snapshots(&before, &after, &mut ComparisonStats::default());
        assert_eq!(changes, vec![SnapshotChange::Modified("/r/x".into())]);
    }
}
