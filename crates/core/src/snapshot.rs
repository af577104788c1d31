//! Immutable snapshots of files and directory trees

use crate::hash::{Blake3Hash, MISSING_FILE_SIGNATURE};
use crate::merkle;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Type of a snapshotted location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FileType {
    RegularFile,
    Directory,
    Missing,
}

impl FileType {
    /// Stable tag byte used when hashing
    pub fn tag(self) -> u8 {
        match self {
            FileType::RegularFile => 0,
            FileType::Directory => 1,
            FileType::Missing => 2,
        }
    }
}

/// File metadata that participates in up-to-date checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileMetadata {
    pub length: u64,
    pub last_modified_millis: i64,
}

impl FileMetadata {
    pub fn from_std(metadata: &Metadata) -> Self {
        let last_modified_millis = match metadata.modified() {
            Ok(modified) => match modified.duration_since(UNIX_EPOCH) {
                Ok(since) => since.as_millis() as i64,
                Err(before) => -(before.duration().as_millis() as i64),
            },
            Err(_) => 0,
        };
        Self {
            length: metadata.len(),
            last_modified_millis,
        }
    }
}

/// Snapshot of a regular file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegularFileSnapshot {
    absolute_path: PathBuf,
    name: String,
    content_hash: Blake3Hash,
    metadata: FileMetadata,
}

impl RegularFileSnapshot {
    pub fn new(
        absolute_path: impl Into<PathBuf>,
        name: impl Into<String>,
        content_hash: Blake3Hash,
        metadata: FileMetadata,
    ) -> Self {
        Self {
            absolute_path: absolute_path.into(),
            name: name.into(),
            content_hash,
            metadata,
        }
    }

    pub fn content_hash(&self) -> Blake3Hash {
        self.content_hash
    }

    pub fn metadata(&self) -> FileMetadata {
        self.metadata
    }
}

/// Snapshot of a directory with its children sorted by name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectorySnapshot {
    absolute_path: PathBuf,
    name: String,
    children: Vec<FileSystemLocationSnapshot>,
    merkle_hash: Blake3Hash,
}

impl DirectorySnapshot {
    /// Create a directory snapshot, sorting the children and computing the Merkle hash
    pub fn new(
        absolute_path: impl Into<PathBuf>,
        name: impl Into<String>,
        mut children: Vec<FileSystemLocationSnapshot>,
    ) -> Self {
        children.sort_by(|a, b| a.name().cmp(b.name()));
        let merkle_hash = merkle::directory_hash(&children);
        Self {
            absolute_path: absolute_path.into(),
            name: name.into(),
            children,
            merkle_hash,
        }
    }

    pub fn children(&self) -> &[FileSystemLocationSnapshot] {
        &self.children
    }

    pub fn merkle_hash(&self) -> Blake3Hash {
        self.merkle_hash
    }

    /// Look up a direct child by name
    pub fn child(&self, name: &str) -> Option<&FileSystemLocationSnapshot> {
        self.children
            .binary_search_by(|child| child.name().cmp(name))
            .ok()
            .map(|idx| &self.children[idx])
    }
}

/// Snapshot of a path that does not exist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingFileSnapshot {
    absolute_path: PathBuf,
    name: String,
}

impl MissingFileSnapshot {
    pub fn new(absolute_path: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            absolute_path: absolute_path.into(),
            name: name.into(),
        }
    }
}

/// On-disk state of a single location
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSystemLocationSnapshot {
    RegularFile(RegularFileSnapshot),
    Directory(DirectorySnapshot),
    Missing(MissingFileSnapshot),
}

impl FileSystemLocationSnapshot {
    pub fn absolute_path(&self) -> &Path {
        match self {
            Self::RegularFile(file) => &file.absolute_path,
            Self::Directory(dir) => &dir.absolute_path,
            Self::Missing(missing) => &missing.absolute_path,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::RegularFile(file) => &file.name,
            Self::Directory(dir) => &dir.name,
            Self::Missing(missing) => &missing.name,
        }
    }

    pub fn file_type(&self) -> FileType {
        match self {
            Self::RegularFile(_) => FileType::RegularFile,
            Self::Directory(_) => FileType::Directory,
            Self::Missing(_) => FileType::Missing,
        }
    }

    /// Content hash for files, Merkle hash for directories, a fixed signature for missing paths
    pub fn hash(&self) -> Blake3Hash {
        match self {
            Self::RegularFile(file) => file.content_hash,
            Self::Directory(dir) => dir.merkle_hash,
            Self::Missing(_) => MISSING_FILE_SIGNATURE,
        }
    }

    /// Whether `other` describes the same content and metadata as `self`
    ///
    /// Directories only compare their type; their children are compared entry by entry.
    pub fn is_content_and_metadata_up_to_date(&self, other: &FileSystemLocationSnapshot) -> bool {
        match (self, other) {
            (Self::RegularFile(a), Self::RegularFile(b)) => {
                a.content_hash == b.content_hash && a.metadata == b.metadata
            }
            (Self::Directory(_), Self::Directory(_)) => true,
            (Self::Missing(_), Self::Missing(_)) => true,
            _ => false,
        }
    }

    /// Walk this snapshot depth-first, children in name order
    pub fn accept<V: SnapshotHierarchyVisitor>(&self, visitor: &mut V) -> VisitControl {
        let mut relative_path = RelativePath::root();
        self.accept_at(visitor, &mut relative_path)
    }

    fn accept_at<'a, V: SnapshotHierarchyVisitor>(
        &'a self,
        visitor: &mut V,
        relative_path: &mut RelativePath<'a>,
    ) -> VisitControl {
        match visitor.visit_entry(self, relative_path) {
            VisitControl::Terminate => return VisitControl::Terminate,
            VisitControl::SkipSubtree => return VisitControl::Continue,
            VisitControl::Continue => {}
        }

        if let Self::Directory(dir) = self {
            visitor.enter_directory(dir, relative_path);
            for child in &dir.children {
                relative_path.push(child.name());
                let control = child.accept_at(visitor, relative_path);
                relative_path.pop();
                if control == VisitControl::Terminate {
                    return VisitControl::Terminate;
                }
            }
            visitor.leave_directory(dir, relative_path);
        }
        VisitControl::Continue
    }
}

/// Visitor control flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitControl {
    Continue,
    SkipSubtree,
    Terminate,
}

/// Path segments of an entry below its root; empty for the root itself
#[derive(Debug, Clone, Default)]
pub struct RelativePath<'a> {
    segments: SmallVec<[&'a str; 8]>,
}

impl<'a> RelativePath<'a> {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[&'a str] {
        &self.segments
    }

    fn push(&mut self, segment: &'a str) {
        self.segments.push(segment);
    }

    fn pop(&mut self) {
        self.segments.pop();
    }

    /// Segments joined with `/`
    pub fn to_slash_string(&self) -> String {
        self.segments.join("/")
    }
}

/// Callbacks for [`FileSystemLocationSnapshot::accept`]
pub trait SnapshotHierarchyVisitor {
    /// Called for every entry, directories included, before their children
    fn visit_entry(
        &mut self,
        snapshot: &FileSystemLocationSnapshot,
        relative_path: &RelativePath<'_>,
    ) -> VisitControl;

    fn enter_directory(&mut self, _directory: &DirectorySnapshot, _relative_path: &RelativePath<'_>) {}

    fn leave_directory(&mut self, _directory: &DirectorySnapshot, _relative_path: &RelativePath<'_>) {}
}

/// Snapshot of a file collection: one root snapshot per declared root
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSystemSnapshot {
    roots: Vec<FileSystemLocationSnapshot>,
}

impl FileSystemSnapshot {
    pub fn new(roots: Vec<FileSystemLocationSnapshot>) -> Self {
        Self { roots }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn roots(&self) -> &[FileSystemLocationSnapshot] {
        &self.roots
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Visit every root in declaration order
    pub fn accept<V: SnapshotHierarchyVisitor>(&self, visitor: &mut V) {
        for root in &self.roots {
            if root.accept(visitor) == VisitControl::Terminate {
                return;
            }
        }
    }

    /// Visit every entry of every root, stopping early when `f` returns false
    pub fn for_each_entry<F>(&self, mut f: F)
    where
        F: FnMut(&FileSystemLocationSnapshot, &RelativePath<'_>) -> bool,
    {
        struct Adapter<F>(F);

        impl<F> SnapshotHierarchyVisitor for Adapter<F>
        where
            F: FnMut(&FileSystemLocationSnapshot, &RelativePath<'_>) -> bool,
        {
            fn visit_entry(
                &mut self,
                snapshot: &FileSystemLocationSnapshot,
                relative_path: &RelativePath<'_>,
            ) -> VisitControl {
                if (self.0)(snapshot, relative_path) {
                    VisitControl::Continue
                } else {
                    VisitControl::Terminate
                }
            }
        }

        self.accept(&mut Adapter(&mut f));
    }
}

impl From<FileSystemLocationSnapshot> for FileSystemSnapshot {
    fn from(root: FileSystemLocationSnapshot) -> Self {
        Self { roots: vec![root] }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash_bytes;

    fn file(path: &str, content: &[u8]) -> FileSystemLocationSnapshot {
        let name = path.rsplit('/').next().unwrap_or(path);
        FileSystemLocationSnapshot::RegularFile(RegularFileSnapshot::new(
            path,
            name,
            hash_bytes(content),
            FileMetadata {
                length: content.len() as u64,
                last_modified_millis: 1,
            },
        ))
    }

    #[test]
    fn test_directory_children_are_sorted() {
        let dir = DirectorySnapshot::new(
            "/root",
            "root",
            vec![file("/root/b", b"b"), file("/root/a", b"a")],
        );
        let names: Vec<_> = dir.children().iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(dir.child("b").is_some());
        assert!(dir.child("c").is_none());
    }

    #[test]
    fn test_content_and_metadata_up_to_date() {
        let a = file("/x", b"same");
        let b = file("/x", b"same");
        let c = file("/x", b"different");
        let missing = FileSystemLocationSnapshot::Missing(MissingFileSnapshot::new("/x", "x"));

        assert!(a.is_content_and_metadata_up_to_date(&b));
        assert!(!a.is_content_and_metadata_up_to_date(&c));
        assert!(!a.is_content_and_metadata_up_to_date(&missing));
        assert!(missing.is_content_and_metadata_up_to_date(&missing.clone()));
    }

    #[test]
    fn test_mtime_change_is_not_up_to_date() {
        let a = file("/x", b"same");
        let FileSystemLocationSnapshot::RegularFile(inner) = &a else {
            unreachable!()
        };
        let touched = FileSystemLocationSnapshot::RegularFile(RegularFileSnapshot::new(
            "/x",
            "x",
            inner.content_hash(),
            FileMetadata {
                length: inner.metadata().length,
                last_modified_millis: 2,
            },
        ));
        assert!(!a.is_content_and_metadata_up_to_date(&touched));
        assert_eq!(a.hash(), touched.hash());
    }

    #[test]
    fn test_visitor_tracks_relative_paths() {
        let nested = DirectorySnapshot::new("/root/sub", "sub", vec![file("/root/sub/c", b"c")]);
        let root = FileSystemLocationSnapshot::Directory(DirectorySnapshot::new(
            "/root",
            "root",
            vec![
                file("/root/a", b"a"),
                FileSystemLocationSnapshot::Directory(nested),
            ],
        ));

        let mut seen = Vec::new();
        FileSystemSnapshot::from(root).for_each_entry(|snapshot, path| {
            seen.push((snapshot.name().to_string(), path.to_slash_string()));
            true
        });

        assert_eq!(
            seen,
            vec![
                ("root".to_string(), String::new()),
                ("a".to_string(), "a".to_string()),
                ("sub".to_string(), "sub".to_string()),
                ("c".to_string(), "sub/c".to_string()),
            ]
        );
    }

    #[test]
    fn test_skip_subtree() {
        struct SkipDirs(Vec<String>);
        impl SnapshotHierarchyVisitor for SkipDirs {
            fn visit_entry(
                &mut self,
                snapshot: &FileSystemLocationSnapshot,
                relative_path: &RelativePath<'_>,
            ) -> VisitControl {
                self.0.push(snapshot.name().to_string());
                if snapshot.file_type() == FileType::Directory && !relative_path.is_root() {
                    VisitControl::SkipSubtree
                } else {
                    VisitControl::Continue
                }
            }
        }

        let nested = DirectorySnapshot::new("/r/sub", "sub", vec![file("/r/sub/hidden", b"h")]);
        let root = FileSystemLocationSnapshot::Directory(DirectorySnapshot::new(
            "/r",
            "r",
            vec![FileSystemLocationSnapshot::Directory(nested), file("/r/z", b"z")],
        ));
        let mut visitor = SkipDirs(Vec::new());
        root.accept(&mut visitor);
        assert_eq!(visitor.0, vec!["r", "sub", "z"]);
    }
}
