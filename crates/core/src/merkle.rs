//! Merkle hashing of directories and the incremental directory builder

use crate::hash::{Blake3Hash, IncrementalHasher};
use crate::snapshot::{DirectorySnapshot, FileSystemLocationSnapshot};
use std::path::PathBuf;

const DIRECTORY_DOMAIN: &[u8] = b"uptodate:directory:v1";

/// Combine name-sorted children into a directory hash
///
/// Each child contributes its `(name, type, hash)` triple. Callers must pass
/// children in name order; [`DirectorySnapshot::new`] takes care of that.
pub fn directory_hash(children: &[FileSystemLocationSnapshot]) -> Blake3Hash {
    let mut hasher = IncrementalHasher::new();
    hasher.update(DIRECTORY_DOMAIN);
    hasher.update_u64(children.len() as u64);
    for child in children {
        hasher.update_str(child.name());
        hasher.update_u8(child.file_type().tag());
        hasher.update_hash(&child.hash());
    }
    hasher.finalize()
}

/// What to do with a directory that ends up without children
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyDirectoryHandling {
    Include,
    Exclude,
}

struct Level {
    absolute_path: PathBuf,
    name: String,
    children: Vec<FileSystemLocationSnapshot>,
}

/// Builds directory snapshots bottom-up while a tree is being walked
///
/// The builder owns its stack; one builder serves exactly one root.
#[derive(Default)]
pub struct MerkleDirectorySnapshotBuilder {
    levels: Vec<Level>,
    result: Option<FileSystemLocationSnapshot>,
}

impl MerkleDirectorySnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a directory; entries visited until the matching post-visit become its children
    pub fn previsit_directory(&mut self, absolute_path: impl Into<PathBuf>, name: impl Into<String>) {
        self.levels.push(Level {
            absolute_path: absolute_path.into(),
            name: name.into(),
            children: Vec::new(),
        });
    }

    /// Add a file, a missing entry or an already complete directory
    pub fn visit_leaf(&mut self, snapshot: FileSystemLocationSnapshot) {
        match self.levels.last_mut() {
            Some(level) => level.children.push(snapshot),
            None => self.result = Some(snapshot),
        }
    }

    /// Close the current directory
    ///
    /// Returns whether the directory was kept. With
    /// [`EmptyDirectoryHandling::Exclude`] a directory without children is
    /// dropped from its parent.
    pub fn post_visit_directory(&mut self, handling: EmptyDirectoryHandling) -> bool {
        let Some(level) = self.levels.pop() else {
            debug_assert!(false, "post_visit_directory without matching previsit");
            return false;
        };
        if level.children.is_empty() && handling == EmptyDirectoryHandling::Exclude {
            return false;
        }
        let directory = DirectorySnapshot::new(level.absolute_path, level.name, level.children);
        self.visit_leaf(FileSystemLocationSnapshot::Directory(directory));
        true
    }

    /// Number of directories currently open
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// Take the finished root snapshot
    ///
    /// `None` when nothing was kept, e.g. an excluded empty root directory.
    pub fn finish(self) -> Option<FileSystemLocationSnapshot> {
        debug_assert!(self.levels.is_empty(), "unbalanced directory visits");
        self.result
    }
}
