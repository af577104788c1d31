//! Capture filesystem snapshots of files and directory trees
//!
//! A directory is captured in two phases: a single-threaded walk records the
//! tree shape, then file contents are hashed (in parallel when enabled) and
//! the recorded events are replayed into a [`MerkleDirectorySnapshotBuilder`].
//! The replay order is the walk order, so the result never depends on how
//! hashing was scheduled.

use crate::cancel::CancellationToken;
use crate::error::{Result, SnapshotError};
use crate::excludes::SnapshotExcludes;
use crate::hash::{hash_file, hash_file_mmap, Blake3Hash};
use crate::merkle::{EmptyDirectoryHandling, MerkleDirectorySnapshotBuilder};
use crate::snapshot::{
    FileMetadata, FileSystemLocationSnapshot, FileSystemSnapshot, MissingFileSnapshot,
    RegularFileSnapshot,
};
use rayon::prelude::*;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::debug;
use walkdir::WalkDir;

const MAX_BACKOFF_SHIFT: u8 = 5;

/// Tuning knobs for [`FileSystemSnapshotter`]
#[derive(Debug, Clone)]
pub struct SnapshotterOptions {
    /// Files at least this large are hashed through a memory map
    pub mmap_threshold_bytes: u64,
    /// Read attempts before a file that keeps changing is reported as unstable
    pub stable_read_retries: u8,
    /// Hash files on the rayon pool
    pub parallel_hashing: bool,
}

impl Default for SnapshotterOptions {
    fn default() -> Self {
        Self {
            mmap_threshold_bytes: 4 * 1024 * 1024,
            stable_read_retries: 3,
            parallel_hashing: true,
        }
    }
}

/// Produces [`FileSystemLocationSnapshot`]s from the live filesystem
///
/// The default snapshotter applies the default excludes.
#[derive(Debug, Clone, Default)]
pub struct FileSystemSnapshotter {
    excludes: SnapshotExcludes,
    options: SnapshotterOptions,
    cancellation: CancellationToken,
}

enum WalkEvent {
    Enter { path: PathBuf, name: String },
    File,
    Missing { path: PathBuf, name: String },
    Leave,
}

struct PendingFile {
    path: PathBuf,
    name: String,
}

impl FileSystemSnapshotter {
    pub fn new(excludes: SnapshotExcludes, options: SnapshotterOptions) -> Self {
        Self {
            excludes,
            options,
            cancellation: CancellationToken::new(),
        }
    }

    /// Observe `token` while snapshotting
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn options(&self) -> &SnapshotterOptions {
        &self.options
    }

    /// Snapshot a single root
    ///
    /// A root that does not exist yields a `Missing` snapshot rather than an error.
    pub fn snapshot(&self, root: &Path) -> Result<FileSystemLocationSnapshot> {
        self.cancellation.check()?;
        let root = std::path::absolute(root).map_err(SnapshotError::io(root))?;
        let name = location_name(&root);

        let metadata = match fs::metadata(&root) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!("Snapshot root {} is missing", root.display());
                return Ok(FileSystemLocationSnapshot::Missing(MissingFileSnapshot::new(
                    root, name,
                )));
            }
            Err(err) => return Err(SnapshotError::Io { path: root, source: err }),
        };

        if metadata.is_dir() {
            self.snapshot_directory(root, name)
        } else if metadata.is_file() {
            let (hash, metadata) = self.hash_stable(&root)?;
            Ok(FileSystemLocationSnapshot::RegularFile(RegularFileSnapshot::new(
                root, name, hash, metadata,
            )))
        } else {
            debug!("Snapshot root {} is neither file nor directory", root.display());
            Ok(FileSystemLocationSnapshot::Missing(MissingFileSnapshot::new(
                root, name,
            )))
        }
    }

    /// Snapshot every root, keeping declaration order
    pub fn snapshot_roots<P: AsRef<Path>>(&self, roots: &[P]) -> Result<FileSystemSnapshot> {
        let roots = roots
            .iter()
            .map(|root| self.snapshot(root.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(FileSystemSnapshot::new(roots))
    }

    fn snapshot_directory(&self, root: PathBuf, name: String) -> Result<FileSystemLocationSnapshot> {
        let start = Instant::now();
        let (events, files) = self.walk(&root)?;

        let hashed: Vec<RegularFileSnapshot> = if self.options.parallel_hashing {
            files
                .par_iter()
                .map(|file| self.snapshot_file(file))
                .collect::<Result<Vec<_>>>()?
        } else {
            files
                .iter()
                .map(|file| self.snapshot_file(file))
                .collect::<Result<Vec<_>>>()?
        };
        let file_count = hashed.len();

        let mut builder = MerkleDirectorySnapshotBuilder::new();
        let mut hashed = hashed.into_iter();
        for event in events {
            match event {
                WalkEvent::Enter { path, name } => builder.previsit_directory(path, name),
                WalkEvent::File => {
                    if let Some(file) = hashed.next() {
                        builder.visit_leaf(FileSystemLocationSnapshot::RegularFile(file));
                    }
                }
                WalkEvent::Missing { path, name } => builder.visit_leaf(
                    FileSystemLocationSnapshot::Missing(MissingFileSnapshot::new(path, name)),
                ),
                WalkEvent::Leave => {
                    builder.post_visit_directory(EmptyDirectoryHandling::Include);
                }
            }
        }

        debug!(
            "Snapshotted {} ({} files) in {:?}",
            root.display(),
            file_count,
            start.elapsed()
        );
        Ok(builder.finish().unwrap_or_else(|| {
            FileSystemLocationSnapshot::Missing(MissingFileSnapshot::new(root, name))
        }))
    }

    /// Record the shape of the tree below `root` without reading file contents
    fn walk(&self, root: &Path) -> Result<(Vec<WalkEvent>, Vec<PendingFile>)> {
        let mut events = Vec::new();
        let mut files = Vec::new();
        let mut open_directories = 0usize;

        let walker = WalkDir::new(root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
                !self
                    .excludes
                    .is_excluded(relative, entry.file_type().is_dir())
            });

        for entry in walker {
            self.cancellation.check()?;
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    if let Some(ancestor) = err.loop_ancestor() {
                        debug!(
                            "Skipping filesystem loop at {:?} (points to {})",
                            err.path(),
                            ancestor.display()
                        );
                        continue;
                    }
                    let broken_link = err
                        .io_error()
                        .is_some_and(|io| io.kind() == io::ErrorKind::NotFound);
                    if broken_link {
                        if let Some(path) = err.path() {
                            close_to_depth(&mut events, &mut open_directories, err.depth());
                            events.push(WalkEvent::Missing {
                                path: path.to_path_buf(),
                                name: location_name(path),
                            });
                            continue;
                        }
                    }
                    let path = err.path().unwrap_or(root).to_path_buf();
                    return Err(SnapshotError::Walk { path, source: err });
                }
            };

            close_to_depth(&mut events, &mut open_directories, entry.depth());
            let name = entry.file_name().to_string_lossy().into_owned();
            let file_type = entry.file_type();
            if file_type.is_dir() {
                events.push(WalkEvent::Enter {
                    path: entry.into_path(),
                    name,
                });
                open_directories += 1;
            } else if file_type.is_file() {
                files.push(PendingFile {
                    path: entry.into_path(),
                    name,
                });
                events.push(WalkEvent::File);
            } else {
                debug!("Skipping special file {}", entry.path().display());
            }
        }
        close_to_depth(&mut events, &mut open_directories, 0);

        Ok((events, files))
    }

    fn snapshot_file(&self, file: &PendingFile) -> Result<RegularFileSnapshot> {
        self.cancellation.check()?;
        let (hash, metadata) = self.hash_stable(&file.path)?;
        Ok(RegularFileSnapshot::new(
            file.path.clone(),
            file.name.clone(),
            hash,
            metadata,
        ))
    }

    /// Hash a file, retrying while its metadata changes underneath the read
    fn hash_stable(&self, path: &Path) -> Result<(Blake3Hash, FileMetadata)> {
        let attempts = self.options.stable_read_retries.max(1);
        for attempt in 0..attempts {
            let before = fs::metadata(path).map_err(SnapshotError::io(path))?;
            let hash = if before.len() >= self.options.mmap_threshold_bytes {
                hash_file_mmap(path)
            } else {
                hash_file(path)
            }
            .map_err(SnapshotError::io(path))?;
            let after = fs::metadata(path).map_err(SnapshotError::io(path))?;

            let before = FileMetadata::from_std(&before);
            let after = FileMetadata::from_std(&after);
            if before == after {
                return Ok((hash, after));
            }

            debug!(
                "File {} changed while hashing (attempt {}/{})",
                path.display(),
                attempt + 1,
                attempts
            );
            if attempt + 1 < attempts {
                std::thread::sleep(retry_backoff(attempt));
            }
        }
        Err(SnapshotError::UnstableFile {
            path: path.to_path_buf(),
            attempts,
        })
    }
}

/// Delay before the next read of an unstable file, capped at 1.6s
fn retry_backoff(attempt: u8) -> Duration {
    Duration::from_millis(50 << attempt.min(MAX_BACKOFF_SHIFT))
}

fn close_to_depth(events: &mut Vec<WalkEvent>, open_directories: &mut usize, depth: usize) {
    while *open_directories > depth {
        events.push(WalkEvent::Leave);
        *open_directories -= 1;
    }
}

fn location_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash_bytes;
    use anyhow::Result;
    use std::fs;

    fn snapshotter() -> FileSystemSnapshotter {
        FileSystemSnapshotter::new(SnapshotExcludes::none(), SnapshotterOptions::default())
    }

    fn as_directory(
        snapshot: &FileSystemLocationSnapshot,
    ) -> &crate::snapshot::DirectorySnapshot {
        match snapshot {
            FileSystemLocationSnapshot::Directory(dir) => dir,
            other => panic!("expected directory, got {:?}", other.file_type()),
        }
    }

    #[test]
    fn test_missing_root() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let snapshot = snapshotter().snapshot(&temp.path().join("nope"))?;
        assert!(matches!(snapshot, FileSystemLocationSnapshot::Missing(_)));
        assert_eq!(snapshot.name(), "nope");
        Ok(())
    }

    #[test]
    fn test_file_root() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("input.txt");
        fs::write(&path, b"content")?;

        let snapshot = snapshotter().snapshot(&path)?;
        assert!(matches!(snapshot, FileSystemLocationSnapshot::RegularFile(_)));
        assert_eq!(snapshot.hash(), hash_bytes(b"content"));
        Ok(())
    }

    #[test]
    fn test_directory_tree() -> Result<()> {
        let temp = tempfile::tempdir()?;
        fs::create_dir_all(temp.path().join("sub/deeper"))?;
        fs::write(temp.path().join("a.txt"), b"a")?;
        fs::write(temp.path().join("sub/b.txt"), b"b")?;
        fs::write(temp.path().join("sub/deeper/c.txt"), b"c")?;
        fs::create_dir(temp.path().join("empty"))?;

        let snapshot = snapshotter().snapshot(temp.path())?;
        let root = as_directory(&snapshot);
        let names: Vec<_> = root.children().iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["a.txt", "empty", "sub"]);

        let sub = as_directory(root.child("sub").unwrap());
        let deeper = as_directory(sub.child("deeper").unwrap());
        assert_eq!(deeper.children()[0].hash(), hash_bytes(b"c"));
        assert!(as_directory(root.child("empty").unwrap()).children().is_empty());
        Ok(())
    }

    #[test]
    fn test_parallel_and_sequential_agree() -> Result<()> {
        let temp = tempfile::tempdir()?;
        for i in 0..40 {
            let dir = temp.path().join(format!("d{}", i % 5));
            fs::create_dir_all(&dir)?;
            fs::write(dir.join(format!("f{}", i)), format!("file {}", i))?;
        }

        let parallel = snapshotter().snapshot(temp.path())?;
        let sequential = FileSystemSnapshotter::new(
            SnapshotExcludes::none(),
            SnapshotterOptions {
                parallel_hashing: false,
                ..SnapshotterOptions::default()
            },
        )
        .snapshot(temp.path())?;

        assert_eq!(parallel, sequential);
        Ok(())
    }

    #[test]
    fn test_excludes_are_relative_to_root() -> Result<()> {
        let temp = tempfile::tempdir()?;
        fs::create_dir_all(temp.path().join(".git/objects"))?;
        fs::write(temp.path().join(".git/HEAD"), b"ref")?;
        fs::write(temp.path().join("kept.txt"), b"kept")?;
        fs::write(temp.path().join("backup.txt~"), b"old")?;

        let snapshotter =
            FileSystemSnapshotter::new(SnapshotExcludes::defaults()?, SnapshotterOptions::default());
        let snapshot = snapshotter.snapshot(temp.path())?;
        let root = as_directory(&snapshot);
        let names: Vec<_> = root.children().iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["kept.txt"]);
        Ok(())
    }

    #[test]
    fn test_metadata_change_is_captured() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("f");
        fs::write(&path, b"same")?;
        let first = snapshotter().snapshot(&path)?;

        filetime::set_file_mtime(&path, filetime::FileTime::from_unix_time(1_000_000, 0))?;
        let second = snapshotter().snapshot(&path)?;

        assert_eq!(first.hash(), second.hash());
        assert!(!first.is_content_and_metadata_up_to_date(&second));
        Ok(())
    }

    #[test]
    fn test_large_file_uses_mmap_threshold() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("big");
        fs::write(&path, vec![7u8; 4096])?;

        let snapshotter = FileSystemSnapshotter::new(
            SnapshotExcludes::none(),
            SnapshotterOptions {
                mmap_threshold_bytes: 1024,
                ..SnapshotterOptions::default()
            },
        );
        assert_eq!(snapshotter.snapshot(&path)?.hash(), hash_bytes(&vec![7u8; 4096]));
        Ok(())
    }

    #[test]
    fn test_cancelled_snapshot_fails() -> Result<()> {
        let temp = tempfile::tempdir()?;
        fs::write(temp.path().join("f"), b"x")?;

        let token = CancellationToken::new();
        token.cancel();
        let snapshotter = snapshotter().with_cancellation(token);
        assert!(matches!(
            snapshotter.snapshot(temp.path()),
            Err(SnapshotError::Cancelled)
        ));
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_broken_symlink_is_missing() -> Result<()> {
        let temp = tempfile::tempdir()?;
        std::os::unix::fs::symlink(temp.path().join("target"), temp.path().join("link"))?;

        let snapshot = snapshotter().snapshot(temp.path())?;
        let root = as_directory(&snapshot);
        assert!(matches!(
            root.child("link"),
            Some(FileSystemLocationSnapshot::Missing(_))
        ));
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_loop_is_skipped() -> Result<()> {
        let temp = tempfile::tempdir()?;
        fs::create_dir(temp.path().join("dir"))?;
        fs::write(temp.path().join("dir/f"), b"f")?;
        std::os::unix::fs::symlink(temp.path(), temp.path().join("dir/loop"))?;

        let snapshot = snapshotter().snapshot(temp.path())?;
        let dir = as_directory(as_directory(&snapshot).child("dir").unwrap());
        assert!(dir.child("f").is_some());
        assert!(dir.child("loop").is_none());
        Ok(())
    }

    #[test]
    fn test_snapshot_roots_keeps_order() -> Result<()> {
        let temp = tempfile::tempdir()?;
        fs::write(temp.path().join("b"), b"b")?;
        fs::write(temp.path().join("a"), b"a")?;

        let snapshot =
            snapshotter().snapshot_roots(&[temp.path().join("b"), temp.path().join("a")])?;
        let names: Vec<_> = snapshot.roots().iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["b", "a"]);
        Ok(())
    }

    #[test]
    fn test_retry_backoff_is_capped() {
        assert_eq!(retry_backoff(0), Duration::from_millis(50));
        assert_eq!(retry_backoff(2), Duration::from_millis(200));
        assert_eq!(retry_backoff(5), Duration::from_millis(1600));
        assert_eq!(retry_backoff(u8::MAX), Duration::from_millis(1600));
    }

    #[test]
    fn test_default_snapshotter_skips_vcs_metadata() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let root = std::path::absolute(temp.path())?;
        fs::write(root.join("main.rs"), "fn main() {}")?;
        let before = FileSystemSnapshotter::default().snapshot(&root)?;
        fs::create_dir(root.join(".git"))?;
        fs::write(root.join(".git/HEAD"), "ref: refs/heads/main")?;
        let after = FileSystemSnapshotter::default().snapshot(&root)?;
        assert_eq!(before.hash(), after.hash());
        Ok(())
    }
}
