//! Error types for snapshotting

use std::io;
use std::path::PathBuf;

/// Errors raised while capturing filesystem snapshots
///
/// All of these are fatal for the snapshot being computed: no partial
/// snapshot is ever returned alongside an error.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("failed to read '{}'", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not list contents of directory '{}'", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("file '{}' is unstable after {attempts} read attempts (file changing too rapidly)", path.display())]
    UnstableFile { path: PathBuf, attempts: u8 },

    #[error("invalid exclude pattern '{pattern}'")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: ignore::Error,
    },

    #[error("snapshotting was cancelled")]
    Cancelled,
}

impl SnapshotError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| SnapshotError::Io { path, source }
    }
}

/// Result type for snapshot operations
pub type Result<T> = std::result::Result<T, SnapshotError>;
