//! Error types for execution history

use std::io;
use std::path::PathBuf;

/// Why a persisted record could not be read back
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("history record truncated ({0} bytes)")]
    Truncated(usize),

    #[error("history record has unknown magic bytes")]
    BadMagic,

    #[error("history schema version {0} is not supported")]
    UnsupportedVersion(u16),

    #[error("history record is corrupt")]
    Corrupt(#[source] bincode::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("failed to encode history record")]
    Encode(#[source] bincode::Error),

    #[error("history database error")]
    Sled(#[from] sled::Error),

    #[error("history file '{}' could not be accessed", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl HistoryError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| HistoryError::Io { path, source }
    }
}

pub type Result<T> = std::result::Result<T, HistoryError>;
