//! Error types for execution state capture

use std::fmt;
use uptodate_core::SnapshotError;
use uptodate_fingerprint::FingerprintError;
use uptodate_history::HistoryError;

/// Which side of a task a file property belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    Input,
    Output,
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyKind::Input => f.write_str("input"),
            PropertyKind::Output => f.write_str("output"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("failed to capture snapshot of {kind} files for {task} property '{property}' during up-to-date check")]
    Snapshot {
        task: String,
        property: String,
        kind: PropertyKind,
        #[source]
        source: FingerprintError,
    },

    #[error("unable to store input properties for {task}: property '{property}' cannot be serialized")]
    ValueSnapshot {
        task: String,
        property: String,
        #[source]
        source: bincode::Error,
    },

    #[error("{task} declares {kind} file property '{property}' more than once")]
    DuplicateProperty {
        task: String,
        property: String,
        kind: PropertyKind,
    },

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error("execution of {0} was cancelled")]
    Cancelled(String),
}

impl ExecutionError {
    pub(crate) fn duplicate(task: &str, property: &str, kind: PropertyKind) -> Self {
        ExecutionError::DuplicateProperty {
            task: task.to_string(),
            property: property.to_string(),
            kind,
        }
    }

    /// Map a fingerprinting failure of one property, surfacing cancellation as such
    pub(crate) fn snapshot(
        task: &str,
        property: &str,
        kind: PropertyKind,
    ) -> impl FnOnce(FingerprintError) -> Self {
        let task = task.to_string();
        let property = property.to_string();
        move |source| match source {
            FingerprintError::Snapshot(SnapshotError::Cancelled) => ExecutionError::Cancelled(task),
            source => ExecutionError::Snapshot {
                task,
                property,
                kind,
                source,
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, ExecutionError>;
