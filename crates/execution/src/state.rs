//! Execution state before a task runs and the changes detected against history

use crate::overlap::OverlappingOutputs;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use uptodate_core::Blake3Hash;
use uptodate_fingerprint::{CurrentFileCollectionFingerprint, FileCollectionFingerprint};
use uptodate_history::ImplementationSnapshot;

/// State captured just before a task would execute
#[derive(Debug, Clone)]
pub struct BeforeExecutionState {
    pub implementation: ImplementationSnapshot,
    pub action_implementations: Vec<ImplementationSnapshot>,
    pub input_value_properties: BTreeMap<String, Blake3Hash>,
    pub input_file_properties: BTreeMap<String, FileCollectionFingerprint>,
    /// Unfiltered output fingerprints with the snapshots they came from
    pub output_file_properties: BTreeMap<String, CurrentFileCollectionFingerprint>,
    pub detected_overlapping_outputs: Option<OverlappingOutputs>,
}

/// A changed input file of one property
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedFile {
    pub property_name: String,
    pub path: PathBuf,
    /// The normalized key the change was detected under
    pub normalized_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Added(ChangedFile),
    Modified(ChangedFile),
    Removed(ChangedFile),
}

impl Change {
    pub fn file(&self) -> &ChangedFile {
        match self {
            Change::Added(file) | Change::Modified(file) | Change::Removed(file) => file,
        }
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (verb, file) = match self {
            Change::Added(file) => ("has been added", file),
            Change::Modified(file) => ("has changed", file),
            Change::Removed(file) => ("has been removed", file),
        };
        write!(
            f,
            "Input property '{}' file {} {}.",
            file.property_name,
            file.path.display(),
            verb
        )
    }
}

/// Why a task must run from scratch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildReason {
    NoHistory,
    HistoryUnreadable(String),
    /// The execution mode forbids incremental execution
    Mode(String),
    ImplementationChanged {
        previous: ImplementationSnapshot,
        current: ImplementationSnapshot,
    },
    UnknownClassloader {
        type_name: String,
    },
    ActionImplementationsChanged,
    UnknownActionClassloader {
        type_name: String,
    },
    PreviousExecutionFailed,
    InputValueAdded(String),
    InputValueRemoved(String),
    InputValueChanged(String),
    InputFilePropertyAdded(String),
    InputFilePropertyRemoved(String),
    OutputFilePropertyAdded(String),
    OutputFilePropertyRemoved(String),
    OutputFileRemoved {
        property: String,
        path: PathBuf,
    },
    OutputFileModified {
        property: String,
        path: PathBuf,
    },
}

impl fmt::Display for RebuildReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RebuildReason::NoHistory => f.write_str("No history is available."),
            RebuildReason::HistoryUnreadable(reason) => {
                write!(f, "Task history is unreadable: {reason}")
            }
            RebuildReason::Mode(reason) => f.write_str(reason),
            RebuildReason::ImplementationChanged { previous, current } => write!(
                f,
                "The type of task has changed from '{previous}' to '{current}'."
            ),
            RebuildReason::UnknownClassloader { type_name } => write!(
                f,
                "The type of task '{type_name}' was loaded with an unknown classloader."
            ),
            RebuildReason::ActionImplementationsChanged => {
                f.write_str("One or more additional actions for task have changed.")
            }
            RebuildReason::UnknownActionClassloader { type_name } => write!(
                f,
                "Additional action '{type_name}' was loaded with an unknown classloader."
            ),
            RebuildReason::PreviousExecutionFailed => {
                f.write_str("Task has failed previously.")
            }
            RebuildReason::InputValueAdded(name) => {
                write!(f, "Input property '{name}' has been added.")
            }
            RebuildReason::InputValueRemoved(name) => {
                write!(f, "Input property '{name}' has been removed.")
            }
            RebuildReason::InputValueChanged(name) => {
                write!(f, "Value of input property '{name}' has changed.")
            }
            RebuildReason::InputFilePropertyAdded(name) => {
                write!(f, "Input file property '{name}' has been added.")
            }
            RebuildReason::InputFilePropertyRemoved(name) => {
                write!(f, "Input file property '{name}' has been removed.")
            }
            RebuildReason::OutputFilePropertyAdded(name) => {
                write!(f, "Output property '{name}' has been added.")
            }
            RebuildReason::OutputFilePropertyRemoved(name) => {
                write!(f, "Output property '{name}' has been removed.")
            }
            RebuildReason::OutputFileRemoved { property, path } => write!(
                f,
                "Output property '{property}' file {} has been removed.",
                path.display()
            ),
            RebuildReason::OutputFileModified { property, path } => write!(
                f,
                "Output property '{property}' file {} has changed.",
                path.display()
            ),
        }
    }
}

/// Outcome of change detection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStateChanges {
    Rebuild { reasons: Vec<RebuildReason> },
    /// Nothing outside the input files changed; an empty list means up to date
    Incremental { input_changes: Vec<Change> },
}

impl ExecutionStateChanges {
    pub fn rebuild(reason: RebuildReason) -> Self {
        ExecutionStateChanges::Rebuild {
            reasons: vec![reason],
        }
    }

    pub fn is_rebuild_required(&self) -> bool {
        matches!(self, ExecutionStateChanges::Rebuild { .. })
    }

    pub fn is_up_to_date(&self) -> bool {
        matches!(self, ExecutionStateChanges::Incremental { input_changes } if input_changes.is_empty())
    }

    pub fn reasons(&self) -> &[RebuildReason] {
        match self {
            ExecutionStateChanges::Rebuild { reasons } => reasons,
            ExecutionStateChanges::Incremental { .. } => &[],
        }
    }

    pub fn input_changes(&self) -> &[Change] {
        match self {
            ExecutionStateChanges::Rebuild { .. } => &[],
            ExecutionStateChanges::Incremental { input_changes } => input_changes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_messages() {
        assert_eq!(RebuildReason::NoHistory.to_string(), "No history is available.");
        assert_eq!(
            RebuildReason::HistoryUnreadable("bad magic".into()).to_string(),
            "Task history is unreadable: bad magic"
        );
        assert_eq!(
            RebuildReason::InputValueChanged("release".into()).to_string(),
            "Value of input property 'release' has changed."
        );
        assert_eq!(
            RebuildReason::Mode("Executed with rerun flag.".into()).to_string(),
            "Executed with rerun flag."
        );
    }

    #[test]
    fn test_changes_accessors() {
        let up_to_date = ExecutionStateChanges::Incremental {
            input_changes: Vec::new(),
        };
        assert!(up_to_date.is_up_to_date());
        assert!(!up_to_date.is_rebuild_required());
        assert!(up_to_date.reasons().is_empty());

        let rebuild = ExecutionStateChanges::rebuild(RebuildReason::NoHistory);
        assert!(rebuild.is_rebuild_required());
        assert!(!rebuild.is_up_to_date());
        assert_eq!(rebuild.reasons(), &[RebuildReason::NoHistory]);

        let change = Change::Added(ChangedFile {
            property_name: "sources".into(),
            path: PathBuf::from("/src/b.txt"),
            normalized_path: "b.txt".into(),
        });
        assert_eq!(change.file().normalized_path, "b.txt");
        assert_eq!(
            change.to_string(),
            "Input property 'sources' file /src/b.txt has been added."
        );
    }
}
