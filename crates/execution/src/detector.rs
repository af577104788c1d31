//! Decide whether a task must rebuild or which input files changed

use crate::state::{BeforeExecutionState, Change, ChangedFile, ExecutionStateChanges, RebuildReason};
use std::collections::BTreeMap;
use uptodate_fingerprint::{diff_fingerprints, FileCollectionFingerprint, FingerprintChange};
use uptodate_history::AfterPreviousExecutionState;

/// Compare the current state with the previous execution
pub fn detect_changes(
    previous: Option<&AfterPreviousExecutionState>,
    current: &BeforeExecutionState,
) -> ExecutionStateChanges {
    let Some(previous) = previous else {
        return ExecutionStateChanges::rebuild(RebuildReason::NoHistory);
    };

    let reasons = rebuild_reasons(previous, current);
    if !reasons.is_empty() {
        return ExecutionStateChanges::Rebuild { reasons };
    }

    let mut input_changes = Vec::new();
    for (name, fingerprint) in &current.input_file_properties {
        if let Some(before) = previous.input_file_properties.get(name) {
            collect_input_changes(name, before, fingerprint, &mut input_changes);
        }
    }
    ExecutionStateChanges::Incremental { input_changes }
}

fn rebuild_reasons(
    previous: &AfterPreviousExecutionState,
    current: &BeforeExecutionState,
) -> Vec<RebuildReason> {
    let mut reasons = Vec::new();

    if current.implementation.is_unknown() {
        reasons.push(RebuildReason::UnknownClassloader {
            type_name: current.implementation.type_name.clone(),
        });
    } else if !current.implementation.is_same_implementation(&previous.implementation) {
        reasons.push(RebuildReason::ImplementationChanged {
            previous: previous.implementation.clone(),
            current: current.implementation.clone(),
        });
    }

    if let Some(unknown) = current.action_implementations.iter().find(|a| a.is_unknown()) {
        reasons.push(RebuildReason::UnknownActionClassloader {
            type_name: unknown.type_name.clone(),
        });
    } else if current.action_implementations.len() != previous.action_implementations.len()
        || current
            .action_implementations
            .iter()
            .zip(&previous.action_implementations)
            .any(|(now, before)| !now.is_same_implementation(before))
    {
        reasons.push(RebuildReason::ActionImplementationsChanged);
    }

    if !previous.successful {
        reasons.push(RebuildReason::PreviousExecutionFailed);
    }

    for (name, hash) in &current.input_value_properties {
        match previous.input_value_properties.get(name) {
            None => reasons.push(RebuildReason::InputValueAdded(name.clone())),
            Some(before) if before != hash => {
                reasons.push(RebuildReason::InputValueChanged(name.clone()))
            }
            Some(_) => {}
        }
    }
    for name in previous.input_value_properties.keys() {
        if !current.input_value_properties.contains_key(name) {
            reasons.push(RebuildReason::InputValueRemoved(name.clone()));
        }
    }

    property_set_changes(
        &previous.input_file_properties,
        &current.input_file_properties,
        RebuildReason::InputFilePropertyAdded,
        RebuildReason::InputFilePropertyRemoved,
        &mut reasons,
    );
    property_set_changes(
        &previous.output_file_properties,
        &current.output_file_properties,
        RebuildReason::OutputFilePropertyAdded,
        RebuildReason::OutputFilePropertyRemoved,
        &mut reasons,
    );

    // Files created by others since are ignored; only what this task left behind counts
    for (name, before) in &previous.output_file_properties {
        let Some(now) = current.output_file_properties.get(name) else {
            continue;
        };
        for change in diff_fingerprints(before, now.fingerprint()) {
            match change {
                FingerprintChange::Removed { previous, .. } => {
                    reasons.push(RebuildReason::OutputFileRemoved {
                        property: name.clone(),
                        path: previous.absolute_path.clone(),
                    })
                }
                FingerprintChange::Modified { current, .. } => {
                    reasons.push(RebuildReason::OutputFileModified {
                        property: name.clone(),
                        path: current.absolute_path.clone(),
                    })
                }
                FingerprintChange::Added { .. } => {}
            }
        }
    }

    reasons
}

fn property_set_changes<A, B>(
    previous: &BTreeMap<String, A>,
    current: &BTreeMap<String, B>,
    added: fn(String) -> RebuildReason,
    removed: fn(String) -> RebuildReason,
    reasons: &mut Vec<RebuildReason>,
) {
    for name in current.keys() {
        if !previous.contains_key(name) {
            reasons.push(added(name.clone()));
        }
    }
    for name in previous.keys() {
        if !current.contains_key(name) {
            reasons.push(removed(name.clone()));
        }
    }
}

fn collect_input_changes(
    property_name: &str,
    previous: &FileCollectionFingerprint,
    current: &FileCollectionFingerprint,
    changes: &mut Vec<Change>,
) {
    for change in diff_fingerprints(previous, current) {
        let file = |entry: &uptodate_fingerprint::FingerprintEntry| ChangedFile {
            property_name: property_name.to_string(),
            path: entry.absolute_path.clone(),
            normalized_path: change.key().to_string(),
        };
        changes.push(match change {
            FingerprintChange::Added { current, .. } => Change::Added(file(current)),
            FingerprintChange::Modified { current, .. } => Change::Modified(file(current)),
            FingerprintChange::Removed { previous, .. } => Change::Removed(file(previous)),
        });
    }
}
