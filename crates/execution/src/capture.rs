//! Capture a task's state just before it executes

use crate::error::{ExecutionError, PropertyKind, Result};
use crate::overlap::OverlappingOutputs;
use crate::state::BeforeExecutionState;
use crate::task::{OutputFileProperty, TaskDeclaration};
use std::collections::BTreeMap;
use tracing::{debug, warn};
use uptodate_core::FileSystemSnapshotter;
use uptodate_fingerprint::{
    fingerprint_outputs, CurrentFileCollectionFingerprint, FileCollectionFingerprint,
    FingerprintError, Fingerprinter,
};
use uptodate_history::AfterPreviousExecutionState;

/// Snapshot and fingerprint every file property of `declaration`
///
/// The previous execution is only consulted for overlapping-output detection;
/// without one, anything already present in an output location overlaps.
pub fn capture_before_execution(
    declaration: &TaskDeclaration,
    previous: Option<&AfterPreviousExecutionState>,
    snapshotter: &FileSystemSnapshotter,
    fingerprinter: &Fingerprinter,
) -> Result<BeforeExecutionState> {
    let task = declaration.task_key.as_str();

    let mut input_file_properties = BTreeMap::new();
    for property in &declaration.input_files {
        if input_file_properties.contains_key(&property.name) {
            return Err(ExecutionError::duplicate(task, &property.name, PropertyKind::Input));
        }
        let current = fingerprinter
            .snapshot_and_fingerprint(snapshotter, &property.roots, &property.spec)
            .map_err(ExecutionError::snapshot(task, &property.name, PropertyKind::Input))?;
        debug!(
            "Fingerprinted input property '{}' of {}: {} entries with {}",
            property.name,
            task,
            current.fingerprint().len(),
            property.spec.normalizer
        );
        input_file_properties.insert(property.name.clone(), current.into_fingerprint());
    }

    let output_file_properties = capture_outputs(task, &declaration.output_files, snapshotter)?;

    let detected_overlapping_outputs = output_file_properties.iter().find_map(|(name, current)| {
        let after_previous = previous
            .and_then(|previous| previous.output_file_properties.get(name))
            .unwrap_or_else(|| FileCollectionFingerprint::empty_ref());
        OverlappingOutputs::detect(name, after_previous, current.fingerprint())
    });
    if let Some(overlap) = &detected_overlapping_outputs {
        warn!(
            "Overlapping outputs in {}: property '{}' contains {} which it did not produce",
            task,
            overlap.property_name,
            overlap.overlapped_path.display()
        );
    }

    Ok(BeforeExecutionState {
        implementation: declaration.implementation.clone(),
        action_implementations: declaration.action_implementations.clone(),
        input_value_properties: declaration.input_values.clone(),
        input_file_properties,
        output_file_properties,
        detected_overlapping_outputs,
    })
}

/// Snapshot output properties and fingerprint them by absolute path
pub(crate) fn capture_outputs(
    task: &str,
    outputs: &[OutputFileProperty],
    snapshotter: &FileSystemSnapshotter,
) -> Result<BTreeMap<String, CurrentFileCollectionFingerprint>> {
    let mut captured = BTreeMap::new();
    for property in outputs {
        if captured.contains_key(&property.name) {
            return Err(ExecutionError::duplicate(task, &property.name, PropertyKind::Output));
        }
        let snapshot = snapshotter
            .snapshot_roots(&property.roots)
            .map_err(FingerprintError::from)
            .map_err(ExecutionError::snapshot(task, &property.name, PropertyKind::Output))?;
        let fingerprint = fingerprint_outputs(&snapshot);
        debug!(
            "Fingerprinted output property '{}' of {}: {} entries",
            property.name,
            task,
            fingerprint.len()
        );
        captured.insert(
            property.name.clone(),
            CurrentFileCollectionFingerprint::new(fingerprint, snapshot),
        );
    }
    Ok(captured)
}
