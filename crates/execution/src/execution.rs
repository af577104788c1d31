//! One evaluation of a task, from mode resolution to persisted history

use crate::capture::{capture_before_execution, capture_outputs};
use crate::config::ChangeDetectionConfig;
use crate::detector;
use crate::error::{ExecutionError, Result};
use crate::mode::{ExecutionMode, ExecutionModeInputs};
use crate::overlap::filter_output_fingerprint;
use crate::state::{BeforeExecutionState, ExecutionStateChanges, RebuildReason};
use crate::task::TaskDeclaration;
use once_cell::sync::OnceCell;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use ulid::Ulid;
use uptodate_core::{CancellationToken, FileSystemSnapshotter};
use uptodate_fingerprint::Fingerprinter;
use uptodate_history::{
    load_previous, AfterPreviousExecutionState, HistoryStore, OriginMetadata, PreviousExecution,
};

/// Shared by every task evaluated in one build invocation
#[derive(Clone)]
pub struct ExecutionContext {
    snapshotter: FileSystemSnapshotter,
    fingerprinter: Fingerprinter,
    history: Arc<dyn HistoryStore>,
    cancellation: CancellationToken,
    build_invocation_id: Ulid,
    rerun_tasks: bool,
}

impl ExecutionContext {
    pub fn new(history: Arc<dyn HistoryStore>) -> Self {
        let cancellation = CancellationToken::new();
        Self {
            snapshotter: FileSystemSnapshotter::default().with_cancellation(cancellation.clone()),
            fingerprinter: Fingerprinter::default(),
            history,
            cancellation,
            build_invocation_id: Ulid::new(),
            rerun_tasks: false,
        }
    }

    /// Build a context with the configured snapshotter, history store and rerun flag
    pub fn from_config(config: &ChangeDetectionConfig) -> anyhow::Result<Self> {
        Ok(Self::new(config.open_history_store()?)
            .with_snapshotter(config.snapshotter()?)
            .with_rerun_tasks(config.execution.rerun_tasks))
    }

    pub fn with_snapshotter(mut self, snapshotter: FileSystemSnapshotter) -> Self {
        self.snapshotter = snapshotter.with_cancellation(self.cancellation.clone());
        self
    }

    pub fn with_fingerprinter(mut self, fingerprinter: Fingerprinter) -> Self {
        self.fingerprinter = fingerprinter;
        self
    }

    /// Share `token` with the snapshotter so long walks stop early
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.snapshotter = self.snapshotter.with_cancellation(token.clone());
        self.cancellation = token;
        self
    }

    pub fn with_rerun_tasks(mut self, rerun_tasks: bool) -> Self {
        self.rerun_tasks = rerun_tasks;
        self
    }

    pub fn build_invocation_id(&self) -> Ulid {
        self.build_invocation_id
    }

    pub fn history(&self) -> &dyn HistoryStore {
        self.history.as_ref()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn task<'c>(&'c self, declaration: &'c TaskDeclaration) -> TaskExecution<'c> {
        TaskExecution::new(self, declaration)
    }
}

/// Up-to-date state of a single task evaluation
///
/// History and the before-execution state are computed at most once.
pub struct TaskExecution<'c> {
    context: &'c ExecutionContext,
    declaration: &'c TaskDeclaration,
    mode: ExecutionMode,
    previous: OnceCell<PreviousExecution>,
    before: OnceCell<BeforeExecutionState>,
    started: Instant,
}

impl<'c> TaskExecution<'c> {
    pub fn new(context: &'c ExecutionContext, declaration: &'c TaskDeclaration) -> Self {
        let inputs = ExecutionModeInputs {
            task_key: declaration.task_key.clone(),
            untracked_reason: declaration.untracked_reason.clone(),
            has_declared_outputs: declaration.has_declared_outputs(),
            has_actions: declaration.has_actions(),
            up_to_date_spec: declaration.up_to_date_spec.clone(),
            rerun_tasks: context.rerun_tasks,
        };
        let mode = inputs.resolve();
        debug!("Execution mode of {}: {}", inputs.task_key, mode);
        Self {
            context,
            declaration,
            mode,
            previous: OnceCell::new(),
            before: OnceCell::new(),
            started: Instant::now(),
        }
    }

    pub fn execution_mode(&self) -> &ExecutionMode {
        &self.mode
    }

    /// The previous execution; never read when the mode does not maintain history
    pub fn previous_execution(&self) -> &PreviousExecution {
        self.previous.get_or_init(|| {
            if !self.mode.is_history_maintained() {
                return PreviousExecution::NotFound;
            }
            load_previous(self.context.history(), &self.declaration.task_key)
        })
    }

    pub fn before_execution_state(&self) -> Result<&BeforeExecutionState> {
        self.before.get_or_try_init(|| {
            capture_before_execution(
                self.declaration,
                self.previous_execution().state(),
                &self.context.snapshotter,
                &self.context.fingerprinter,
            )
        })
    }

    /// Decide whether the task must run and what changed
    pub fn detect_changes(&self) -> Result<ExecutionStateChanges> {
        if let Some(reason) = self.mode.rebuild_reason() {
            // Outputs are filtered against this state once the task has run
            if self.mode.is_history_maintained() {
                self.before_execution_state()?;
            }
            info!("{} will execute: {}", self.declaration.task_key, reason);
            return Ok(ExecutionStateChanges::rebuild(RebuildReason::Mode(reason)));
        }

        let before = self.before_execution_state()?;
        let changes = match self.previous_execution() {
            PreviousExecution::Unreadable(reason) => {
                ExecutionStateChanges::rebuild(RebuildReason::HistoryUnreadable(reason.clone()))
            }
            previous => detector::detect_changes(previous.state(), before),
        };

        match &changes {
            ExecutionStateChanges::Rebuild { reasons } => {
                for reason in reasons {
                    info!("{} is not up-to-date: {}", self.declaration.task_key, reason);
                }
            }
            ExecutionStateChanges::Incremental { input_changes } if input_changes.is_empty() => {
                info!("{} is up-to-date", self.declaration.task_key);
            }
            ExecutionStateChanges::Incremental { input_changes } => {
                info!(
                    "{} has {} changed input files",
                    self.declaration.task_key,
                    input_changes.len()
                );
            }
        }
        Ok(changes)
    }

    /// Why the build cache must not be used, if it must not
    pub fn caching_disabled_reason(&self) -> Result<Option<String>> {
        if !self.mode.is_history_maintained() {
            return Ok(self.mode.rebuild_reason());
        }
        let before = self.before_execution_state()?;
        Ok(before
            .detected_overlapping_outputs
            .as_ref()
            .map(|overlap| overlap.description()))
    }

    pub fn is_allowed_to_use_cached_results(&self) -> Result<bool> {
        if !self.mode.is_allowed_to_use_cached_results() {
            return Ok(false);
        }
        Ok(self.caching_disabled_reason()?.is_none())
    }

    /// Record the state after the task ran
    ///
    /// Outputs are snapshotted again and reduced to what this task produced.
    pub fn capture_after_execution(&self, successful: bool) -> Result<AfterPreviousExecutionState> {
        let task = self.declaration.task_key.as_str();
        if self.context.cancellation.is_cancelled() {
            return Err(ExecutionError::Cancelled(task.to_string()));
        }

        let before = self.before_execution_state()?;
        let previous = self.previous_execution().state();
        let after_outputs = capture_outputs(task, &self.declaration.output_files, &self.context.snapshotter)?;

        let output_file_properties = after_outputs
            .iter()
            .map(|(name, after)| {
                let after_previous = previous.and_then(|p| p.output_file_properties.get(name));
                let filtered = match before.output_file_properties.get(name) {
                    Some(before) => filter_output_fingerprint(after_previous, before, after),
                    None => after.fingerprint().clone(),
                };
                if filtered.hash() != after.hash() {
                    debug!(
                        "Filtered output property '{}' of {}: kept {} of {} entries",
                        name,
                        task,
                        filtered.len(),
                        after.fingerprint().len()
                    );
                }
                (name.clone(), filtered)
            })
            .collect();

        let elapsed = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        Ok(AfterPreviousExecutionState {
            implementation: before.implementation.clone(),
            action_implementations: before.action_implementations.clone(),
            input_value_properties: before.input_value_properties.clone(),
            input_file_properties: before.input_file_properties.clone(),
            output_file_properties,
            successful,
            origin: OriginMetadata::new(self.context.build_invocation_id, elapsed),
        })
    }

    /// Store `after` as the task's history
    ///
    /// Returns whether anything was written. A failed execution that left the
    /// outputs of the previous one untouched keeps the previous history.
    pub fn persist(&self, after: &AfterPreviousExecutionState) -> Result<bool> {
        let task = self.declaration.task_key.as_str();
        if !self.mode.is_history_maintained() {
            debug!("Not storing history of {}: {}", task, self.mode);
            return Ok(false);
        }
        if self.context.cancellation.is_cancelled() {
            debug!("Not storing history of cancelled {}", task);
            return Ok(false);
        }

        let outputs_changed = match self.previous_execution().state() {
            Some(previous) => previous.output_file_properties != after.output_file_properties,
            None => true,
        };
        if !after.successful && !outputs_changed {
            info!("{} failed without changing its outputs, keeping previous history", task);
            return Ok(false);
        }

        self.context.history.store(task, after)?;
        info!(
            "Stored history of {} (successful: {}, {} output properties)",
            task,
            after.successful,
            after.output_file_properties.len()
        );
        Ok(true)
    }
}
