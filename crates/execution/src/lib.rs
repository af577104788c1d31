//! Uptodate Execution - deciding whether a task must run
//!
//! This crate provides:
//! - Task declarations: implementation, values, input and output files
//! - Before-execution state capture and change detection against history
//! - Execution mode resolution
//! - Overlapping-output detection and filtering
//! - The per-task lifecycle from mode to persisted history
//! - TOML configuration

pub mod capture;
pub mod config;
pub mod detector;
pub mod error;
pub mod execution;
pub mod mode;
pub mod overlap;
pub mod state;
pub mod task;

// Re-exports
pub use capture::capture_before_execution;
pub use config::{ChangeDetectionConfig, HistoryBackend};
pub use detector::detect_changes;
pub use error::{ExecutionError, PropertyKind, Result};
pub use execution::{ExecutionContext, TaskExecution};
pub use mode::{ExecutionMode, ExecutionModeInputs};
pub use overlap::{filter_output_fingerprint, OverlappingOutputs};
pub use state::{BeforeExecutionState, Change, ChangedFile, ExecutionStateChanges, RebuildReason};
pub use task::{hash_value, InputFileProperty, OutputFileProperty, TaskDeclaration};
