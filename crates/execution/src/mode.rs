//! How a task's state is tracked for one execution

use std::fmt;

/// Resolved execution mode of a task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionMode {
    Incremental,
    NoOutputsWithActions,
    NoOutputsWithoutActions,
    Untracked(String),
    RerunForced,
    UpToDateSpecFalse,
}

/// What the mode is resolved from
#[derive(Debug, Clone, Default)]
pub struct ExecutionModeInputs {
    pub task_key: String,
    pub untracked_reason: Option<String>,
    pub has_declared_outputs: bool,
    pub has_actions: bool,
    pub up_to_date_spec: Vec<bool>,
    pub rerun_tasks: bool,
}

impl ExecutionModeInputs {
    /// Resolve the mode; the first matching rule wins
    pub fn resolve(&self) -> ExecutionMode {
        if let Some(reason) = &self.untracked_reason {
            return ExecutionMode::Untracked(reason.clone());
        }
        if !self.has_declared_outputs && self.up_to_date_spec.is_empty() {
            return if self.has_actions {
                ExecutionMode::NoOutputsWithActions
            } else {
                ExecutionMode::NoOutputsWithoutActions
            };
        }
        if self.rerun_tasks {
            return ExecutionMode::RerunForced;
        }
        if self.up_to_date_spec.iter().any(|satisfied| !satisfied) {
            return ExecutionMode::UpToDateSpecFalse;
        }
        ExecutionMode::Incremental
    }
}

impl ExecutionMode {
    /// Why this mode forces a full execution, if it does
    pub fn rebuild_reason(&self) -> Option<String> {
        match self {
            ExecutionMode::Incremental => None,
            ExecutionMode::NoOutputsWithoutActions => {
                Some("Task has not declared any outputs nor actions.".to_string())
            }
            ExecutionMode::NoOutputsWithActions => {
                Some("Task has not declared any outputs despite executing actions.".to_string())
            }
            ExecutionMode::Untracked(reason) => Some(format!("Task state is not tracked: {reason}")),
            ExecutionMode::RerunForced => Some("Executed with rerun flag.".to_string()),
            ExecutionMode::UpToDateSpecFalse => Some("Task.upToDateWhen is false.".to_string()),
        }
    }

    /// Whether history is read before and written after execution
    pub fn is_history_maintained(&self) -> bool {
        matches!(
            self,
            ExecutionMode::Incremental | ExecutionMode::RerunForced | ExecutionMode::UpToDateSpecFalse
        )
    }

    pub fn is_allowed_to_use_cached_results(&self) -> bool {
        matches!(self, ExecutionMode::Incremental)
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Incremental => f.write_str("incremental"),
            ExecutionMode::NoOutputsWithActions => f.write_str("no outputs with actions"),
            ExecutionMode::NoOutputsWithoutActions => f.write_str("no outputs without actions"),
            ExecutionMode::Untracked(_) => f.write_str("untracked"),
            ExecutionMode::RerunForced => f.write_str("rerun forced"),
            ExecutionMode::UpToDateSpecFalse => f.write_str("up-to-date spec false"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> ExecutionModeInputs {
        ExecutionModeInputs {
            task_key: ":compile".into(),
            has_declared_outputs: true,
            has_actions: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_default_is_incremental() {
        let mode = inputs().resolve();
        assert_eq!(mode, ExecutionMode::Incremental);
        assert_eq!(mode.rebuild_reason(), None);
        assert!(mode.is_history_maintained());
        assert!(mode.is_allowed_to_use_cached_results());
    }

    #[test]
    fn test_untracked_wins_over_everything() {
        let mode = ExecutionModeInputs {
            untracked_reason: Some("touches the network".into()),
            has_declared_outputs: false,
            rerun_tasks: true,
            ..inputs()
        }
        .resolve();
        assert_eq!(mode, ExecutionMode::Untracked("touches the network".into()));
        assert_eq!(
            mode.rebuild_reason().as_deref(),
            Some("Task state is not tracked: touches the network")
        );
        assert!(!mode.is_history_maintained());
    }

    #[test]
    fn test_no_outputs() {
        let without_outputs = ExecutionModeInputs {
            has_declared_outputs: false,
            ..inputs()
        };
        assert_eq!(without_outputs.resolve(), ExecutionMode::NoOutputsWithActions);

        let bare = ExecutionModeInputs {
            has_actions: false,
            ..without_outputs.clone()
        };
        let mode = bare.resolve();
        assert_eq!(mode, ExecutionMode::NoOutputsWithoutActions);
        assert_eq!(
            mode.rebuild_reason().as_deref(),
            Some("Task has not declared any outputs nor actions.")
        );
        assert!(!mode.is_allowed_to_use_cached_results());

        // A predicate keeps an output-less task tracked
        let with_predicate = ExecutionModeInputs {
            up_to_date_spec: vec![true],
            ..without_outputs
        };
        assert_eq!(with_predicate.resolve(), ExecutionMode::Incremental);
    }

    #[test]
    fn test_rerun_before_predicates() {
        let mode = ExecutionModeInputs {
            rerun_tasks: true,
            up_to_date_spec: vec![false],
            ..inputs()
        }
        .resolve();
        assert_eq!(mode, ExecutionMode::RerunForced);
        assert!(mode.is_history_maintained());
        assert!(!mode.is_allowed_to_use_cached_results());
    }

    #[test]
    fn test_false_predicate() {
        let mode = ExecutionModeInputs {
            up_to_date_spec: vec![true, false],
            ..inputs()
        }
        .resolve();
        assert_eq!(mode, ExecutionMode::UpToDateSpecFalse);
        assert_eq!(mode.rebuild_reason().as_deref(), Some("Task.upToDateWhen is false."));
    }
}
