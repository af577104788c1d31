//! What a task declares about itself before it runs

use crate::error::{ExecutionError, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use uptodate_core::hash::hash_bytes;
use uptodate_core::Blake3Hash;
use uptodate_fingerprint::FingerprintSpec;
use uptodate_history::ImplementationSnapshot;

/// A named input file collection and how it is fingerprinted
#[derive(Debug, Clone)]
pub struct InputFileProperty {
    pub name: String,
    pub roots: Vec<PathBuf>,
    pub spec: FingerprintSpec,
}

/// A named output location; outputs are always fingerprinted by absolute path
#[derive(Debug, Clone)]
pub struct OutputFileProperty {
    pub name: String,
    pub roots: Vec<PathBuf>,
}

/// Everything the change detector needs to know about one task
#[derive(Debug, Clone)]
pub struct TaskDeclaration {
    /// Identity of the task in the history store, e.g. `:app:compileJava`
    pub task_key: String,
    pub implementation: ImplementationSnapshot,
    pub action_implementations: Vec<ImplementationSnapshot>,
    pub input_values: BTreeMap<String, Blake3Hash>,
    pub input_files: Vec<InputFileProperty>,
    pub output_files: Vec<OutputFileProperty>,
    /// Results of the task's up-to-date predicates
    pub up_to_date_spec: Vec<bool>,
    pub untracked_reason: Option<String>,
}

impl TaskDeclaration {
    pub fn new(task_key: impl Into<String>, implementation: ImplementationSnapshot) -> Self {
        Self {
            task_key: task_key.into(),
            implementation,
            action_implementations: Vec::new(),
            input_values: BTreeMap::new(),
            input_files: Vec::new(),
            output_files: Vec::new(),
            up_to_date_spec: Vec::new(),
            untracked_reason: None,
        }
    }

    pub fn action(mut self, implementation: ImplementationSnapshot) -> Self {
        self.action_implementations.push(implementation);
        self
    }

    /// Declare an input value; only its hash is kept
    pub fn input_value<T: Serialize + ?Sized>(mut self, name: impl Into<String>, value: &T) -> Result<Self> {
        let name = name.into();
        let hash = hash_value(value).map_err(|source| ExecutionError::ValueSnapshot {
            task: self.task_key.clone(),
            property: name.clone(),
            source,
        })?;
        self.input_values.insert(name, hash);
        Ok(self)
    }

    pub fn input_files<I, P>(mut self, name: impl Into<String>, roots: I, spec: FingerprintSpec) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.input_files.push(InputFileProperty {
            name: name.into(),
            roots: roots.into_iter().map(Into::into).collect(),
            spec,
        });
        self
    }

    pub fn output_files<I, P>(mut self, name: impl Into<String>, roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.output_files.push(OutputFileProperty {
            name: name.into(),
            roots: roots.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn up_to_date_when(mut self, result: bool) -> Self {
        self.up_to_date_spec.push(result);
        self
    }

    pub fn untracked(mut self, reason: impl Into<String>) -> Self {
        self.untracked_reason = Some(reason.into());
        self
    }

    pub fn has_declared_outputs(&self) -> bool {
        !self.output_files.is_empty()
    }

    pub fn has_actions(&self) -> bool {
        !self.action_implementations.is_empty()
    }
}

/// Hash of the bincode encoding of `value`
pub fn hash_value<T: Serialize + ?Sized>(value: &T) -> std::result::Result<Blake3Hash, bincode::Error> {
    Ok(hash_bytes(&bincode::serialize(value)?))
}
