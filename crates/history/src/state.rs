//! Persisted execution state of a task

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ulid::Ulid;
use uptodate_core::Blake3Hash;
use uptodate_fingerprint::FileCollectionFingerprint;

/// Identity of the code that implements a task or one of its actions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImplementationSnapshot {
    pub type_name: String,
    /// Hash of the code that loaded the type; `None` when it cannot be determined
    pub classloader_hash: Option<Blake3Hash>,
}

impl ImplementationSnapshot {
    pub fn new(type_name: impl Into<String>, classloader_hash: Blake3Hash) -> Self {
        Self {
            type_name: type_name.into(),
            classloader_hash: Some(classloader_hash),
        }
    }

    pub fn with_unknown_classloader(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            classloader_hash: None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.classloader_hash.is_none()
    }

    /// Whether `other` is provably the same implementation
    ///
    /// An unknown classloader matches nothing, not even itself.
    pub fn is_same_implementation(&self, other: &ImplementationSnapshot) -> bool {
        match (self.classloader_hash, other.classloader_hash) {
            (Some(mine), Some(theirs)) => mine == theirs && self.type_name == other.type_name,
            _ => false,
        }
    }
}

impl std::fmt::Display for ImplementationSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.classloader_hash {
            Some(hash) => write!(f, "{}@{}", self.type_name, &hash.to_hex()[..12]),
            None => write!(f, "{}@unknown", self.type_name),
        }
    }
}

/// Where and when a persisted state was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginMetadata {
    pub build_invocation_id: Ulid,
    pub execution_time_millis: u64,
}

impl OriginMetadata {
    pub fn new(build_invocation_id: Ulid, execution_time_millis: u64) -> Self {
        Self {
            build_invocation_id,
            execution_time_millis,
        }
    }
}

/// State recorded after a task executed, read back on its next evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AfterPreviousExecutionState {
    pub implementation: ImplementationSnapshot,
    pub action_implementations: Vec<ImplementationSnapshot>,
    pub input_value_properties: BTreeMap<String, Blake3Hash>,
    pub input_file_properties: BTreeMap<String, FileCollectionFingerprint>,
    /// Filtered output fingerprints: only what this task produced
    pub output_file_properties: BTreeMap<String, FileCollectionFingerprint>,
    pub successful: bool,
    pub origin: OriginMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;
    use uptodate_core::hash::hash_bytes;

    #[test]
    fn test_known_implementations_match() {
        let a = ImplementationSnapshot::new("Compile", hash_bytes(b"v1"));
        let b = ImplementationSnapshot::new("Compile", hash_bytes(b"v1"));
        let c = ImplementationSnapshot::new("Compile", hash_bytes(b"v2"));
        let d = ImplementationSnapshot::new("Jar", hash_bytes(b"v1"));
        assert!(a.is_same_implementation(&b));
        assert!(!a.is_same_implementation(&c));
        assert!(!a.is_same_implementation(&d));
    }

    #[test]
    fn test_unknown_classloader_never_matches() {
        let unknown = ImplementationSnapshot::with_unknown_classloader("Compile");
        let known = ImplementationSnapshot::new("Compile", hash_bytes(b"v1"));
        assert!(!unknown.is_same_implementation(&unknown.clone()));
        assert!(!unknown.is_same_implementation(&known));
        assert!(!known.is_same_implementation(&unknown));
        assert_eq!(unknown.to_string(), "Compile@unknown");
    }
}
