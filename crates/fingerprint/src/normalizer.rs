//! Path normalization policies and the registry that resolves them

use crate::error::{FingerprintError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uptodate_core::{FileSystemLocationSnapshot, RelativePath};

/// Which part of an entry's path survives into its fingerprint key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Normalizer {
    AbsolutePath,
    RelativePath,
    NameOnly,
    IgnorePath,
}

impl Normalizer {
    pub const ALL: [Normalizer; 4] = [
        Normalizer::AbsolutePath,
        Normalizer::RelativePath,
        Normalizer::NameOnly,
        Normalizer::IgnorePath,
    ];

    /// Stable identifier used in configuration and persisted state
    pub fn id(self) -> &'static str {
        match self {
            Normalizer::AbsolutePath => "absolute-path",
            Normalizer::RelativePath => "relative-path",
            Normalizer::NameOnly => "name-only",
            Normalizer::IgnorePath => "ignore-path",
        }
    }
}

impl fmt::Display for Normalizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Normalizer {
    type Err = FingerprintError;

    fn from_str(s: &str) -> Result<Self> {
        Normalizer::ALL
            .into_iter()
            .find(|normalizer| normalizer.id() == s)
            .ok_or_else(|| FingerprintError::UnknownNormalizerId(s.to_string()))
    }
}

/// Whether entry order is part of a fingerprint's identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EntryOrdering {
    #[default]
    Unordered,
    /// Declaration order matters, e.g. a classpath
    OrderSensitive,
}

/// Whether directory entries contribute to a fingerprint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DirectorySensitivity {
    #[default]
    Default,
    IgnoreDirectories,
}

/// How one file property is fingerprinted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FingerprintSpec {
    pub normalizer: Normalizer,
    pub ordering: EntryOrdering,
    pub directory_sensitivity: DirectorySensitivity,
    /// Record missing roots instead of dropping them
    pub track_missing: bool,
}

impl FingerprintSpec {
    pub fn new(normalizer: Normalizer) -> Self {
        Self {
            normalizer,
            ordering: EntryOrdering::Unordered,
            directory_sensitivity: DirectorySensitivity::Default,
            track_missing: false,
        }
    }

    pub fn order_sensitive(mut self) -> Self {
        self.ordering = EntryOrdering::OrderSensitive;
        self
    }

    pub fn ignore_directories(mut self) -> Self {
        self.directory_sensitivity = DirectorySensitivity::IgnoreDirectories;
        self
    }

    pub fn track_missing(mut self) -> Self {
        self.track_missing = true;
        self
    }

    /// The spec every output property is fingerprinted with
    pub fn outputs() -> Self {
        Self::new(Normalizer::AbsolutePath)
    }
}

/// Derives the fingerprint key of a snapshot entry
pub trait FingerprintingStrategy: Send + Sync {
    fn normalizer(&self) -> Normalizer;

    /// Key for `entry`, found at `relative_path` below `root`
    ///
    /// `None` leaves the entry out of the fingerprint.
    fn normalized_key(
        &self,
        root: &FileSystemLocationSnapshot,
        entry: &FileSystemLocationSnapshot,
        relative_path: &RelativePath<'_>,
    ) -> Option<String>;
}

pub struct AbsolutePathStrategy;

impl FingerprintingStrategy for AbsolutePathStrategy {
    fn normalizer(&self) -> Normalizer {
        Normalizer::AbsolutePath
    }

    fn normalized_key(
        &self,
        _root: &FileSystemLocationSnapshot,
        entry: &FileSystemLocationSnapshot,
        _relative_path: &RelativePath<'_>,
    ) -> Option<String> {
        Some(entry.absolute_path().to_string_lossy().into_owned())
    }
}

pub struct RelativePathStrategy;

impl FingerprintingStrategy for RelativePathStrategy {
    fn normalizer(&self) -> Normalizer {
        Normalizer::RelativePath
    }

    fn normalized_key(
        &self,
        root: &FileSystemLocationSnapshot,
        entry: &FileSystemLocationSnapshot,
        relative_path: &RelativePath<'_>,
    ) -> Option<String> {
        if !relative_path.is_root() {
            return Some(relative_path.to_slash_string());
        }
        // A root directory is the base everything else is relative to
        match root {
            FileSystemLocationSnapshot::Directory(_) => Some(String::new()),
            _ => Some(entry.name().to_string()),
        }
    }
}

pub struct NameOnlyStrategy;

impl FingerprintingStrategy for NameOnlyStrategy {
    fn normalizer(&self) -> Normalizer {
        Normalizer::NameOnly
    }

    fn normalized_key(
        &self,
        _root: &FileSystemLocationSnapshot,
        entry: &FileSystemLocationSnapshot,
        relative_path: &RelativePath<'_>,
    ) -> Option<String> {
        match entry {
            FileSystemLocationSnapshot::Directory(_) if relative_path.is_root() => Some(String::new()),
            _ => Some(entry.name().to_string()),
        }
    }
}

pub struct IgnorePathStrategy;

impl FingerprintingStrategy for IgnorePathStrategy {
    fn normalizer(&self) -> Normalizer {
        Normalizer::IgnorePath
    }

    fn normalized_key(
        &self,
        _root: &FileSystemLocationSnapshot,
        entry: &FileSystemLocationSnapshot,
        _relative_path: &RelativePath<'_>,
    ) -> Option<String> {
        match entry {
            FileSystemLocationSnapshot::RegularFile(file) => Some(file.content_hash().to_hex()),
            _ => None,
        }
    }
}

/// Explicit lookup table from [`Normalizer`] to its strategy
///
/// Built once and handed to every [`crate::Fingerprinter`].
pub struct NormalizerRegistry {
    strategies: Vec<Box<dyn FingerprintingStrategy>>,
}

impl NormalizerRegistry {
    /// A registry without strategies
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    /// The four built-in strategies
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(AbsolutePathStrategy));
        registry.register(Box::new(RelativePathStrategy));
        registry.register(Box::new(NameOnlyStrategy));
        registry.register(Box::new(IgnorePathStrategy));
        registry
    }

    /// Add a strategy, replacing any earlier one for the same normalizer
    pub fn register(&mut self, strategy: Box<dyn FingerprintingStrategy>) {
        let normalizer = strategy.normalizer();
        self.strategies.retain(|existing| existing.normalizer() != normalizer);
        self.strategies.push(strategy);
    }

    pub fn get(&self, normalizer: Normalizer) -> Result<&dyn FingerprintingStrategy> {
        self.strategies
            .iter()
            .find(|strategy| strategy.normalizer() == normalizer)
            .map(|strategy| strategy.as_ref())
            .ok_or(FingerprintError::UnknownNormalizer(normalizer))
    }

    /// Resolve a normalizer by its stable id
    pub fn get_by_id(&self, id: &str) -> Result<&dyn FingerprintingStrategy> {
        self.get(id.parse()?)
    }
}

impl Default for NormalizerRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
