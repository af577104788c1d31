//! Change detection configuration, read from TOML

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uptodate_core::{FileSystemSnapshotter, SnapshotExcludes, SnapshotterOptions};
use uptodate_history::{FileHistoryStore, HistoryStore, MemoryHistoryStore, SledHistoryStore};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeDetectionConfig {
    #[serde(default)]
    pub snapshot: SnapshotConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Apply the built-in excludes for editor and VCS metadata (default: true)
    #[serde(default = "default_true")]
    pub default_excludes: bool,

    /// Additional gitignore-syntax patterns
    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    #[serde(default = "default_mmap_threshold")]
    pub mmap_threshold_bytes: u64,

    #[serde(default = "default_retries")]
    pub stable_read_retries: u8,

    #[serde(default = "default_true")]
    pub parallel_hashing: bool,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            default_excludes: true,
            exclude_patterns: vec![],
            mmap_threshold_bytes: default_mmap_threshold(),
            stable_read_retries: default_retries(),
            parallel_hashing: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryBackend {
    #[default]
    Sled,
    File,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default)]
    pub backend: HistoryBackend,

    /// Relative paths resolve against the working directory
    #[serde(default = "default_history_directory")]
    pub directory: PathBuf,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            backend: HistoryBackend::default(),
            directory: default_history_directory(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Execute every task regardless of its history
    #[serde(default)]
    pub rerun_tasks: bool,
}

fn default_true() -> bool {
    true
}

fn default_mmap_threshold() -> u64 {
    SnapshotterOptions::default().mmap_threshold_bytes
}

fn default_retries() -> u8 {
    SnapshotterOptions::default().stable_read_retries
}

fn default_history_directory() -> PathBuf {
    PathBuf::from(".uptodate/history")
}

impl ChangeDetectionConfig {
    /// Load from `path`; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => {
                return Err(err).with_context(|| format!("Failed to read {}", path.display()))
            }
        };
        Self::from_toml_str(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse change detection config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.snapshot.stable_read_retries == 0 {
            bail!("snapshot.stable_read_retries must be at least 1");
        }
        Ok(())
    }

    pub fn snapshotter(&self) -> Result<FileSystemSnapshotter> {
        let excludes = SnapshotExcludes::builder()
            .with_defaults(self.snapshot.default_excludes)
            .patterns(self.snapshot.exclude_patterns.iter().cloned())
            .build()
            .context("Invalid snapshot exclude pattern")?;
        let options = SnapshotterOptions {
            mmap_threshold_bytes: self.snapshot.mmap_threshold_bytes,
            stable_read_retries: self.snapshot.stable_read_retries,
            parallel_hashing: self.snapshot.parallel_hashing,
        };
        Ok(FileSystemSnapshotter::new(excludes, options))
    }

    pub fn open_history_store(&self) -> Result<Arc<dyn HistoryStore>> {
        let directory = &self.history.directory;
        let store: Arc<dyn HistoryStore> = match self.history.backend {
            HistoryBackend::Sled => {
                std::fs::create_dir_all(directory)
                    .with_context(|| format!("Failed to create {}", directory.display()))?;
                Arc::new(
                    SledHistoryStore::open(directory)
                        .with_context(|| format!("Failed to open history in {}", directory.display()))?,
                )
            }
            HistoryBackend::File => Arc::new(FileHistoryStore::new(directory)),
            HistoryBackend::Memory => Arc::new(MemoryHistoryStore::new()),
        };
        Ok(store)
    }
}
