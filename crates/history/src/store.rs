//! Durable history stores keyed by task identity

use crate::codec::HistoryCodec;
use crate::error::{HistoryError, Result};
use crate::state::AfterPreviousExecutionState;
use dashmap::DashMap;
use sled::Db;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uptodate_core::hash::hash_bytes;

/// Storage for the most recent [`AfterPreviousExecutionState`] of each task
pub trait HistoryStore: Send + Sync {
    /// Read the state stored under `key`
    ///
    /// Records that cannot be decoded surface as [`HistoryError::Decode`].
    fn load(&self, key: &str) -> Result<Option<AfterPreviousExecutionState>>;

    /// Replace the state stored under `key`; never leaves a partial record visible
    fn store(&self, key: &str, state: &AfterPreviousExecutionState) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;
}

/// Outcome of reading a task's previous execution
#[derive(Debug, Clone)]
pub enum PreviousExecution {
    Available(AfterPreviousExecutionState),
    NotFound,
    /// A record exists but could not be read; carries the reason
    Unreadable(String),
}

impl PreviousExecution {
    pub fn state(&self) -> Option<&AfterPreviousExecutionState> {
        match self {
            PreviousExecution::Available(state) => Some(state),
            _ => None,
        }
    }
}

/// Load the previous execution of `key`, turning every failure into a value
pub fn load_previous(store: &dyn HistoryStore, key: &str) -> PreviousExecution {
    match store.load(key) {
        Ok(Some(state)) => PreviousExecution::Available(state),
        Ok(None) => PreviousExecution::NotFound,
        Err(err) => {
            warn!("History of {} is unreadable: {}", key, error_chain(&err));
            PreviousExecution::Unreadable(error_chain(&err))
        }
    }
}

fn error_chain(err: &HistoryError) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// History in a sled database
pub struct SledHistoryStore {
    db: Db,
}

impl SledHistoryStore {
    /// Open or create the store inside `directory`
    pub fn open(directory: &Path) -> Result<Self> {
        let db = sled::open(directory.join("history.db"))?;
        Ok(Self { db })
    }

    /// Number of stored records
    pub fn count(&self) -> usize {
        self.db.len()
    }
}

impl HistoryStore for SledHistoryStore {
    fn load(&self, key: &str) -> Result<Option<AfterPreviousExecutionState>> {
        let value = match self.db.get(key.as_bytes())? {
            Some(value) => value,
            None => return Ok(None),
        };
        Ok(Some(HistoryCodec::decode(&value)?))
    }

    fn store(&self, key: &str, state: &AfterPreviousExecutionState) -> Result<()> {
        let value = HistoryCodec::encode(state)?;
        self.db.insert(key.as_bytes(), value)?;

        // Flush to ensure durability
        self.db.flush()?;
        debug!("Stored history of {} in sled", key);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.db.remove(key.as_bytes())?;
        self.db.flush()?;
        Ok(())
    }
}

/// History as one file per task, written temp-then-rename
pub struct FileHistoryStore {
    root: PathBuf,
}

impl FileHistoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Record path of `key`: `<root>/<hh>/<rest>.bin` over the hex hash of the key
    pub fn path_for(&self, key: &str) -> PathBuf {
        let hex = hash_bytes(key.as_bytes()).to_hex();
        let (prefix, rest) = hex.split_at(2);
        self.root.join(prefix).join(format!("{rest}.bin"))
    }
}

impl HistoryStore for FileHistoryStore {
    fn load(&self, key: &str) -> Result<Option<AfterPreviousExecutionState>> {
        let path = self.path_for(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(HistoryError::Io { path, source: err }),
        };
        Ok(Some(HistoryCodec::decode(&bytes)?))
    }

    fn store(&self, key: &str, state: &AfterPreviousExecutionState) -> Result<()> {
        let bytes = HistoryCodec::encode(state)?;
        let target = self.path_for(key);
        let parent = target.parent().unwrap_or(&self.root).to_path_buf();
        fs::create_dir_all(&parent).map_err(HistoryError::io(&parent))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&parent).map_err(HistoryError::io(&parent))?;
        tmp.write_all(&bytes).map_err(HistoryError::io(tmp.path()))?;
        tmp.as_file().sync_all().map_err(HistoryError::io(tmp.path()))?;
        tmp.persist(&target)
            .map_err(|err| HistoryError::Io {
                path: target.clone(),
                source: err.error,
            })?;
        debug!("Stored history of {} at {}", key, target.display());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(HistoryError::Io { path, source: err }),
        }
    }
}

/// History kept in memory, encoded the same way as the durable stores
#[derive(Default)]
pub struct MemoryHistoryStore {
    records: DashMap<String, Vec<u8>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put raw bytes under `key`, bypassing the codec
    pub fn insert_raw(&self, key: impl Into<String>, bytes: Vec<u8>) {
        self.records.insert(key.into(), bytes);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn load(&self, key: &str) -> Result<Option<AfterPreviousExecutionState>> {
        match self.records.get(key) {
            Some(bytes) => Ok(Some(HistoryCodec::decode(bytes.value())?)),
            None => Ok(None),
        }
    }

    fn store(&self, key: &str, state: &AfterPreviousExecutionState) -> Result<()> {
        let bytes = HistoryCodec::encode(state)?;
        self.records.insert(key.to_string(), bytes);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.records.remove(key);
        Ok(())
    }
}
