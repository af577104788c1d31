//! Uptodate History - persisted execution state
//!
//! This crate provides:
//! - The after-execution state recorded for each task
//! - Implementation identity and origin metadata
//! - A versioned binary codec ("UTH1")
//! - History stores: sled, atomic files, and in-memory

pub mod codec;
pub mod error;
pub mod state;
pub mod store;

// Re-exports
pub use codec::HistoryCodec;
pub use error::{DecodeError, HistoryError, Result};
pub use state::{AfterPreviousExecutionState, ImplementationSnapshot, OriginMetadata};
pub use store::{
    load_previous, FileHistoryStore, HistoryStore, MemoryHistoryStore, PreviousExecution,
    SledHistoryStore,
};
