//! Versioned binary encoding of [`AfterPreviousExecutionState`]
//!
//! Format: magic(4) "UTH1" + schema version(2, little-endian) + bincode payload

use crate::error::{DecodeError, HistoryError, Result};
use crate::state::AfterPreviousExecutionState;

pub struct HistoryCodec;

impl HistoryCodec {
    pub const MAGIC: [u8; 4] = *b"UTH1";
    pub const VERSION: u16 = 1;
    const HEADER_LEN: usize = 6;

    pub fn encode(state: &AfterPreviousExecutionState) -> Result<Vec<u8>> {
        let payload = bincode::serialize(state).map_err(HistoryError::Encode)?;
        let mut bytes = Vec::with_capacity(Self::HEADER_LEN + payload.len());
        bytes.extend_from_slice(&Self::MAGIC);
        bytes.extend_from_slice(&Self::VERSION.to_le_bytes());
        bytes.extend_from_slice(&payload);
        Ok(bytes)
    }

    /// Decode a record, rejecting foreign or newer data instead of guessing
    pub fn decode(bytes: &[u8]) -> std::result::Result<AfterPreviousExecutionState, DecodeError> {
        if bytes.len() < Self::HEADER_LEN {
            return Err(DecodeError::Truncated(bytes.len()));
        }
        if bytes[..4] != Self::MAGIC {
            return Err(DecodeError::BadMagic);
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != Self::VERSION {
            return Err(DecodeError::UnsupportedVersion(version));
        }
        bincode::deserialize(&bytes[Self::HEADER_LEN..]).map_err(DecodeError::Corrupt)
    }
}
