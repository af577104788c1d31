//! Error types for fingerprinting

use crate::normalizer::Normalizer;
use uptodate_core::SnapshotError;

#[derive(Debug, thiserror::Error)]
pub enum FingerprintError {
    #[error("no fingerprinting strategy registered for normalizer '{0}'")]
    UnknownNormalizer(Normalizer),

    #[error("unknown normalizer id '{0}'")]
    UnknownNormalizerId(String),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

pub type Result<T> = std::result::Result<T, FingerprintError>;
