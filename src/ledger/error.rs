use thiserror::Error;

use super::partitions::EntityKind;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Fjall error: {0}")]
    Fjall(#[from] fjall::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Record {key} is a {actual:?}, expected {expected:?}")]
    KindMismatch {
        key: String,
        expected: EntityKind,
        actual: EntityKind,
    },

    #[error("Invalid key format: {0}")]
    InvalidKey(String),

    #[error("Metadata store unavailable: {0}")]
    Unavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
