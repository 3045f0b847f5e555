use thiserror::Error;

use crate::ledger::LedgerError;
use crate::models::AbortReason;
use crate::sources::{RegistryError, SourceError};
use crate::storage::StorageError;

/// Failures that end a run, or keep it from starting
#[derive(Debug, Error)]
pub enum RunError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Source(#[from] RegistryError),

    #[error("work {0} is not in the catalog; pass work_url")]
    UnknownWork(String),

    #[error("cannot resolve work metadata: {0}")]
    WorkMetadata(SourceError),

    #[error("cannot list works: {0}")]
    WorkListing(SourceError),

    #[error("object store unavailable: {0}")]
    ObjectStore(StorageError),

    #[error("metadata store unavailable: {0}")]
    MetadataStore(#[from] LedgerError),

    #[error("run cancelled")]
    Cancelled,
}

impl RunError {
    /// Machine-readable reason code surfaced to callers
    pub fn code(&self) -> &'static str {
        match self {
            RunError::InvalidRequest(_) => "invalid-request",
            RunError::Source(_) => "unsupported-source",
            RunError::UnknownWork(_) => "unknown-work",
            RunError::WorkMetadata(_) => "work-metadata-unresolved",
            RunError::WorkListing(_) => "work-listing-failed",
            RunError::ObjectStore(_) => "object-store-unavailable",
            RunError::MetadataStore(_) => "metadata-store-unavailable",
            RunError::Cancelled => "cancelled",
        }
    }

    /// Raised before any run record exists; the caller gets no report
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            RunError::InvalidRequest(_) | RunError::Source(_) | RunError::UnknownWork(_)
        )
    }

    pub fn abort_reason(&self) -> AbortReason {
        AbortReason {
            code: self.code().to_string(),
            message: self.to_string(),
        }
    }
}
