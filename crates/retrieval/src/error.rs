//! Retrieval error types.

use logvault_storage::StorageError;
use thiserror::Error;

/// Errors that abort a window retrieval.
///
/// Unparsable keys never appear here; they are skipped during the scan.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("listing archives failed: {0}")]
    ListingFailed(#[source] StorageError),

    #[error("fetching {key} failed after {attempts} attempts: {source}")]
    FetchFailed {
        key: String,
        attempts: u32,
        #[source]
        source: StorageError,
    },

    #[error("archive {key} is not a readable zip: {source}")]
    ArchiveCorrupt {
        key: String,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("reading entry {entry} of {key} failed: {source}")]
    EntryReadFailed {
        key: String,
        entry: String,
        #[source]
        source: std::io::Error,
    },

    #[error("writing entry {entry} of {key} to the output failed: {source}")]
    CopyFailed {
        key: String,
        entry: String,
        #[source]
        source: std::io::Error,
    },

    #[error("retrieval cancelled")]
    Cancelled,
}

impl RetrievalError {
    /// Short machine-readable name, used as a metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ListingFailed(_) => "listing_failed",
            Self::FetchFailed { .. } => "fetch_failed",
            Self::ArchiveCorrupt { .. } => "archive_corrupt",
            Self::EntryReadFailed { .. } => "entry_read_failed",
            Self::CopyFailed { .. } => "copy_failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Result type for retrieval operations.
pub type RetrievalResult<T> = std::result::Result<T, RetrievalError>;
