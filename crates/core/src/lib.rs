//! Core domain types and shared logic for logvault.
//!
//! This crate defines the data model used across all other crates:
//! - Archive keys and the timestamps embedded in them
//! - Retrieval windows and the scan that selects archives for them
//! - The envelope stored in front of uploaded logs
//! - Configuration

pub mod archive_key;
pub mod config;
pub mod error;
pub mod stored_log;
pub mod window;

pub use archive_key::{ArchiveKey, KeyParser, UnparsableKey, listing_prefix};
pub use error::{Error, Result};
pub use stored_log::StoredLogHeader;
pub use window::{ScanState, WindowRequest, select_window};
