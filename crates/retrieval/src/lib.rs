//! Retrieval of log archives for a time window.
//!
//! The pipeline lists archive keys for a prefix in order, selects those covering
//! the window, downloads each with retries and writes the decompressed entries
//! to a single output sink:
//!
//! - [`WindowAssembler`] drives the whole pipeline
//! - [`RetryingFetcher`] downloads one archive with a fixed-delay retry
//! - [`stream_archive`] decodes one archive onto the sink

pub mod archive;
pub mod assembler;
pub mod error;
pub mod fetch;

pub use archive::{StreamedArchive, stream_archive};
pub use assembler::{AssemblyReport, WindowAssembler};
pub use error::{RetrievalError, RetrievalResult};
pub use fetch::{FetchedArchive, Retried, RetryFailure, RetryPolicy, RetryingFetcher};
pub use tokio_util::sync::CancellationToken;
