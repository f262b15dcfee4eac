//! Resolving a window to archive keys and streaming those archives in order.

use crate::archive::stream_archive;
use crate::error::{RetrievalError, RetrievalResult};
use crate::fetch::{RetryPolicy, RetryingFetcher};
use futures::StreamExt;
use logvault_core::config::RetrievalConfig;
use logvault_core::{ArchiveKey, KeyParser, ScanState, WindowRequest, listing_prefix};
use logvault_storage::{ListingOptions, ObjectStore, ObjectStoreListStreamExt};
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Totals for a completed retrieval.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AssemblyReport {
    pub archives: usize,
    pub entries: usize,
    pub bytes_written: u64,
    /// Failed attempts that were retried successfully.
    pub retries: u32,
}

/// Lists, fetches and decodes the archives of one window, strictly in order.
#[derive(Clone)]
pub struct WindowAssembler {
    store: Arc<dyn ObjectStore>,
    parser: KeyParser,
    lookback: time::Duration,
    page_size: usize,
    fetcher: RetryingFetcher,
    cancel: CancellationToken,
}

impl WindowAssembler {
    pub fn new(store: Arc<dyn ObjectStore>, config: &RetrievalConfig) -> Self {
        let fetcher = RetryingFetcher::new(store.clone(), RetryPolicy::from_config(config));
        Self {
            store,
            parser: KeyParser::new(config.archive_name.clone()),
            lookback: config.lookback(),
            page_size: config.list_page_size,
            fetcher,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop the retrieval (with `Cancelled`) once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn parser(&self) -> &KeyParser {
        &self.parser
    }

    fn ensure_live(&self) -> RetrievalResult<()> {
        if self.cancel.is_cancelled() {
            return Err(RetrievalError::Cancelled);
        }
        Ok(())
    }

    /// Select the archive keys covering `request`.
    ///
    /// The listing starts a lookback before the window and is abandoned as soon as
    /// the window closes, so later pages are never requested.
    #[instrument(skip(self), fields(prefix = %request.prefix()))]
    pub async fn resolve(&self, request: &WindowRequest) -> RetrievalResult<Vec<ArchiveKey>> {
        let mut options = ListingOptions::new(self.page_size);
        match self
            .parser
            .scan_offset(request.prefix(), request.begin(), self.lookback)
        {
            Some(offset) => options = options.start_after(offset),
            None => tracing::debug!("lookback reaches past the first archive, listing from the root"),
        }
        let mut listing = self
            .store
            .list_stream_ext(&listing_prefix(request.prefix()), options);

        let mut state = ScanState::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(RetrievalError::Cancelled),
                next = listing.next() => next,
            };
            let Some(raw) = next else {
                break;
            };
            let raw = raw.map_err(RetrievalError::ListingFailed)?;
            let Some(key) = self.parser.parse(&raw) else {
                continue;
            };
            state = state.step(request, key);
            if state.is_closed() {
                break;
            }
        }

        let selected = state.into_selected();
        tracing::debug!(count = selected.len(), "resolved archive keys");
        Ok(selected)
    }

    /// Fetch and decode `keys` onto `sink` in the given order.
    ///
    /// Stops at the first failure; whatever was written before it stays written.
    pub async fn stream<W>(&self, keys: &[ArchiveKey], sink: &mut W) -> RetrievalResult<AssemblyReport>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let mut report = AssemblyReport::default();

        for key in keys {
            self.ensure_live()?;
            let archive = self.fetcher.fetch(key, &self.cancel).await?;
            report.retries += archive.attempts - 1;

            let streamed = stream_archive(&archive, sink).await?;
            report.archives += 1;
            report.entries += streamed.entries;
            report.bytes_written += streamed.bytes_written;
        }

        if let Some(last) = keys.last() {
            sink.flush()
                .await
                .map_err(|source| RetrievalError::CopyFailed {
                    key: last.to_string(),
                    entry: "(flush)".to_string(),
                    source,
                })?;
        }

        Ok(report)
    }

    /// Resolve the window and stream its archives onto `sink`.
    #[instrument(skip(self, sink), fields(prefix = %request.prefix(), begin = %request.begin(), end = %request.end()))]
    pub async fn assemble<W>(
        &self,
        request: &WindowRequest,
        sink: &mut W,
    ) -> RetrievalResult<AssemblyReport>
    where
        W: AsyncWrite + Unpin + Send + ?Sized,
    {
        let keys = self.resolve(request).await?;
        let report = self.stream(&keys, sink).await?;
        tracing::info!(
            archives = report.archives,
            bytes = report.bytes_written,
            retries = report.retries,
            "window assembled"
        );
        Ok(report)
    }
}
