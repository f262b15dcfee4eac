//! Storage trait definitions.

use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::time::Duration;

/// A boxed stream of object keys, borrowing the store it lists.
pub type KeyStream<'a> = Pin<Box<dyn Stream<Item = StorageResult<String>> + Send + 'a>>;

/// A boxed stream of listing pages, borrowing the store it lists.
pub type PageStream<'a> = Pin<Box<dyn Stream<Item = StorageResult<ListingPage>> + Send + 'a>>;

/// Page size constraints for listing operations.
pub const DEFAULT_PAGE_SIZE: usize = 1000;
pub const MIN_PAGE_SIZE: usize = 100;
pub const MAX_PAGE_SIZE: usize = 10000;

/// A single page of listing results, in ascending key order.
#[derive(Clone, Debug, Default)]
pub struct ListingPage {
    pub keys: Vec<String>,
}

/// Options for listing operations.
#[derive(Clone, Debug)]
pub struct ListingOptions {
    /// Number of keys to fetch per page.
    ///
    /// This value will be clamped to [MIN_PAGE_SIZE, MAX_PAGE_SIZE].
    pub page_size: usize,
    /// Only keys strictly greater than this one are returned.
    pub start_after: Option<String>,
}

impl ListingOptions {
    /// Create new listing options with the given page size.
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            start_after: None,
        }
    }

    /// Begin the listing after `key`.
    pub fn start_after(mut self, key: impl Into<String>) -> Self {
        self.start_after = Some(key.into());
        self
    }

    /// Get the normalized page size.
    pub fn normalized_page_size(&self) -> usize {
        self.page_size.clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE)
    }

    /// Whether `key` lies after the configured offset.
    pub fn admits(&self, key: &str) -> bool {
        self.start_after
            .as_deref()
            .is_none_or(|after| key > after)
    }
}

impl Default for ListingOptions {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

/// Object store holding log archives and uploaded logs.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Get an object's full content.
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Put an object atomically.
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()>;

    /// Start a streaming upload. The object becomes visible on `finish`.
    async fn put_stream(&self, key: &str) -> StorageResult<Box<dyn StreamingUpload>>;

    /// Get the name of this storage backend (e.g., "s3", "filesystem").
    fn backend_name(&self) -> &'static str;

    /// A human-usable location for `key`, such as a URL.
    fn locator(&self, key: &str) -> String;

    /// List objects under `prefix` in ascending lexicographic order, one page at a time.
    ///
    /// Pages are requested from the backend only as the stream is polled, so dropping
    /// the stream stops the listing. When `options.start_after` is set, only keys
    /// strictly greater than it are returned.
    fn list_pages<'a>(&'a self, prefix: &str, options: ListingOptions) -> PageStream<'a>;

    /// A URL a client can `PUT` the object for `key` to, valid for `expires_in`.
    ///
    /// Backends without request signing return `Unsupported`.
    async fn presign_put(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        let _ = (key, expires_in);
        Err(StorageError::Unsupported(self.backend_name()))
    }

    /// Verify storage backend connectivity.
    ///
    /// The default implementation returns Ok(()), suitable for backends that
    /// don't require connectivity verification.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Trait for streaming uploads.
#[async_trait]
pub trait StreamingUpload: Send {
    /// Write a chunk of data.
    async fn write(&mut self, data: Bytes) -> StorageResult<()>;

    /// Finish the upload and return the total bytes written.
    async fn finish(self: Box<Self>) -> StorageResult<u64>;

    /// Abort the upload.
    async fn abort(self: Box<Self>) -> StorageResult<()>;
}

/// Extension trait providing a flat key stream over `list_pages()`.
///
/// Automatically implemented for every `ObjectStore`.
pub trait ObjectStoreListStreamExt: ObjectStore {
    /// List objects under `prefix` as a flat stream of keys.
    fn list_stream_ext<'a>(&'a self, prefix: &str, options: ListingOptions) -> KeyStream<'a> {
        let key_stream = self
            .list_pages(prefix, options)
            .flat_map(|page_result| match page_result {
                Ok(page) => futures::stream::iter(page.keys.into_iter().map(Ok)).boxed(),
                Err(e) => futures::stream::once(async move { Err(e) }).boxed(),
            });

        Box::pin(key_stream)
    }
}

impl<T: ObjectStore + ?Sized> ObjectStoreListStreamExt for T {}
