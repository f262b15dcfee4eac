//! Object store wrappers for observing what the server asks of storage.

use async_trait::async_trait;
use bytes::Bytes;
use logvault_storage::{ListingOptions, ObjectStore, PageStream, StorageResult, StreamingUpload};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Counts `get` calls on an inner store. Gets past `stall_after` never
/// complete unless the caller gives up on them.
#[allow(dead_code)]
pub struct CountingStore {
    inner: Arc<dyn ObjectStore>,
    stall_after: usize,
    gets: AtomicUsize,
    stalled: Arc<AtomicUsize>,
}

/// Decrements the stalled count when a stalled get is dropped.
struct StallGuard(Arc<AtomicUsize>);

impl Drop for StallGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[allow(dead_code)]
impl CountingStore {
    pub fn stalling_after(inner: Arc<dyn ObjectStore>, stall_after: usize) -> Self {
        Self {
            inner,
            stall_after,
            gets: AtomicUsize::new(0),
            stalled: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    /// Gets currently parked.
    pub fn stalled(&self) -> usize {
        self.stalled.load(Ordering::SeqCst)
    }

    /// Wait until `condition` holds, polling for up to five seconds.
    pub async fn wait_until(&self, condition: impl Fn(&Self) -> bool) -> bool {
        for _ in 0..500 {
            if condition(self) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        condition(self)
    }
}

#[async_trait]
impl ObjectStore for CountingStore {
    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let n = self.gets.fetch_add(1, Ordering::SeqCst) + 1;
        if n > self.stall_after {
            self.stalled.fetch_add(1, Ordering::SeqCst);
            let _guard = StallGuard(self.stalled.clone());
            futures::future::pending::<()>().await;
        }
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        self.inner.put(key, data).await
    }

    async fn put_stream(&self, key: &str) -> StorageResult<Box<dyn StreamingUpload>> {
        self.inner.put_stream(key).await
    }

    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }

    fn locator(&self, key: &str) -> String {
        self.inner.locator(key)
    }

    fn list_pages<'a>(&'a self, prefix: &str, options: ListingOptions) -> PageStream<'a> {
        self.inner.list_pages(prefix, options)
    }
}
