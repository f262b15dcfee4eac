use async_trait::async_trait;
use bytes::Bytes;
use logvault_storage::error::{StorageError, StorageResult};
use logvault_storage::traits::{
    ListingOptions, ListingPage, ObjectStore, PageStream, StreamingUpload,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Synthetic backend listing hourly archives for one device, counting every page
/// it produces. Optionally fails when asked for a given page.
#[allow(dead_code)]
pub struct InstrumentedBackend {
    pub total_keys: usize,
    pub page_size: usize,
    pub fail_on_page: Option<usize>,
    pub pages_fetched: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl InstrumentedBackend {
    pub fn new(total_keys: usize, page_size: usize) -> (Arc<Self>, Arc<AtomicUsize>) {
        let counter = Arc::new(AtomicUsize::new(0));
        let backend = Arc::new(Self {
            total_keys,
            page_size,
            fail_on_page: None,
            pages_fetched: counter.clone(),
        });
        (backend, counter)
    }

    pub fn failing_on_page(total_keys: usize, page_size: usize, page: usize) -> Arc<Self> {
        Arc::new(Self {
            total_keys,
            page_size,
            fail_on_page: Some(page),
            pages_fetched: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Key for the i-th hour after 2024-01-01 00:00:00 UTC.
    pub fn key(i: usize) -> String {
        let day = i / 24 + 1;
        let hour = i % 24;
        format!("dev1/2024/01/{day:02}/Fuze-2024-01-{day:02}-{hour:02}-00-00.zip")
    }
}

#[async_trait]
impl ObjectStore for InstrumentedBackend {
    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        Err(StorageError::NotFound(key.to_string()))
    }

    async fn put(&self, _key: &str, _data: Bytes) -> StorageResult<()> {
        Err(StorageError::InvalidKey(
            "instrumented backend is read-only".to_string(),
        ))
    }

    async fn put_stream(&self, _key: &str) -> StorageResult<Box<dyn StreamingUpload>> {
        Err(StorageError::InvalidKey(
            "instrumented backend is read-only".to_string(),
        ))
    }

    fn backend_name(&self) -> &'static str {
        "instrumented"
    }

    fn locator(&self, key: &str) -> String {
        format!("mem://{key}")
    }

    fn list_pages<'a>(&'a self, prefix: &str, options: ListingOptions) -> PageStream<'a> {
        let prefix = prefix.to_string();
        let counter = self.pages_fetched.clone();

        Box::pin(async_stream::try_stream! {
            let keys: Vec<String> = (0..self.total_keys)
                .map(Self::key)
                .filter(|key| key.starts_with(&prefix) && options.admits(key))
                .collect();

            for (page_index, chunk) in keys.chunks(self.page_size).enumerate() {
                counter.fetch_add(1, Ordering::SeqCst);
                if self.fail_on_page == Some(page_index) {
                    Err::<(), _>(StorageError::Io(std::io::Error::other("listing interrupted")))?;
                }
                yield ListingPage { keys: chunk.to_vec() };
            }
        })
    }
}
