use async_trait::async_trait;
use bytes::Bytes;
use logvault_storage::error::{StorageError, StorageResult};
use logvault_retrieval::CancellationToken;
use logvault_storage::traits::{
    ListingOptions, ListingPage, ObjectStore, PageStream, StreamingUpload,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// In-memory store with scriptable failures, recording what was asked of it.
#[allow(dead_code)]
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, Bytes>>,
    /// Remaining failures before `get` of a key succeeds; `u32::MAX` never succeeds.
    get_failures: Mutex<HashMap<String, u32>>,
    fail_listing: bool,
    /// Listing never produces its first page.
    stall_listing: bool,
    /// Token fired when `get` of the paired key is first called.
    cancel_on_get: Mutex<Option<(String, CancellationToken)>>,
    page_size: usize,
    gets: Mutex<Vec<String>>,
    pub pages_listed: AtomicUsize,
}

#[allow(dead_code)]
impl MemoryStore {
    pub fn new() -> Self {
        Self {
            page_size: 2,
            ..Self::default()
        }
    }

    pub fn with_failing_listing() -> Self {
        Self {
            fail_listing: true,
            ..Self::new()
        }
    }

    pub fn with_stalled_listing() -> Self {
        Self {
            stall_listing: true,
            ..Self::new()
        }
    }

    /// Fire `cancel` as soon as `key` is requested.
    pub fn cancel_when_fetched(&self, key: impl Into<String>, cancel: CancellationToken) {
        *self.cancel_on_get.lock().unwrap() = Some((key.into(), cancel));
    }

    pub fn insert(&self, key: impl Into<String>, data: Bytes) {
        self.objects.lock().unwrap().insert(key.into(), data);
    }

    pub fn fail_gets(&self, key: impl Into<String>, times: u32) {
        self.get_failures.lock().unwrap().insert(key.into(), times);
    }

    /// Keys passed to `get`, one entry per call.
    pub fn gets(&self) -> Vec<String> {
        self.gets.lock().unwrap().clone()
    }

    pub fn distinct_gets(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for key in self.gets() {
            if !seen.contains(&key) {
                seen.push(key);
            }
        }
        seen
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        self.gets.lock().unwrap().push(key.to_string());
        if let Some((trigger, cancel)) = self.cancel_on_get.lock().unwrap().as_ref()
            && trigger == key
        {
            cancel.cancel();
        }

        {
            let mut failures = self.get_failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(key)
                && *remaining > 0
            {
                if *remaining != u32::MAX {
                    *remaining -= 1;
                }
                return Err(StorageError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "injected failure",
                )));
            }
        }

        self.objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        self.insert(key, data);
        Ok(())
    }

    async fn put_stream(&self, _key: &str) -> StorageResult<Box<dyn StreamingUpload>> {
        Err(StorageError::InvalidKey(
            "memory store does not support streaming uploads".to_string(),
        ))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn locator(&self, key: &str) -> String {
        format!("mem://{key}")
    }

    fn list_pages<'a>(&'a self, prefix: &str, options: ListingOptions) -> PageStream<'a> {
        let keys: Vec<String> = self
            .objects
            .lock()
            .unwrap()
            .keys()
            .filter(|key| key.starts_with(prefix) && options.admits(key))
            .cloned()
            .collect();

        Box::pin(async_stream::try_stream! {
            if self.stall_listing {
                futures::future::pending::<()>().await;
            }
            if self.fail_listing {
                Err::<(), _>(StorageError::Io(std::io::Error::other("listing unavailable")))?;
            }
            for chunk in keys.chunks(self.page_size) {
                self.pages_listed.fetch_add(1, Ordering::SeqCst);
                yield ListingPage { keys: chunk.to_vec() };
            }
        })
    }
}
