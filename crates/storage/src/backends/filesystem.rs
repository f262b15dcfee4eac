//! Local filesystem storage backend.
//!
//! Keys map to paths below the root with `/` as separator. Listings walk the
//! tree depth-first with siblings sorted so that keys come out in the same
//! lexicographic order an S3 listing would produce.

use crate::error::{StorageError, StorageResult};
use crate::traits::{ListingOptions, ListingPage, ObjectStore, PageStream, StreamingUpload};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

/// Marker inside names of in-flight temp files; such files are never listed.
const TEMP_MARKER: &str = ".tmp.";

/// Local filesystem object store.
#[derive(Debug)]
pub struct FilesystemBackend {
    root: PathBuf,
}

/// One directory entry during a listing walk.
struct WalkEntry {
    /// Key relative to the root; directories carry a trailing `/`.
    key: String,
    path: PathBuf,
    is_dir: bool,
}

impl FilesystemBackend {
    /// Create a new filesystem backend, creating the root if needed.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Resolve a key to a path, refusing anything that escapes the root.
    async fn key_path(&self, key: &str) -> StorageResult<PathBuf> {
        let root = self.root.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || resolve_key(&root, &key))
            .await
            .map_err(|e| {
                StorageError::Io(std::io::Error::other(format!("spawn_blocking failed: {e}")))
            })?
    }

    async fn ensure_parent(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

fn not_found_or_io(key: &str, err: std::io::Error) -> StorageError {
    if err.kind() == std::io::ErrorKind::NotFound {
        StorageError::NotFound(key.to_string())
    } else {
        StorageError::Io(err)
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let suffix = format!("{TEMP_MARKER}{}", Uuid::new_v4());
    let name = path
        .file_name()
        .map(|n| format!("{}{suffix}", n.to_string_lossy()))
        .unwrap_or(suffix);
    path.with_file_name(name)
}

/// Lexical and symlink-aware validation of a key below `root`.
fn resolve_key(root: &Path, key: &str) -> StorageResult<PathBuf> {
    if key.is_empty() || key.starts_with('/') || key.starts_with('\\') {
        return Err(StorageError::InvalidKey(format!(
            "key must be a relative path: {key:?}"
        )));
    }
    if Path::new(key)
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return Err(StorageError::InvalidKey(format!(
            "path traversal not allowed: {key}"
        )));
    }

    let root_canonical = root.canonicalize().map_err(|e| {
        StorageError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to canonicalize root: {e}"),
        ))
    })?;
    let path = root.join(key);

    // The nearest existing ancestor (or the path itself) must resolve inside the
    // root, otherwise a symlink would let reads or writes land outside it.
    let mut ancestor = Some(path.as_path());
    while let Some(candidate) = ancestor {
        match std::fs::symlink_metadata(candidate) {
            Ok(meta) => {
                let canonical = candidate.canonicalize().map_err(|e| {
                    if meta.file_type().is_symlink() {
                        StorageError::InvalidKey(format!("dangling symlink in key: {key}"))
                    } else {
                        StorageError::Io(e)
                    }
                })?;
                if !canonical.starts_with(&root_canonical) {
                    return Err(StorageError::InvalidKey(format!(
                        "resolved path escapes storage root: {key}"
                    )));
                }
                return Ok(path);
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                ancestor = candidate.parent();
            }
            Err(err) => return Err(StorageError::Io(err)),
        }
    }

    Ok(path)
}

/// Read one directory, returning its entries sorted in key order.
///
/// Directory keys end in `/`, which places `a/...` after `a-...` exactly as a
/// flat key listing would. Symlinks and temp files are skipped.
async fn read_sorted(dir: &Path, rel: &str) -> StorageResult<Vec<WalkEntry>> {
    let mut entries = Vec::new();
    let mut reader = match fs::read_dir(dir).await {
        Ok(reader) => reader,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
        Err(e) => return Err(StorageError::Io(e)),
    };

    while let Some(entry) = reader.next_entry().await? {
        let Ok(name) = entry.file_name().into_string() else {
            tracing::warn!(path = ?entry.path(), "skipping non UTF-8 file name");
            continue;
        };
        let file_type = entry.file_type().await?;
        if file_type.is_dir() {
            entries.push(WalkEntry {
                key: format!("{rel}{name}/"),
                path: entry.path(),
                is_dir: true,
            });
        } else if file_type.is_file() && !name.contains(TEMP_MARKER) {
            entries.push(WalkEntry {
                key: format!("{rel}{name}"),
                path: entry.path(),
                is_dir: false,
            });
        }
    }

    entries.sort_unstable_by(|a, b| a.key.cmp(&b.key));
    Ok(entries)
}

/// Whether a directory whose keys all start with `dir_key` can hold a listed key.
fn directory_relevant(dir_key: &str, prefix: &str, start_after: Option<&str>) -> bool {
    let overlaps_prefix = dir_key.starts_with(prefix) || prefix.starts_with(dir_key);
    // Every key under dir_key sorts before start_after when dir_key does and is
    // not itself a prefix of it.
    let before_offset = start_after.is_some_and(|after| dir_key < after && !after.starts_with(dir_key));
    overlaps_prefix && !before_offset
}

#[async_trait]
impl ObjectStore for FilesystemBackend {
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let path = self.key_path(key).await?;
        let data = fs::read(&path)
            .await
            .map_err(|e| not_found_or_io(key, e))?;
        Ok(Bytes::from(data))
    }

    #[instrument(skip(self, data), fields(backend = "filesystem", size = data.len()))]
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        let path = self.key_path(key).await?;
        self.ensure_parent(&path).await?;

        let temp_path = temp_path_for(&path);
        {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(&data).await?;
            file.sync_all().await?;
        }
        fs::rename(&temp_path, &path).await?;

        Ok(())
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn put_stream(&self, key: &str) -> StorageResult<Box<dyn StreamingUpload>> {
        let path = self.key_path(key).await?;
        self.ensure_parent(&path).await?;

        let temp_path = temp_path_for(&path);
        let file = fs::File::create(&temp_path).await?;

        Ok(Box::new(FilesystemUpload {
            file,
            temp_path,
            final_path: path,
            bytes_written: 0,
        }))
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    fn locator(&self, key: &str) -> String {
        format!("file://{}", self.root.join(key).display())
    }

    fn list_pages<'a>(&'a self, prefix: &str, options: ListingOptions) -> PageStream<'a> {
        let prefix = prefix.to_string();
        let page_size = options.normalized_page_size();

        let stream = async_stream::try_stream! {
            // Walk from the deepest directory named by the prefix.
            let base_rel = match prefix.rfind('/') {
                Some(idx) => prefix[..=idx].to_string(),
                None => String::new(),
            };
            let base_path = if base_rel.is_empty() {
                self.root.clone()
            } else {
                self.key_path(base_rel.trim_end_matches('/')).await?
            };

            let base_entries = read_sorted(&base_path, &base_rel).await?;
            let mut stack = vec![base_entries.into_iter()];
            let mut page = Vec::with_capacity(page_size);

            while let Some(level) = stack.last_mut() {
                let Some(entry) = level.next() else {
                    stack.pop();
                    continue;
                };

                if entry.is_dir {
                    if directory_relevant(&entry.key, &prefix, options.start_after.as_deref()) {
                        stack.push(read_sorted(&entry.path, &entry.key).await?.into_iter());
                    }
                    continue;
                }

                if entry.key.starts_with(prefix.as_str()) && options.admits(&entry.key) {
                    page.push(entry.key);
                    if page.len() >= page_size {
                        yield ListingPage {
                            keys: std::mem::replace(&mut page, Vec::with_capacity(page_size)),
                        };
                    }
                }
            }

            if !page.is_empty() {
                yield ListingPage { keys: page };
            }
        };

        Box::pin(stream)
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn health_check(&self) -> StorageResult<()> {
        let metadata = fs::metadata(&self.root).await.map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("storage root not accessible: {e}"),
            ))
        })?;

        if !metadata.is_dir() {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::NotADirectory,
                format!("storage root is not a directory: {:?}", self.root),
            )));
        }

        Ok(())
    }
}

/// Streaming upload for filesystem backend.
struct FilesystemUpload {
    file: fs::File,
    temp_path: PathBuf,
    final_path: PathBuf,
    bytes_written: u64,
}

#[async_trait]
impl StreamingUpload for FilesystemUpload {
    async fn write(&mut self, data: Bytes) -> StorageResult<()> {
        self.file.write_all(&data).await?;
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> StorageResult<u64> {
        self.file.sync_all().await?;
        drop(self.file);
        fs::rename(&self.temp_path, &self.final_path).await?;
        Ok(self.bytes_written)
    }

    async fn abort(self: Box<Self>) -> StorageResult<()> {
        drop(self.file);
        let _ = fs::remove_file(&self.temp_path).await;
        Ok(())
    }
}
