//! Download token repository.

use crate::error::MetadataResult;
use async_trait::async_trait;
use time::OffsetDateTime;

/// Repository for the short-lived tokens handed out with client downloads.
#[async_trait]
pub trait DownloadTokenRepo: Send + Sync {
    /// Record a download token. A duplicate token is an `AlreadyExists` error.
    async fn create_download_token(
        &self,
        token: &str,
        created_at: Option<OffsetDateTime>,
    ) -> MetadataResult<()>;

    /// When the token was issued; `None` if it is unknown or has no creation time.
    async fn download_token_created_at(&self, token: &str)
    -> MetadataResult<Option<OffsetDateTime>>;
}
