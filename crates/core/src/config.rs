//! Configuration types shared across crates.

use crate::archive_key::DEFAULT_ARCHIVE_NAME;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Longest retrieval window accepted, in whole hours.
    #[serde(default = "default_max_range_hours")]
    pub max_range_hours: u64,
    /// Key prefix under which uploaded logs are stored.
    #[serde(default = "default_upload_prefix")]
    pub upload_prefix: String,
    /// Lifetime of presigned upload URLs, in seconds.
    #[serde(default = "default_upload_url_expiry_secs")]
    pub upload_url_expiry_secs: u64,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    /// SECURITY: When enabled, ensure this endpoint is network-restricted
    /// to authorized Prometheus scraper IPs only at the infrastructure level.
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_max_range_hours() -> u64 {
    14
}

fn default_upload_prefix() -> String {
    "inbound".to_string()
}

fn default_upload_url_expiry_secs() -> u64 {
    900
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_range_hours: default_max_range_hours(),
            upload_prefix: default_upload_prefix(),
            upload_url_expiry_secs: default_upload_url_expiry_secs(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

/// Longest lifetime S3 accepts for a presigned URL (seven days).
const MAX_UPLOAD_URL_EXPIRY_SECS: u64 = 7 * 24 * 3600;

impl ServerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_range_hours == 0 {
            return Err("server.max_range_hours must be at least 1".to_string());
        }
        if !(1..=MAX_UPLOAD_URL_EXPIRY_SECS).contains(&self.upload_url_expiry_secs) {
            return Err(format!(
                "server.upload_url_expiry_secs must be between 1 and {MAX_UPLOAD_URL_EXPIRY_SECS}"
            ));
        }
        let prefix = self.upload_prefix.trim_matches('/');
        if prefix.is_empty() || prefix.split('/').any(|c| c == ".." || c == ".") {
            return Err(format!(
                "server.upload_prefix {:?} is not a valid key prefix",
                self.upload_prefix
            ));
        }
        Ok(())
    }

    /// Lifetime of presigned upload URLs.
    pub fn upload_url_expiry(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.upload_url_expiry_secs)
    }
}

/// Storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Filesystem {
        /// Root directory for storage.
        path: PathBuf,
    },
    /// S3-compatible storage.
    S3 {
        /// Bucket name.
        bucket: String,
        /// Optional endpoint URL (for MinIO, etc.).
        endpoint: Option<String>,
        /// AWS region.
        region: Option<String>,
        /// Optional key prefix applied below the bucket root.
        prefix: Option<String>,
        /// AWS access key ID. Falls back to the ambient credential chain if not set.
        /// WARNING: Prefer env vars or IAM roles over storing secrets in config files.
        access_key_id: Option<String>,
        /// AWS secret access key. Falls back to the ambient credential chain if not set.
        /// WARNING: Prefer env vars or IAM roles over storing secrets in config files.
        secret_access_key: Option<String>,
        /// Force path-style URLs (e.g., `endpoint/bucket/key` instead of `bucket.endpoint/key`).
        /// Required for MinIO and some S3-compatible services.
        #[serde(default)]
        force_path_style: bool,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/storage"),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::S3 {
                bucket,
                access_key_id,
                secret_access_key,
                ..
            } => {
                if bucket.trim().is_empty() {
                    return Err("s3 config requires a bucket name".to_string());
                }
                match (access_key_id.as_ref(), secret_access_key.as_ref()) {
                    (Some(_), Some(_)) | (None, None) => Ok(()),
                    _ => Err(
                        "s3 config requires both access_key_id and secret_access_key when either is set"
                            .to_string(),
                    ),
                }
            }
            _ => Ok(()),
        }
    }
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database.
    Sqlite {
        /// Database file path.
        path: PathBuf,
    },
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/metadata.db"),
        }
    }
}

/// Archive retrieval tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Base name of archive files (`<name>-YYYY-MM-DD-HH-MM-SS.zip`).
    #[serde(default = "default_archive_name")]
    pub archive_name: String,
    /// How far before the window start the listing begins, in seconds.
    /// Must cover the longest gap between consecutive archives.
    #[serde(default = "default_lookback_secs")]
    pub lookback_secs: u64,
    /// Attempts per archive download before giving up.
    #[serde(default = "default_max_fetch_attempts")]
    pub max_fetch_attempts: u32,
    /// Fixed delay between download attempts, in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Keys requested per listing page.
    #[serde(default = "default_list_page_size")]
    pub list_page_size: usize,
}

fn default_archive_name() -> String {
    DEFAULT_ARCHIVE_NAME.to_string()
}

fn default_lookback_secs() -> u64 {
    3 * 60 * 60
}

fn default_max_fetch_attempts() -> u32 {
    20
}

fn default_retry_delay_ms() -> u64 {
    100
}

fn default_list_page_size() -> usize {
    1000
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            archive_name: default_archive_name(),
            lookback_secs: default_lookback_secs(),
            max_fetch_attempts: default_max_fetch_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            list_page_size: default_list_page_size(),
        }
    }
}

impl RetrievalConfig {
    /// Listing lookback as a Duration.
    pub fn lookback(&self) -> Duration {
        // Saturate at i64::MAX to prevent overflow wrapping to negative
        let secs = i64::try_from(self.lookback_secs).unwrap_or(i64::MAX);
        Duration::seconds(secs)
    }

    /// Delay between download attempts.
    pub fn retry_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.retry_delay_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_fetch_attempts == 0 {
            return Err("retrieval.max_fetch_attempts must be at least 1".to_string());
        }
        if self.list_page_size == 0 {
            return Err("retrieval.list_page_size must be greater than 0".to_string());
        }
        let name = &self.archive_name;
        if name.is_empty() || name.contains('/') {
            return Err(format!(
                "retrieval.archive_name {name:?} must be non-empty and contain no '/'"
            ));
        }
        Ok(())
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Storage backend configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Metadata store configuration.
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// Archive retrieval configuration.
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

impl AppConfig {
    /// Validate every section, returning the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        self.server.validate()?;
        self.storage.validate()?;
        self.retrieval.validate()
    }
}
