//! Metadata store trait and the SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::models::{EndedMeetingInstance, MEETING_STATE_ENDED, MeetingInstanceRow};
use crate::repos::{DeviceRepo, DownloadTokenRepo, MeetingRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use time::OffsetDateTime;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: MeetingRepo + DeviceRepo + DownloadTokenRepo + Send + Sync {
    /// Create the schema if it does not exist yet.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub async fn new(path: impl AsRef<Path>) -> MetadataResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        // One connection: SQLite serializes writers anyway and a pool of them
        // surfaces as "database is locked" under concurrent handlers.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        tracing::info!(path = %path.display(), "metadata store ready");

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl MeetingRepo for SqliteStore {
    async fn create_meeting_instance(&self, instance: &MeetingInstanceRow) -> MetadataResult<()> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM meeting_instances WHERE id = ?)")
                .bind(instance.id)
                .fetch_one(&self.pool)
                .await?;
        if exists {
            return Err(MetadataError::AlreadyExists(format!(
                "meeting instance {} already exists",
                instance.id
            )));
        }

        sqlx::query(
            "INSERT INTO meeting_instances (id, meeting_id, state, started_at, ended_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(instance.id)
        .bind(instance.meeting_id)
        .bind(&instance.state)
        .bind(instance.started_at)
        .bind(instance.ended_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_ended_meeting_instance(
        &self,
        id: i64,
    ) -> MetadataResult<Option<EndedMeetingInstance>> {
        let row = sqlx::query_as::<_, (Option<OffsetDateTime>, Option<OffsetDateTime>)>(
            "SELECT started_at, ended_at FROM meeting_instances WHERE id = ? AND state = ?",
        )
        .bind(id)
        .bind(MEETING_STATE_ENDED)
        .fetch_optional(&self.pool)
        .await?;

        let Some((started_at, ended_at)) = row else {
            return Ok(None);
        };
        let started_at = started_at
            .ok_or_else(|| MetadataError::Internal(format!("null started_at for {id}")))?;
        let ended_at =
            ended_at.ok_or_else(|| MetadataError::Internal(format!("null ended_at for {id}")))?;

        Ok(Some(EndedMeetingInstance {
            started_at,
            ended_at,
        }))
    }

    async fn meeting_instance_started_at(
        &self,
        id: i64,
    ) -> MetadataResult<Option<OffsetDateTime>> {
        let started_at: Option<Option<OffsetDateTime>> =
            sqlx::query_scalar("SELECT started_at FROM meeting_instances WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(started_at.flatten())
    }
}

#[async_trait]
impl DeviceRepo for SqliteStore {
    async fn register_device(
        &self,
        device_id: &str,
        registered_at: OffsetDateTime,
    ) -> MetadataResult<()> {
        if self.device_exists(device_id).await? {
            return Err(MetadataError::AlreadyExists(format!(
                "device {device_id} already registered"
            )));
        }

        sqlx::query("INSERT INTO devices (device_id, registered_at) VALUES (?, ?)")
            .bind(device_id)
            .bind(registered_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn device_exists(&self, device_id: &str) -> MetadataResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM devices WHERE device_id = ?)")
                .bind(device_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }
}

#[async_trait]
impl DownloadTokenRepo for SqliteStore {
    async fn create_download_token(
        &self,
        token: &str,
        created_at: Option<OffsetDateTime>,
    ) -> MetadataResult<()> {
        let result = sqlx::query("INSERT INTO download_tokens (token, created_at) VALUES (?, ?)")
            .bind(token)
            .bind(created_at)
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(
                MetadataError::AlreadyExists(format!("download token {token} already exists")),
            ),
            Err(e) => Err(e.into()),
        }
    }

    async fn download_token_created_at(
        &self,
        token: &str,
    ) -> MetadataResult<Option<OffsetDateTime>> {
        let created_at: Option<Option<OffsetDateTime>> =
            sqlx::query_scalar("SELECT created_at FROM download_tokens WHERE token = ?")
                .bind(token)
                .fetch_optional(&self.pool)
                .await?;
        Ok(created_at.flatten())
    }
}

/// SQL schema for SQLite.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS meeting_instances (
    id INTEGER PRIMARY KEY,
    meeting_id INTEGER NOT NULL,
    state TEXT NOT NULL,
    started_at TEXT,
    ended_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_meeting_instances_meeting ON meeting_instances(meeting_id);

CREATE TABLE IF NOT EXISTS devices (
    device_id TEXT PRIMARY KEY,
    registered_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS download_tokens (
    token TEXT PRIMARY KEY,
    created_at TEXT
);
"#;
