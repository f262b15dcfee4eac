//! Meeting instance repository.

use crate::error::MetadataResult;
use crate::models::{EndedMeetingInstance, MeetingInstanceRow};
use async_trait::async_trait;
use time::OffsetDateTime;

/// Repository for meeting instance operations.
#[async_trait]
pub trait MeetingRepo: Send + Sync {
    /// Create a meeting instance.
    async fn create_meeting_instance(&self, instance: &MeetingInstanceRow) -> MetadataResult<()>;

    /// Get the time range of an ended meeting instance.
    ///
    /// Returns `None` when the instance does not exist or has not ended. An ended
    /// instance without both timestamps is an `Internal` error.
    async fn get_ended_meeting_instance(
        &self,
        id: i64,
    ) -> MetadataResult<Option<EndedMeetingInstance>>;

    /// Start time of a meeting instance in any state.
    ///
    /// `None` when the instance does not exist or has not started.
    async fn meeting_instance_started_at(&self, id: i64)
    -> MetadataResult<Option<OffsetDateTime>>;
}
