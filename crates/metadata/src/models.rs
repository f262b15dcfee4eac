//! Database models mapping to the metadata schema.

use sqlx::FromRow;
use time::OffsetDateTime;

/// Meeting instance record as stored.
#[derive(Debug, Clone, FromRow)]
pub struct MeetingInstanceRow {
    pub id: i64,
    pub meeting_id: i64,
    /// Lifecycle state; only `Ended` instances bound a log window.
    pub state: String,
    pub started_at: Option<OffsetDateTime>,
    pub ended_at: Option<OffsetDateTime>,
}

/// Start and end of a meeting instance that has ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndedMeetingInstance {
    pub started_at: OffsetDateTime,
    pub ended_at: OffsetDateTime,
}

pub const MEETING_STATE_ENDED: &str = "Ended";
