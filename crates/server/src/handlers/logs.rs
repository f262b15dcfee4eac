//! Window retrieval: `GET /v1/logs` and `GET /v2/logs`.

use crate::body::{self, FrameSender};
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::http::header::{CONTENT_TYPE, TRAILER};
use axum::response::{IntoResponse, Response};
use logvault_core::{ArchiveKey, WindowRequest};
use logvault_retrieval::{RetrievalError, WindowAssembler};
use serde::Deserialize;
use std::time::Instant;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Raw query parameters; values are validated by [`LogsQuery::parse`].
#[derive(Debug, Default, Deserialize)]
pub struct LogsParams {
    pub token: Option<String>,
    pub begin_time: Option<String>,
    pub end_time: Option<String>,
    pub meeting_id: Option<String>,
    pub instance_id: Option<String>,
}

/// Validated retrieval query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogsQuery {
    pub token: String,
    pub begin_time: Option<OffsetDateTime>,
    pub end_time: Option<OffsetDateTime>,
    pub meeting_id: i64,
    pub instance_id: i64,
}

fn parse_time(name: &str, value: Option<&str>) -> ApiResult<Option<OffsetDateTime>> {
    match value.filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => OffsetDateTime::parse(v, &Rfc3339)
            .map(Some)
            .map_err(|e| ApiError::BadRequest(format!("malformed {name} {v:?}: {e}"))),
    }
}

fn parse_id(name: &str, value: Option<&str>) -> ApiResult<i64> {
    match value.filter(|v| !v.is_empty()) {
        None => Ok(0),
        Some(v) => v
            .parse()
            .map_err(|_| ApiError::BadRequest(format!("malformed {name} {v:?}"))),
    }
}

impl LogsQuery {
    /// Validate raw parameters. Malformed values and a missing token are rejected.
    pub fn parse(params: &LogsParams) -> ApiResult<Self> {
        let meeting_id = parse_id("meeting_id", params.meeting_id.as_deref())?;
        let instance_id = parse_id("instance_id", params.instance_id.as_deref())?;
        let begin_time = parse_time("begin_time", params.begin_time.as_deref())?;
        let end_time = parse_time("end_time", params.end_time.as_deref())?;

        let token = params
            .token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::BadRequest("missing token".to_string()))?;

        Ok(Self {
            token: token.to_string(),
            begin_time,
            end_time,
            meeting_id,
            instance_id,
        })
    }

    /// Whether the window comes from a meeting instance instead of explicit times.
    pub fn uses_meeting(&self) -> bool {
        self.meeting_id != 0 || self.instance_id != 0
    }
}

/// Turn a query into a window, consulting metadata for meeting-bound queries.
async fn resolve_window(state: &AppState, query: LogsQuery) -> ApiResult<WindowRequest> {
    let (begin, end) = if query.uses_meeting() {
        let instance = state
            .metadata
            .get_ended_meeting_instance(query.instance_id)
            .await?
            .ok_or_else(|| {
                ApiError::BadRequest(format!(
                    "no ended meeting instance {}",
                    query.instance_id
                ))
            })?;
        (Some(instance.started_at), Some(instance.ended_at))
    } else {
        (query.begin_time, query.end_time)
    };

    let end = end.ok_or_else(|| ApiError::BadRequest("missing end_time".to_string()))?;
    let begin = begin.ok_or_else(|| ApiError::BadRequest("missing begin_time".to_string()))?;

    let window = WindowRequest::new(query.token, begin, end)?;
    window.ensure_span_within(state.config.server.max_range_hours)?;
    Ok(window)
}

/// GET /v1/logs, GET /v2/logs - stream the decoded archives of a window.
///
/// Everything that can be rejected is rejected before the status line is sent.
/// Failures after that cut the body short and set the `X-Streaming-Error`
/// trailer to `true`.
pub async fn get_logs(
    State(state): State<AppState>,
    Query(params): Query<LogsParams>,
) -> ApiResult<Response> {
    let started = Instant::now();
    let query = LogsQuery::parse(&params)?;
    let window = resolve_window(&state, query).await?;

    let keys = state.assembler().resolve(&window).await.inspect_err(|e| {
        metrics::record_retrieval(e.kind());
    })?;
    tracing::info!(
        prefix = %window.prefix(),
        begin = %window.begin(),
        end = %window.end(),
        archives = keys.len(),
        "streaming window"
    );

    let (sender, body) = body::channel();
    let assembler = state.assembler().clone();
    tokio::spawn(stream_window(assembler, keys, sender, started));

    Ok((
        StatusCode::OK,
        [
            (CONTENT_TYPE, "application/octet-stream"),
            (TRAILER, "X-Streaming-Error"),
        ],
        body,
    )
        .into_response())
}

/// Producer task behind a retrieval response.
async fn stream_window(
    assembler: WindowAssembler,
    keys: Vec<ArchiveKey>,
    sender: FrameSender,
    started: Instant,
) {
    let mut writer = sender.writer();
    let result = tokio::select! {
        result = assembler.stream(&keys, &mut writer) => result,
        _ = sender.closed() => Err(RetrievalError::Cancelled),
    };

    metrics::BYTES_STREAMED.inc_by(writer.written());
    drop(writer);

    let failed = match result {
        Ok(report) => {
            metrics::ARCHIVES_STREAMED.inc_by(report.archives as u64);
            metrics::FETCH_RETRIES.inc_by(u64::from(report.retries));
            metrics::record_retrieval("success");
            tracing::info!(
                archives = report.archives,
                bytes = report.bytes_written,
                retries = report.retries,
                "retrieval complete"
            );
            false
        }
        Err(RetrievalError::Cancelled) => {
            metrics::record_retrieval("cancelled");
            tracing::info!("client disconnected, retrieval abandoned");
            true
        }
        Err(e) => {
            metrics::record_retrieval(e.kind());
            tracing::error!(error = %e, "trouble streaming result");
            true
        }
    };

    metrics::RETRIEVAL_DURATION.observe(started.elapsed().as_secs_f64());
    sender.finish(failed).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> LogsParams {
        let mut params = LogsParams::default();
        for (name, value) in pairs {
            let value = Some(value.to_string());
            match *name {
                "token" => params.token = value,
                "begin_time" => params.begin_time = value,
                "end_time" => params.end_time = value,
                "meeting_id" => params.meeting_id = value,
                "instance_id" => params.instance_id = value,
                other => panic!("unknown parameter {other}"),
            }
        }
        params
    }

    #[test]
    fn test_parse_full_query() {
        let query = LogsQuery::parse(&params(&[
            ("token", "dev1"),
            ("begin_time", "2024-03-05T10:30:00Z"),
            ("end_time", "2024-03-05T12:30:00+01:00"),
        ]))
        .unwrap();

        assert_eq!(query.token, "dev1");
        assert_eq!(
            query.begin_time,
            Some(time::macros::datetime!(2024-03-05 10:30 UTC))
        );
        assert_eq!(
            query.end_time,
            Some(time::macros::datetime!(2024-03-05 11:30 UTC))
        );
        assert!(!query.uses_meeting());
    }

    #[test]
    fn test_missing_token_rejected() {
        let err = LogsQuery::parse(&params(&[("end_time", "2024-03-05T12:30:00Z")])).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(ref m) if m.contains("token")));

        let err = LogsQuery::parse(&params(&[("token", "")])).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn test_malformed_values_rejected() {
        for bad in [
            params(&[("token", "dev1"), ("begin_time", "yesterday")]),
            params(&[("token", "dev1"), ("end_time", "2024-03-05 12:30")]),
            params(&[("token", "dev1"), ("meeting_id", "12a")]),
            params(&[("token", "dev1"), ("instance_id", "-")]),
        ] {
            assert!(matches!(
                LogsQuery::parse(&bad),
                Err(ApiError::BadRequest(_))
            ));
        }
    }

    #[test]
    fn test_meeting_ids() {
        let query = LogsQuery::parse(&params(&[("token", "dev1"), ("instance_id", "42")])).unwrap();
        assert!(query.uses_meeting());
        assert_eq!(query.instance_id, 42);
        assert_eq!(query.meeting_id, 0);

        let query = LogsQuery::parse(&params(&[("token", "dev1"), ("meeting_id", "0")])).unwrap();
        assert!(!query.uses_meeting());
    }
}
