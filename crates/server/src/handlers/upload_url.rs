//! Presigned upload URLs: `GET /v1/log_upload_url`.
//!
//! Clients that upload large logs straight to the bucket first ask for a
//! signed `PUT` URL. The object key depends on how the caller authenticated:
//!
//! - a session token or a registered device id: `<device>/<yyyy>/<mm>/<dd>/<file>`
//! - a download token younger than a day: `download/<token>/<yyyy>/<mm>/<dd>/<file>`
//! - nothing: `unauthenticated/<client>/<yyyy>/<mm>/<dd>/<file>`

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime, UtcOffset};

/// Header that may carry the session token instead of `Authorization`.
pub const SESSION_TOKEN_HEADER: &str = "fz-token";

/// Client whose file names are normalized to [`WININSTALLER_SUFFIX`].
pub const WININSTALLER_CLIENT: &str = "wininstaller";

pub const WININSTALLER_SUFFIX: &str = ".wininstaller.zip";

/// Device id meaning "the session token names the device".
const BROWSER_DEVICE: &str = "ngbrowser";

/// How long a download token authorizes uploads after it was created.
pub const DOWNLOAD_TOKEN_TTL: Duration = Duration::hours(24);

/// Query parameters of an upload URL request. Absent values are empty.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UploadUrlParams {
    pub token: String,
    pub file_name: String,
    pub content_type: String,
    pub device_id: String,
    pub year: String,
    pub month: String,
    pub day: String,
    pub client: String,
    pub download_token: String,
    pub meeting_instance: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadUrlResponse {
    pub signed_request: String,
    pub message: String,
    pub code: u16,
    /// Echo of the requested content type.
    pub content_type: String,
}

/// Where an upload lands, decided by how the caller authenticated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyPattern {
    Device,
    Download,
    Unauthenticated,
}

impl KeyPattern {
    pub fn key(self, params: &UploadUrlParams) -> String {
        let dated = format!(
            "{}/{}/{}/{}",
            params.year, params.month, params.day, params.file_name
        );
        match self {
            Self::Device => format!("{}/{dated}", params.device_id),
            Self::Download => format!("download/{}/{dated}", params.download_token),
            Self::Unauthenticated => format!("unauthenticated/{}/{dated}", params.client),
        }
    }
}

/// Session tokens are opaque; only their length is checked.
fn is_session_token(token: &str) -> bool {
    (42..100).contains(&token.len())
}

/// True when `token` looks like a session token and the request presents it
/// as a bearer credential or in the `fz-token` header.
pub fn session_token_presented(token: &str, headers: &HeaderMap) -> bool {
    if !is_session_token(token) {
        return false;
    }
    if let Some(auth) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok())
        && auth.len() > 6
        && auth
            .get(..6)
            .is_some_and(|scheme| scheme.eq_ignore_ascii_case("bearer"))
    {
        return auth.get(7..) == Some(token);
    }
    headers
        .get(SESSION_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|presented| presented == token)
}

/// `true` when a download token created at `created_at` is still usable at `now`.
pub fn download_token_live(created_at: Option<OffsetDateTime>, now: OffsetDateTime) -> bool {
    created_at.is_some_and(|created| created + DOWNLOAD_TOKEN_TTL > now)
}

/// Installer uploads always end in `.wininstaller.zip`.
pub fn wininstaller_file_name(file_name: &str) -> String {
    if file_name.ends_with(WININSTALLER_SUFFIX) {
        return file_name.to_string();
    }
    let base = file_name.strip_suffix(".zip").unwrap_or(file_name);
    format!("{base}{WININSTALLER_SUFFIX}")
}

async fn authorize(
    state: &AppState,
    params: &UploadUrlParams,
    headers: &HeaderMap,
) -> ApiResult<KeyPattern> {
    let (pattern, allowed) = if !params.token.is_empty() {
        (
            KeyPattern::Device,
            session_token_presented(&params.token, headers),
        )
    } else if !params.device_id.is_empty() {
        let known = state.metadata.device_exists(&params.device_id).await?;
        if !known {
            tracing::warn!(device = %params.device_id, "no match for device id");
        }
        (KeyPattern::Device, known)
    } else if !params.download_token.is_empty() {
        let created_at = state
            .metadata
            .download_token_created_at(&params.download_token)
            .await?;
        (
            KeyPattern::Download,
            download_token_live(created_at, OffsetDateTime::now_utc()),
        )
    } else {
        (KeyPattern::Unauthenticated, true)
    };

    if allowed {
        Ok(pattern)
    } else {
        Err(ApiError::Forbidden("not authorized to upload".to_string()))
    }
}

/// Replace the date directories with the meeting instance's start day.
///
/// Unparsable ids and instances without a start time leave the date alone.
async fn apply_meeting_date(state: &AppState, params: &mut UploadUrlParams) -> ApiResult<()> {
    let Ok(id) = params.meeting_instance.parse::<i64>() else {
        tracing::warn!(meeting_instance = %params.meeting_instance, "invalid meeting instance");
        return Ok(());
    };
    let Some(started_at) = state.metadata.meeting_instance_started_at(id).await? else {
        tracing::warn!(meeting_instance = id, "meeting instance has no start time");
        return Ok(());
    };

    let started_at = started_at.to_offset(UtcOffset::UTC);
    params.year = format!("{:04}", started_at.year());
    params.month = format!("{:02}", u8::from(started_at.month()));
    params.day = format!("{:02}", started_at.day());
    Ok(())
}

/// GET /v1/log_upload_url - sign a `PUT` URL for a client-side upload.
pub async fn get_log_upload_url(
    State(state): State<AppState>,
    Query(mut params): Query<UploadUrlParams>,
    headers: HeaderMap,
) -> ApiResult<Json<UploadUrlResponse>> {
    if params.file_name.is_empty() {
        return Err(ApiError::BadRequest("missing file_name".to_string()));
    }
    let pattern = authorize(&state, &params, &headers).await?;

    if params.client == WININSTALLER_CLIENT {
        params.file_name = wininstaller_file_name(&params.file_name);
    }
    if !params.meeting_instance.is_empty()
        && (!params.token.is_empty() || !params.device_id.is_empty())
    {
        apply_meeting_date(&state, &mut params).await?;
    }
    if !params.token.is_empty() && params.device_id == BROWSER_DEVICE {
        params.device_id = params.token.clone();
    }

    let key = pattern.key(&params);
    let signed_request = state
        .storage
        .presign_put(&key, state.config.server.upload_url_expiry())
        .await?;
    tracing::info!(key = %key, pattern = ?pattern, "upload url issued");

    Ok(Json(UploadUrlResponse {
        signed_request,
        message: String::new(),
        code: 200,
        content_type: params.content_type,
    }))
}
