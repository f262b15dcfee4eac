//! Log uploads: `POST /v1/logs` and `POST /v2/logs`.
//!
//! Bodies arrive either raw (`application/json`, `text/plain`) or as a
//! `multipart/form-data` form whose `request` file field carries the log.

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;
use axum::Json;
use axum::extract::{FromRequest, Multipart, Query, Request, State};
use axum::http::HeaderMap;
use axum::http::header::{CONTENT_ENCODING, CONTENT_TYPE};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use logvault_core::StoredLogHeader;
use logvault_storage::StreamingUpload;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::pin::pin;

/// Header carrying the device token on `POST /v1/logs`.
pub const DEVICE_TOKEN_HEADER: &str = "FZ-Devicetoken";

/// Form file field holding the log in a multipart upload.
pub const FORM_FILE_FIELD: &str = "request";

/// Form value naming the device in a multipart `/v2` upload.
pub const FORM_TOKEN_FIELD: &str = "token";

/// Body content types stored as-is.
const ACCEPTED_CONTENT_TYPES: [&str; 2] = ["application/json", "text/plain"];

/// Query parameters of an upload.
#[derive(Debug, Default, Deserialize)]
pub struct UploadParams {
    /// Device token (`/v2` only).
    pub token: Option<String>,
    /// Client time zone, recorded in the envelope.
    pub tz: Option<String>,
}

/// Response to a stored upload.
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    /// Locator of the stored object.
    pub url: String,
    pub code: u16,
}

/// POST /v1/logs - upload authenticated by a registered device token header.
pub async fn post_logs_v1(
    State(state): State<AppState>,
    Query(params): Query<UploadParams>,
    request: Request,
) -> ApiResult<Json<UploadResponse>> {
    let token = request
        .headers()
        .get(DEVICE_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::Forbidden("missing device token".to_string()))?
        .to_string();

    if !state.metadata.device_exists(&token).await? {
        tracing::warn!(device = %token, "no match for device token");
        return Err(ApiError::Forbidden("unknown device".to_string()));
    }

    receive_upload(&state, Some(token), params.tz, request).await
}

/// POST /v2/logs - upload naming its device in the `token` query parameter,
/// or in a `token` form value sent ahead of the file.
pub async fn post_logs_v2(
    State(state): State<AppState>,
    Query(params): Query<UploadParams>,
    request: Request,
) -> ApiResult<Json<UploadResponse>> {
    let token = params.token.filter(|t| !t.is_empty());
    receive_upload(&state, token, params.tz, request).await
}

/// Fresh object key below `prefix`: 8 random bytes, hex encoded.
pub fn upload_key(prefix: &str) -> String {
    let mut id = [0u8; 8];
    rand::rng().fill_bytes(&mut id);
    format!("{}/{}", prefix.trim_matches('/'), hex::encode(id))
}

fn is_form(content_type: &str) -> bool {
    content_type.starts_with("multipart/")
}

fn check_content_type(content_type: &str) -> ApiResult<()> {
    if ACCEPTED_CONTENT_TYPES
        .iter()
        .any(|accepted| content_type.starts_with(accepted))
    {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!(
            "unsupported content type {content_type:?}"
        )))
    }
}

fn missing_token() -> ApiError {
    ApiError::BadRequest("missing token".to_string())
}

fn form_error(e: impl std::fmt::Display) -> ApiError {
    ApiError::BadRequest(format!("invalid form: {e}"))
}

/// Store the log carried by `request`, raw or inside a form.
async fn receive_upload(
    state: &AppState,
    mut token: Option<String>,
    tz: Option<String>,
    request: Request,
) -> ApiResult<Json<UploadResponse>> {
    let headers = request.headers().clone();
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if !is_form(content_type) {
        check_content_type(content_type)?;
        let token = token.ok_or_else(missing_token)?;
        let body = request.into_body().into_data_stream().map(|chunk| {
            chunk.map_err(|e| ApiError::BadRequest(format!("failed to read body: {e}")))
        });
        return store_upload(state, token, tz, &headers, body).await;
    }

    let mut form = Multipart::from_request(request, state)
        .await
        .map_err(form_error)?;
    while let Some(field) = form.next_field().await.map_err(form_error)? {
        let name = field.name().unwrap_or_default().to_string();
        if name == FORM_FILE_FIELD {
            let token = token.ok_or_else(missing_token)?;
            let body = field.map(|chunk| chunk.map_err(form_error));
            return store_upload(state, token, tz, &headers, body).await;
        }
        if name == FORM_TOKEN_FIELD && token.is_none() {
            token = Some(field.text().await.map_err(form_error)?).filter(|t| !t.is_empty());
        }
    }

    Err(ApiError::BadRequest(format!(
        "missing form file {FORM_FILE_FIELD:?}"
    )))
}

async fn store_upload(
    state: &AppState,
    token: String,
    tz: Option<String>,
    headers: &HeaderMap,
    body: impl Stream<Item = ApiResult<Bytes>>,
) -> ApiResult<Json<UploadResponse>> {
    let header = StoredLogHeader {
        token,
        tz: tz.unwrap_or_default(),
        encoding: headers
            .get(CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string(),
    };
    let preamble = header.preamble()?;

    let key = upload_key(&state.config.server.upload_prefix);
    let mut upload = state.storage.put_stream(&key).await?;

    let written = match copy_body(upload.as_mut(), preamble, body).await {
        Ok(written) => written,
        Err(e) => {
            if let Err(abort_err) = upload.abort().await {
                tracing::warn!(key = %key, error = %abort_err, "failed to abort upload");
            }
            return Err(e);
        }
    };
    let total = upload.finish().await?;

    metrics::UPLOADS.inc();
    metrics::UPLOAD_BYTES.inc_by(total);
    tracing::info!(key = %key, device = %header.token, bytes = written, "log stored");

    Ok(Json(UploadResponse {
        url: state.storage.locator(&key),
        code: 200,
    }))
}

async fn copy_body(
    upload: &mut dyn StreamingUpload,
    preamble: Bytes,
    body: impl Stream<Item = ApiResult<Bytes>>,
) -> ApiResult<u64> {
    let mut written = preamble.len() as u64;
    upload.write(preamble).await?;

    let mut body = pin!(body);
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        written += chunk.len() as u64;
        upload.write(chunk).await?;
    }
    Ok(written)
}
