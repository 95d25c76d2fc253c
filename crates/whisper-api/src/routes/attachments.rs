//! Attachment presigning — upload tickets and granted downloads.
//!
//! POST /attachments/presign/upload   — presigned PUT for a new object key
//! POST /attachments/presign/download — presigned GET iff a grant exists
//!
//! Blob bytes never touch the relay. Clients encrypt with a random file
//! key before upload; the wrapped key rides in the message envelope.

use axum::{
    Json, Router,
    extract::{ConnectInfo, Extension, State},
    http::StatusCode,
    routing::post,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use uuid::Uuid;

use whisper_common::error::{RelayError, RelayResult};
use whisper_common::metrics::RelayMetrics;
use whisper_common::ratelimit::EndpointClass;
use whisper_db::repository::attachments;
use whisper_db::storage::StorageClient;

use crate::{AppState, middleware::AuthContext};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PresignUploadRequest {
    /// Declared encrypted blob size in bytes.
    size: i64,
    content_type: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PresignUploadResponse {
    object_key: String,
    upload_url: String,
    /// URL validity in seconds.
    expires_in: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PresignDownloadRequest {
    object_key: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PresignDownloadResponse {
    object_key: String,
    download_url: String,
    expires_in: u64,
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/attachments/presign/upload", post(presign_upload))
        .route("/attachments/presign/download", post(presign_download))
}

fn storage(state: &AppState) -> RelayResult<&StorageClient> {
    state.storage.as_ref().ok_or_else(|| {
        RelayError::Internal(anyhow::anyhow!("object storage is not configured"))
    })
}

fn rate_limit(state: &AppState, addr: SocketAddr, whisper_id: &str) -> RelayResult<()> {
    state
        .limiter
        .check(addr.ip(), Some(whisper_id), EndpointClass::Presign)
        .map_err(|retry_after_ms| {
            RelayMetrics::incr(&state.metrics.rate_limited);
            RelayError::RateLimited { retry_after_ms }
        })
}

async fn presign_upload(
    Extension(auth): Extension<AuthContext>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<PresignUploadRequest>,
) -> RelayResult<(StatusCode, Json<PresignUploadResponse>)> {
    rate_limit(&state, addr, &auth.whisper_id)?;

    if body.size <= 0 || body.size as u64 > state.limits.max_attachment_bytes {
        return Err(RelayError::invalid(format!(
            "attachment size must be 1..={} bytes",
            state.limits.max_attachment_bytes
        )));
    }
    if body.content_type.is_empty() || body.content_type.len() > 255 {
        return Err(RelayError::invalid("malformed content type"));
    }

    let object_key = format!("att/{}/{}", auth.whisper_id, Uuid::new_v4());
    attachments::record_upload(
        &state.db.pg,
        &object_key,
        &auth.whisper_id,
        body.size,
        &body.content_type,
        state.limits.attachment_ttl_days,
    )
    .await?;

    let ttl = presign_ttl(&state);
    let upload_url = storage(&state)?
        .presigned_put_url(&object_key, &body.content_type, ttl)
        .await?;
    RelayMetrics::incr(&state.metrics.presigns_issued);

    Ok((
        StatusCode::CREATED,
        Json(PresignUploadResponse { object_key, upload_url, expires_in: ttl }),
    ))
}

async fn presign_download(
    Extension(auth): Extension<AuthContext>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<PresignDownloadRequest>,
) -> RelayResult<Json<PresignDownloadResponse>> {
    rate_limit(&state, addr, &auth.whisper_id)?;

    let allowed =
        attachments::has_valid_grant(&state.db.pg, &body.object_key, &auth.whisper_id).await?;
    if !allowed {
        return Err(RelayError::Forbidden);
    }

    let ttl = presign_ttl(&state);
    let download_url = storage(&state)?.presigned_get_url(&body.object_key, ttl).await?;
    RelayMetrics::incr(&state.metrics.presigns_issued);

    Ok(Json(PresignDownloadResponse {
        object_key: body.object_key,
        download_url,
        expires_in: ttl,
    }))
}

fn presign_ttl(state: &AppState) -> u64 {
    // Presign lifetime rides on the storage config; AppState keeps a copy.
    state.presign_ttl_secs
}
