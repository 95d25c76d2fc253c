//! Zero-knowledge contact backup.
//!
//! PUT    /backup/contacts — upsert `{nonce, ciphertext}`
//! GET    /backup/contacts — fetch the blob
//! DELETE /backup/contacts — remove it
//!
//! The relay stores the pair verbatim and never inspects the ciphertext.

use axum::{
    Json, Router,
    extract::{ConnectInfo, Extension, State},
    http::StatusCode,
    response::IntoResponse,
    routing::put,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;

use whisper_common::crypto;
use whisper_common::error::{RelayError, RelayResult};
use whisper_common::metrics::RelayMetrics;
use whisper_common::ratelimit::EndpointClass;
use whisper_db::repository::backups;

use crate::{AppState, middleware::AuthContext};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PutBackupRequest {
    nonce: String,
    ciphertext: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BackupResponse {
    nonce: String,
    ciphertext: String,
    size_bytes: i64,
    updated_at: i64,
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route(
        "/backup/contacts",
        put(put_backup).get(get_backup).delete(delete_backup),
    )
}

fn rate_limit(state: &AppState, addr: SocketAddr, whisper_id: &str) -> RelayResult<()> {
    state
        .limiter
        .check(addr.ip(), Some(whisper_id), EndpointClass::Backup)
        .map_err(|retry_after_ms| {
            RelayMetrics::incr(&state.metrics.rate_limited);
            RelayError::RateLimited { retry_after_ms }
        })
}

async fn put_backup(
    Extension(auth): Extension<AuthContext>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<PutBackupRequest>,
) -> RelayResult<(StatusCode, Json<serde_json::Value>)> {
    rate_limit(&state, addr, &auth.whisper_id)?;

    crypto::decode_exact(&body.nonce, crypto::NONCE_LEN, "nonce")
        .map_err(|e| RelayError::invalid(e.to_string()))?;
    let ct = crypto::from_base64(&body.ciphertext)
        .ok_or_else(|| RelayError::invalid("ciphertext is not valid base64"))?;
    if ct.is_empty() {
        return Err(RelayError::invalid("ciphertext is empty"));
    }
    if ct.len() as u64 > state.limits.max_backup_bytes {
        return Err(RelayError::invalid(format!(
            "backup exceeds {} bytes",
            state.limits.max_backup_bytes
        )));
    }

    let stored = backups::upsert(
        &state.db.pg,
        &auth.whisper_id,
        &body.nonce,
        &body.ciphertext,
        ct.len() as i64,
    )
    .await?;
    RelayMetrics::incr(&state.metrics.backups_stored);

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "sizeBytes": stored.size_bytes,
            "updatedAt": stored.updated_at.timestamp_millis(),
        })),
    ))
}

async fn get_backup(
    Extension(auth): Extension<AuthContext>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
) -> RelayResult<Json<BackupResponse>> {
    rate_limit(&state, addr, &auth.whisper_id)?;

    let backup = backups::get(&state.db.pg, &auth.whisper_id)
        .await?
        .ok_or_else(|| RelayError::NotFound { resource: "backup".into() })?;

    Ok(Json(BackupResponse {
        nonce: backup.nonce,
        ciphertext: backup.ciphertext,
        size_bytes: backup.size_bytes,
        updated_at: backup.updated_at.timestamp_millis(),
    }))
}

async fn delete_backup(
    Extension(auth): Extension<AuthContext>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
) -> RelayResult<impl IntoResponse> {
    rate_limit(&state, addr, &auth.whisper_id)?;

    let removed = backups::delete(&state.db.pg, &auth.whisper_id).await?;
    if !removed {
        return Err(RelayError::NotFound { resource: "backup".into() });
    }
    Ok(StatusCode::OK)
}
