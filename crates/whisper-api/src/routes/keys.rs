//! Public-key lookup — the directory clients query before first contact.
//!
//! GET /users/{whisper_id}/keys

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use serde::Serialize;
use std::sync::Arc;

use whisper_common::error::{RelayError, RelayResult};
use whisper_common::whisper_id;
use whisper_db::repository::identities;

use crate::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct KeysResponse {
    whisper_id: String,
    enc_public_key: String,
    sign_public_key: String,
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/users/{whisper_id}/keys", get(get_keys))
}

async fn get_keys(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> RelayResult<Json<KeysResponse>> {
    if !whisper_id::is_valid(&id) {
        return Err(RelayError::invalid("malformed whisper id"));
    }

    let identity = identities::find(&state.db.pg, &id)
        .await?
        .ok_or_else(|| RelayError::NotFound { resource: "identity".into() })?;

    // Banned identities are unreachable even to authenticated peers.
    if identity.is_banned() {
        return Err(RelayError::Forbidden);
    }

    Ok(Json(KeysResponse {
        whisper_id: identity.whisper_id,
        enc_public_key: identity.enc_public_key,
        sign_public_key: identity.sign_public_key,
    }))
}
