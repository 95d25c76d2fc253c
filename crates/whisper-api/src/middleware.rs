//! Middleware — bearer-session authentication.
//!
//! Sessions are opaque random tokens resolved against the session store;
//! nothing is decoded from the token itself. The resolved identity must
//! exist and be active — a session for a banned identity is invalid.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use uuid::Uuid;

use whisper_common::error::RelayError;
use whisper_db::repository::identities;

use crate::AppState;

/// Authentication context extracted from `Authorization: Bearer <token>`.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub whisper_id: String,
    pub device_id: Uuid,
}

pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, RelayError> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(RelayError::AuthFailed)?;

    let token = auth_header.strip_prefix("Bearer ").ok_or(RelayError::AuthFailed)?;

    let session = state
        .sessions
        .resolve(token)
        .await?
        .ok_or(RelayError::AuthFailed)?;

    let identity = identities::find(&state.db.pg, &session.whisper_id)
        .await?
        .ok_or(RelayError::NotRegistered)?;
    if identity.is_banned() {
        return Err(RelayError::UserBanned);
    }

    let auth_ctx =
        AuthContext { whisper_id: session.whisper_id, device_id: session.device_id };
    request.extensions_mut().insert(auth_ctx);

    Ok(next.run(request).await)
}
