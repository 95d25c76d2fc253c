//! TURN credential issuance.
//!
//! GET /turn/credentials — short-lived HMAC-derived credentials for the
//! configured TURN/STUN servers. Nothing is stored; the TURN server
//! re-derives the HMAC from the shared secret.

use axum::{
    Json, Router,
    extract::{ConnectInfo, Extension, State},
    routing::get,
};
use std::net::SocketAddr;
use std::sync::Arc;

use whisper_common::error::{RelayError, RelayResult};
use whisper_common::metrics::RelayMetrics;
use whisper_common::ratelimit::EndpointClass;

use crate::turn::TurnCredentials;
use crate::{AppState, middleware::AuthContext};

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/turn/credentials", get(get_credentials))
}

async fn get_credentials(
    Extension(auth): Extension<AuthContext>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
) -> RelayResult<Json<TurnCredentials>> {
    state
        .limiter
        .check(addr.ip(), Some(&auth.whisper_id), EndpointClass::Lookup)
        .map_err(|retry_after_ms| {
            RelayMetrics::incr(&state.metrics.rate_limited);
            RelayError::RateLimited { retry_after_ms }
        })?;

    if !state.turn.is_configured() {
        return Err(RelayError::NotFound { resource: "turn".into() });
    }

    let creds = state.turn.issue(&auth.whisper_id, whisper_common::now_ms());
    RelayMetrics::incr(&state.metrics.turn_issued);
    Ok(Json(creds))
}
