//! # whisper-api
//!
//! HTTP surface of the relay. Everything a client does outside the
//! gateway socket: public-key lookup, zero-knowledge contact backups,
//! attachment presigning, TURN credentials, and the unauthenticated
//! health/metrics endpoints.

pub mod middleware;
pub mod routes;
pub mod turn;

use axum::Router;
use std::sync::Arc;

use whisper_common::config::LimitsConfig;
use whisper_common::metrics::RelayMetrics;
use whisper_common::ratelimit::RateLimiter;
use whisper_db::{Database, sessions::SessionStore, storage::StorageClient};

use turn::TurnIssuer;

/// Shared application state available to all route handlers.
pub struct AppState {
    pub db: Database,
    pub sessions: Arc<SessionStore>,
    /// `None` when object storage is not configured — presign endpoints
    /// then answer `INTERNAL_ERROR` rather than panic.
    pub storage: Option<StorageClient>,
    pub turn: TurnIssuer,
    pub limiter: Arc<RateLimiter>,
    pub metrics: Arc<RelayMetrics>,
    pub limits: LimitsConfig,
    /// Lifetime of presigned upload/download URLs, from the storage config.
    pub presign_ttl_secs: u64,
}

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let state = Arc::new(state);

    let public = Router::new().merge(routes::health::router());

    let authed = Router::new()
        .merge(routes::keys::router())
        .merge(routes::backup::router())
        .merge(routes::attachments::router())
        .merge(routes::turn::router())
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    Router::new()
        .merge(public)
        .merge(authed)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .layer(tower_http::trace::TraceLayer::new_for_http())
        // Backups cap at 1 MiB of ciphertext; 2 MiB leaves base64 headroom.
        .layer(tower_http::limit::RequestBodyLimitLayer::new(2 * 1024 * 1024))
        .with_state(state)
}
