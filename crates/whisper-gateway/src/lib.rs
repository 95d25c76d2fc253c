//! # whisper-gateway
//!
//! Real-time WebSocket gateway for the Whisper2 relay. Handles:
//! - The connection auth state machine (challenge → proof → session)
//! - Signed-envelope validation and fanout to live sockets or the queue
//! - Pending-queue drain on connect, with per-connection backpressure
//! - Call signaling routing with ring timeouts
//! - Keepalive and forced-close (ban, session revoked elsewhere)
//!
//! Each connection is owned by one task; outbound frames are serialized
//! onto a bounded per-connection queue.

pub mod calls;
pub mod connection;
pub mod dispatcher;
pub mod push;
pub mod registry;
pub mod validator;

use axum::{
    Router,
    extract::{ConnectInfo, State, WebSocketUpgrade, ws::WebSocket},
    response::Response,
    routing::get,
};
use std::net::SocketAddr;
use std::sync::Arc;

use whisper_common::config::{AuthConfig, LimitsConfig};
use whisper_common::metrics::RelayMetrics;
use whisper_common::models::IdentityStatus;
use whisper_common::ratelimit::RateLimiter;
use whisper_db::{Database, repository, sessions::SessionStore};

use calls::CallRouter;
use push::PushSender;
use registry::LiveRegistry;

/// Gateway state, shared by every connection task.
#[derive(Clone)]
pub struct GatewayState {
    pub db: Database,
    pub sessions: Arc<SessionStore>,
    pub registry: Arc<LiveRegistry>,
    pub calls: Arc<CallRouter>,
    pub limiter: Arc<RateLimiter>,
    pub metrics: Arc<RelayMetrics>,
    pub push: Arc<dyn PushSender>,
    pub auth: AuthConfig,
    pub limits: LimitsConfig,
}

impl GatewayState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Database,
        sessions: Arc<SessionStore>,
        limiter: Arc<RateLimiter>,
        metrics: Arc<RelayMetrics>,
        push: Arc<dyn PushSender>,
        auth: AuthConfig,
        limits: LimitsConfig,
    ) -> Self {
        let registry = Arc::new(LiveRegistry::new());
        let calls = Arc::new(CallRouter::new(
            db.clone(),
            registry.clone(),
            metrics.clone(),
            push.clone(),
        ));
        Self { db, sessions, registry, calls, limiter, metrics, push, auth, limits }
    }

    /// Ban an identity: flip status, revoke every session, and close every
    /// live socket. The operational entry point for moderation tooling.
    pub async fn ban_identity(&self, whisper_id: &str) -> anyhow::Result<()> {
        repository::identities::set_status(&self.db.pg, whisper_id, IdentityStatus::Banned)
            .await?;
        self.sessions.revoke_all_for(whisper_id).await?;
        let err = whisper_common::error::RelayError::UserBanned;
        self.registry
            .close_all(whisper_id, Some(whisper_common::protocol::ErrorBody::from(&err)))
            .await;
        tracing::warn!(whisper_id, "identity banned — sessions revoked, sockets closed");
        Ok(())
    }
}

/// Build the gateway WebSocket router.
pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/gateway", get(ws_handler))
        .with_state(Arc::new(state))
}

/// WebSocket upgrade handler. The client IP keys the registration
/// rate limiter, so it is captured before the upgrade completes.
async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<GatewayState>>,
) -> Response {
    ws.on_upgrade(move |socket: WebSocket| connection::run(socket, addr.ip(), state))
}
