//! # Whisper2 Relay Server
//!
//! Main binary wiring the two surfaces together:
//! - HTTP API (keys, backups, presigning, TURN, health/metrics)
//! - WebSocket gateway (auth handshake, envelope relay, call signaling)
//!
//! The relay is zero-knowledge: it stores routing envelopes, signatures,
//! and opaque ciphertext — never plaintext, never private keys.

mod sweeper;

use std::net::SocketAddr;
use std::sync::Arc;

use whisper_api::{AppState, turn::TurnIssuer};
use whisper_common::metrics::RelayMetrics;
use whisper_common::ratelimit::RateLimiter;
use whisper_db::{Database, sessions::SessionStore, storage::StorageClient};
use whisper_gateway::{GatewayState, push::LogOnlyPush};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = whisper_common::config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "whisper=debug,tower_http=debug".into()),
        )
        .with_target(true)
        .init();

    tracing::info!("🔐 Starting Whisper2 relay v{}", env!("CARGO_PKG_VERSION"));

    // === Durable stores ===
    let db = Database::connect(&config.database, &config.redis).await?;
    db.migrate().await?;

    let sessions = Arc::new(match &db.redis {
        Some(conn) => SessionStore::redis(conn.clone()),
        None => SessionStore::in_memory(),
    });

    // === Object storage (MinIO / S3) ===
    let storage = if config.storage.endpoint.is_empty() {
        tracing::warn!("object storage not configured — attachment presigning disabled");
        None
    } else {
        let client = StorageClient::new(&config.storage)?;
        client.ensure_bucket().await?;
        tracing::info!(bucket = %config.storage.bucket, "📦 Object storage ready");
        Some(client)
    };

    // === Shared infrastructure ===
    let limiter = Arc::new(RateLimiter::new());
    let metrics = Arc::new(RelayMetrics::new());
    let push = Arc::new(LogOnlyPush);

    // === WebSocket gateway ===
    let gateway_state = GatewayState::new(
        db.clone(),
        sessions.clone(),
        limiter.clone(),
        metrics.clone(),
        push,
        config.auth.clone(),
        config.limits.clone(),
    );
    let calls = gateway_state.calls.clone();
    let gateway_router = whisper_gateway::build_router(gateway_state);
    let gateway_addr = SocketAddr::new(config.server.host.parse()?, config.server.gateway_port);

    // === HTTP API ===
    let api_state = AppState {
        db: db.clone(),
        sessions: sessions.clone(),
        storage,
        turn: TurnIssuer::new(&config.turn),
        limiter: limiter.clone(),
        metrics: metrics.clone(),
        limits: config.limits.clone(),
        presign_ttl_secs: config.storage.presign_ttl_secs,
    };
    let api_router = whisper_api::build_router(api_state);
    let api_addr = SocketAddr::new(config.server.host.parse()?, config.server.port);

    // === Background sweeps ===
    sweeper::spawn_sweepers(
        db.clone(),
        sessions.clone(),
        calls,
        limiter.clone(),
        config.limits.clone(),
    );

    tracing::info!("📡 HTTP API listening on http://{api_addr}");
    tracing::info!("🔌 Gateway listening on ws://{gateway_addr}/gateway");

    tokio::try_join!(
        async {
            let listener = tokio::net::TcpListener::bind(api_addr).await?;
            axum::serve(
                listener,
                api_router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await?;
            Ok::<_, anyhow::Error>(())
        },
        async {
            let listener = tokio::net::TcpListener::bind(gateway_addr).await?;
            axum::serve(
                listener,
                gateway_router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await?;
            Ok::<_, anyhow::Error>(())
        },
    )?;

    Ok(())
}
