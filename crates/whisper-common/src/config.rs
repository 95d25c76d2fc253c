//! Application configuration loaded from environment variables and config files.
//!
//! Supports `.env` files for development and environment variables for production.
//! Config precedence: env vars > .env file > config.toml > defaults.
//!
//! The loaded [`AppConfig`] is passed by value through constructors; there is
//! no process-global config.

use serde::Deserialize;

/// Load the application configuration from environment.
///
/// Called once at startup; the result is handed to each service constructor.
pub fn load() -> Result<AppConfig, config::ConfigError> {
    // Load .env file if present (development)
    let _ = dotenvy::dotenv();

    let cfg = config::Config::builder()
        // Defaults
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 8080)?
        .set_default("server.gateway_port", 8081)?
        .set_default("database.max_connections", 20)?
        .set_default("database.min_connections", 5)?
        .set_default("auth.session_ttl_secs", 2_592_000)? // 30 days
        .set_default("auth.challenge_ttl_secs", 120)?
        .set_default("auth.handshake_timeout_secs", 30)?
        .set_default("storage.endpoint", "")?
        .set_default("storage.bucket", "whisper-attachments")?
        .set_default("storage.access_key", "")?
        .set_default("storage.secret_key", "")?
        .set_default("storage.region", "us-east-1")?
        .set_default("storage.presign_ttl_secs", 900)? // 15 min
        .set_default("turn.urls", "")?
        .set_default("turn.secret", "")?
        .set_default("turn.ttl_secs", 600)?
        .set_default("limits.max_ciphertext_bytes", 65_536)? // 64 KiB relay envelope cap
        .set_default("limits.max_backup_bytes", 1_048_576)? // 1 MiB
        .set_default("limits.max_attachment_bytes", 104_857_600)? // 100 MiB
        .set_default("limits.fetch_page_size", 50)?
        .set_default("limits.send_queue_capacity", 64)?
        .set_default("limits.pending_ttl_days", 30)?
        .set_default("limits.attachment_ttl_days", 30)?
        // Optional config file
        .add_source(config::File::with_name("config").required(false))
        // Environment variables (WHISPER_SERVER__HOST, WHISPER_DATABASE__URL, etc.)
        .add_source(
            config::Environment::with_prefix("WHISPER")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    cfg.try_deserialize()
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    pub auth: AuthConfig,
    pub storage: StorageConfig,
    pub turn: TurnConfig,
    pub limits: LimitsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    /// HTTP surface (health, keys, backup, presign, TURN).
    pub port: u16,
    /// WebSocket gateway.
    pub gateway_port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RedisConfig {
    /// Redis connection URL — optional; omit for single-node in-process mode.
    pub url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// Session TTL in seconds (default 30 days).
    pub session_ttl_secs: u64,
    /// Registration challenge TTL in seconds (protocol cap: 120).
    pub challenge_ttl_secs: u64,
    /// Deadline for completing the auth handshake on a fresh socket.
    pub handshake_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// S3 endpoint URL (e.g., http://localhost:9000 for MinIO).
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    /// Lifetime of presigned upload/download URLs.
    pub presign_ttl_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TurnConfig {
    /// Comma-separated TURN/STUN URIs handed to clients.
    pub urls: String,
    /// Shared secret for ephemeral credential derivation (coturn static-auth-secret).
    pub secret: String,
    /// Credential lifetime in seconds (protocol cap: 600).
    pub ttl_secs: u64,
}

impl TurnConfig {
    /// Parse the comma-separated URI list.
    pub fn url_list(&self) -> Vec<String> {
        self.urls
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LimitsConfig {
    /// Maximum base64-decoded ciphertext size in a relay envelope.
    pub max_ciphertext_bytes: u64,
    /// Contact-backup ciphertext cap (protocol: 1 MiB).
    pub max_backup_bytes: u64,
    /// Maximum declared attachment size accepted at presign time.
    pub max_attachment_bytes: u64,
    /// Default pending-queue page size. Client requests are clamped
    /// server-side to at most 200.
    pub fetch_page_size: u32,
    /// Bounded per-connection outbound queue capacity.
    pub send_queue_capacity: u32,
    /// Undelivered envelope TTL in days (protocol: 30).
    pub pending_ttl_days: u32,
    /// Attachment metadata / access-grant TTL in days (protocol: 30).
    pub attachment_ttl_days: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_url_list_splits_and_trims() {
        let cfg = TurnConfig {
            urls: "turn:turn.example.com:3478, turns:turn.example.com:5349 ,".into(),
            secret: "s".into(),
            ttl_secs: 600,
        };
        assert_eq!(
            cfg.url_list(),
            vec![
                "turn:turn.example.com:3478".to_string(),
                "turns:turn.example.com:5349".to_string(),
            ]
        );
    }

    #[test]
    fn turn_url_list_empty_when_unset() {
        let cfg = TurnConfig { urls: String::new(), secret: String::new(), ttl_secs: 600 };
        assert!(cfg.url_list().is_empty());
    }
}
