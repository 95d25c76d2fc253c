//! Ephemeral TURN credential issuance.
//!
//! Uses the coturn `static-auth-secret` scheme: the username is
//! `<unixExpiry>:<whisperId>` and the credential is
//! `base64(HMAC-SHA256(secret, username))`. The TURN server re-derives the
//! HMAC on connect, so the relay retains nothing. TTL is capped at 600 s.

use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;

use whisper_common::config::TurnConfig;

/// Protocol cap on credential lifetime, in seconds.
pub const MAX_TTL_SECS: u64 = 600;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnCredentials {
    pub urls: Vec<String>,
    pub username: String,
    pub credential: String,
    /// Seconds of validity remaining at issuance.
    pub ttl: u64,
    /// Relay clock at issuance, for client staleness detection.
    pub server_time: i64,
}

/// Derives short-lived TURN credentials bound to `(whisperId, expiry)`.
pub struct TurnIssuer {
    urls: Vec<String>,
    secret: String,
    ttl_secs: u64,
}

impl TurnIssuer {
    pub fn new(cfg: &TurnConfig) -> Self {
        Self {
            urls: cfg.url_list(),
            secret: cfg.secret.clone(),
            ttl_secs: cfg.ttl_secs.min(MAX_TTL_SECS),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.urls.is_empty() && !self.secret.is_empty()
    }

    /// Issue credentials valid for `ttl` seconds from `now_ms`.
    pub fn issue(&self, whisper_id: &str, now_ms: i64) -> TurnCredentials {
        let expiry_unix = now_ms / 1000 + self.ttl_secs as i64;
        let username = format!("{expiry_unix}:{whisper_id}");

        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(username.as_bytes());
        let credential = B64.encode(mac.finalize().into_bytes());

        TurnCredentials {
            urls: self.urls.clone(),
            username,
            credential,
            ttl: self.ttl_secs,
            server_time: now_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer(ttl_secs: u64) -> TurnIssuer {
        TurnIssuer::new(&TurnConfig {
            urls: "turn:turn.example.com:3478,turns:turn.example.com:5349".into(),
            secret: "shared-secret".into(),
            ttl_secs,
        })
    }

    #[test]
    fn ttl_is_capped_at_protocol_maximum() {
        let creds = issuer(86_400).issue("WSP-AAAA-BBBB-CCCC", 1_700_000_000_000);
        assert!(creds.ttl <= MAX_TTL_SECS);
    }

    #[test]
    fn username_encodes_expiry_and_identity() {
        let now_ms = 1_700_000_000_000;
        let creds = issuer(600).issue("WSP-AAAA-BBBB-CCCC", now_ms);
        let (expiry, id) = creds.username.split_once(':').expect("expiry:whisperId");
        assert_eq!(id, "WSP-AAAA-BBBB-CCCC");
        assert_eq!(expiry.parse::<i64>().unwrap(), now_ms / 1000 + 600);
        assert_eq!(creds.server_time, now_ms);
    }

    #[test]
    fn credential_is_deterministic_per_username() {
        let a = issuer(600).issue("WSP-AAAA-BBBB-CCCC", 1_700_000_000_000);
        let b = issuer(600).issue("WSP-AAAA-BBBB-CCCC", 1_700_000_000_000);
        assert_eq!(a.credential, b.credential, "TURN server must be able to re-derive");

        let later = issuer(600).issue("WSP-AAAA-BBBB-CCCC", 1_700_000_060_000);
        assert_ne!(a.credential, later.credential, "expiry is bound into the HMAC");
    }

    #[test]
    fn unconfigured_issuer_reports_it() {
        let unconfigured = TurnIssuer::new(&TurnConfig {
            urls: String::new(),
            secret: String::new(),
            ttl_secs: 600,
        });
        assert!(!unconfigured.is_configured());
        assert!(issuer(600).is_configured());
    }
}
