//! Identity model — the key-holding principal.
//!
//! Identities are pseudonymous: a WhisperID plus two public keys, nothing
//! else. No phone number, no email. Both keys are immutable for the
//! lifetime of the identity; there is no key rotation in this protocol.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered identity.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Identity {
    /// Public identifier (`WSP-XXXX-XXXX-XXXX`), derived from the signing key.
    pub whisper_id: String,

    /// X25519 public key, base64 (32 bytes decoded).
    pub enc_public_key: String,

    /// Ed25519 public key, base64 (32 bytes decoded).
    pub sign_public_key: String,

    pub status: IdentityStatus,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum IdentityStatus {
    Active,
    Banned,
}

impl Identity {
    pub fn is_banned(&self) -> bool {
        self.status == IdentityStatus::Banned
    }
}
