//! Zero-knowledge contact backup — one opaque blob per identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The encrypted contact list. The symmetric key is derived client-side
/// from the mnemonic and never reaches the relay; nonce is exactly 24
/// bytes after base64 decode, ciphertext is capped at 1 MiB.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ContactBackup {
    pub whisper_id: String,
    pub nonce: String,
    pub ciphertext: String,
    pub size_bytes: i64,
    pub updated_at: DateTime<Utc>,
}
