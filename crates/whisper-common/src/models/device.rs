//! Device binding — one row per install.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A device bound to an identity. At most one `(whisper_id, device_id)`
/// pair holds valid sessions at any time; binding a new device revokes all
/// sessions previously issued for the identity.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Device {
    pub whisper_id: String,

    /// Client-generated UUID, established once per install.
    pub device_id: Uuid,

    /// `ios` | `android` (free-form; the relay does not interpret it).
    pub platform: String,

    /// Push-provider token for message notification hand-off.
    pub push_token: Option<String>,

    /// VoIP push token for incoming-call hand-off.
    pub voip_token: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
