//! Attachment metadata and access grants.
//!
//! The relay never sees blob bytes — clients upload and download via
//! presigned URLs. A blob becomes fetchable to a recipient only after a
//! validated envelope referencing it creates an access grant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AttachmentStatus {
    /// Presigned for upload, not yet referenced by any envelope.
    Pending,
    /// Referenced by at least one accepted envelope.
    Linked,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AttachmentMeta {
    /// Opaque object key (`att/<whisperId>/<uuid>`).
    pub object_key: String,
    pub owner: String,
    /// Declared encrypted size in bytes.
    pub size: i64,
    pub content_type: String,
    pub status: AttachmentStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AccessGrant {
    pub object_key: String,
    pub whisper_id: String,
    pub expires_at: DateTime<Utc>,
}
