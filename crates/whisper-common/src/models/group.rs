//! Group model — membership for fanout routing.
//!
//! The relay stores only routing metadata. Group names are chosen by
//! clients and are not encrypted here because they ride in unsigned
//! management frames; content confidentiality is per-member envelopes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Group {
    pub group_id: Uuid,
    pub name: String,
    /// WhisperID of the creator; the only member allowed to update.
    pub owner: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum GroupRole {
    Owner,
    Member,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct GroupMember {
    pub group_id: Uuid,
    pub whisper_id: String,
    pub role: GroupRole,
    /// Removed members stay as inactive rows so late receipts still resolve.
    pub active: bool,
    pub joined_at: DateTime<Utc>,
}
