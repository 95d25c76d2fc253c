//! Session store — opaque tokens resolving to `(whisperId, deviceId, expiry)`.
//!
//! Tokens are 32 random bytes, hex-encoded; they are indexes into this
//! store and never encode secret material. Redis-backed when configured
//! (shared across nodes), in-process otherwise. `revoke_all_for` is how the
//! registry enforces single-active-device: binding a new device revokes
//! every session previously issued for the identity.

use chrono::{DateTime, Utc};
use rand::RngCore;
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

use whisper_common::error::{RelayError, RelayResult};

const TOKEN_BYTES: usize = 32;

fn session_key(token: &str) -> String {
    format!("session:{token}")
}

fn identity_key(whisper_id: &str) -> String {
    format!("sessions:{whisper_id}")
}

/// What a token resolves to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub whisper_id: String,
    pub device_id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Default)]
struct MemorySessions {
    by_token: HashMap<String, SessionRecord>,
    by_identity: HashMap<String, HashSet<String>>,
}

enum Backend {
    Redis(ConnectionManager),
    Memory(Arc<RwLock<MemorySessions>>),
}

/// The shared session store.
pub struct SessionStore {
    backend: Backend,
}

impl SessionStore {
    pub fn redis(conn: ConnectionManager) -> Self {
        Self { backend: Backend::Redis(conn) }
    }

    pub fn in_memory() -> Self {
        Self { backend: Backend::Memory(Arc::new(RwLock::new(MemorySessions::default()))) }
    }

    fn new_token() -> String {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    /// Issue a fresh token for `(whisper_id, device_id)`.
    pub async fn issue(
        &self,
        whisper_id: &str,
        device_id: Uuid,
        ttl: Duration,
    ) -> RelayResult<(String, SessionRecord)> {
        let now = Utc::now();
        let record = SessionRecord {
            whisper_id: whisper_id.to_string(),
            device_id,
            issued_at: now,
            expires_at: now + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero()),
        };
        let token = Self::new_token();
        self.store(&token, &record, ttl).await?;
        Ok((token, record))
    }

    async fn store(&self, token: &str, record: &SessionRecord, ttl: Duration) -> RelayResult<()> {
        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                let json = serde_json::to_string(record).expect("session record serializes");
                let ttl_secs = ttl.as_secs().max(1);
                crate::redis_pool::set_ex(&mut conn, &session_key(token), &json, ttl_secs).await?;
                crate::redis_pool::sadd_ex(
                    &mut conn,
                    &identity_key(&record.whisper_id),
                    token,
                    ttl_secs,
                )
                .await?;
            }
            Backend::Memory(mem) => {
                let mut mem = mem.write().await;
                mem.by_token.insert(token.to_string(), record.clone());
                mem.by_identity
                    .entry(record.whisper_id.clone())
                    .or_default()
                    .insert(token.to_string());
            }
        }
        Ok(())
    }

    /// Resolve a token. Expired or unknown tokens yield `None`; banned-status
    /// checks are layered on top by the caller against the identity registry.
    pub async fn resolve(&self, token: &str) -> RelayResult<Option<SessionRecord>> {
        let now = Utc::now();
        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                let Some(json) = crate::redis_pool::get(&mut conn, &session_key(token)).await?
                else {
                    return Ok(None);
                };
                let record: SessionRecord = serde_json::from_str(&json)
                    .map_err(|e| RelayError::Internal(anyhow::anyhow!("corrupt session: {e}")))?;
                Ok((!record.is_expired(now)).then_some(record))
            }
            Backend::Memory(mem) => {
                let mem = mem.read().await;
                Ok(mem.by_token.get(token).filter(|r| !r.is_expired(now)).cloned())
            }
        }
    }

    /// Rotate a token, extending expiry monotonically: the new `expires_at`
    /// is never earlier than the old one. The old token dies.
    pub async fn refresh(
        &self,
        token: &str,
        ttl: Duration,
    ) -> RelayResult<Option<(String, SessionRecord)>> {
        let Some(old) = self.resolve(token).await? else {
            return Ok(None);
        };
        let now = Utc::now();
        let extended =
            now + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero());
        let record = SessionRecord {
            whisper_id: old.whisper_id.clone(),
            device_id: old.device_id,
            issued_at: now,
            expires_at: extended.max(old.expires_at),
        };
        let new_token = Self::new_token();
        let effective_ttl = (record.expires_at - now)
            .to_std()
            .unwrap_or(ttl);
        self.store(&new_token, &record, effective_ttl).await?;
        self.revoke(token).await?;
        Ok(Some((new_token, record)))
    }

    /// Expire a single token immediately.
    pub async fn revoke(&self, token: &str) -> RelayResult<()> {
        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                if let Some(json) = crate::redis_pool::get(&mut conn, &session_key(token)).await? {
                    if let Ok(record) = serde_json::from_str::<SessionRecord>(&json) {
                        crate::redis_pool::srem(
                            &mut conn,
                            &identity_key(&record.whisper_id),
                            token,
                        )
                        .await?;
                    }
                }
                crate::redis_pool::del(&mut conn, &session_key(token)).await?;
            }
            Backend::Memory(mem) => {
                let mut mem = mem.write().await;
                if let Some(record) = mem.by_token.remove(token) {
                    if let Some(set) = mem.by_identity.get_mut(&record.whisper_id) {
                        set.remove(token);
                    }
                }
            }
        }
        Ok(())
    }

    /// Expire every session of an identity (device rebind, ban).
    pub async fn revoke_all_for(&self, whisper_id: &str) -> RelayResult<()> {
        match &self.backend {
            Backend::Redis(conn) => {
                let mut conn = conn.clone();
                let tokens =
                    crate::redis_pool::smembers(&mut conn, &identity_key(whisper_id)).await?;
                for token in tokens {
                    crate::redis_pool::del(&mut conn, &session_key(&token)).await?;
                }
                crate::redis_pool::del(&mut conn, &identity_key(whisper_id)).await?;
            }
            Backend::Memory(mem) => {
                let mut mem = mem.write().await;
                if let Some(tokens) = mem.by_identity.remove(whisper_id) {
                    for token in tokens {
                        mem.by_token.remove(&token);
                    }
                }
            }
        }
        Ok(())
    }

    /// Drop expired in-process records. No-op on Redis (TTLs handle it).
    pub async fn gc(&self) {
        if let Backend::Memory(mem) = &self.backend {
            let now = Utc::now();
            let mut mem = mem.write().await;
            let expired: Vec<(String, String)> = mem
                .by_token
                .iter()
                .filter(|(_, r)| r.is_expired(now))
                .map(|(t, r)| (t.clone(), r.whisper_id.clone()))
                .collect();
            for (token, whisper_id) in expired {
                mem.by_token.remove(&token);
                if let Some(set) = mem.by_identity.get_mut(&whisper_id) {
                    set.remove(&token);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WID: &str = "WSP-AAAA-BBBB-CCCC";

    #[tokio::test]
    async fn issue_and_resolve_round_trip() {
        let store = SessionStore::in_memory();
        let device = Uuid::new_v4();
        let (token, record) = store.issue(WID, device, Duration::from_secs(60)).await.unwrap();
        assert_eq!(token.len(), TOKEN_BYTES * 2, "hex-encoded token");

        let resolved = store.resolve(&token).await.unwrap().expect("live session");
        assert_eq!(resolved.whisper_id, WID);
        assert_eq!(resolved.device_id, device);
        assert_eq!(resolved.expires_at, record.expires_at);
    }

    #[tokio::test]
    async fn unknown_and_expired_tokens_resolve_to_none() {
        let store = SessionStore::in_memory();
        assert!(store.resolve("deadbeef").await.unwrap().is_none());

        let (token, _) = store.issue(WID, Uuid::new_v4(), Duration::ZERO).await.unwrap();
        assert!(store.resolve(&token).await.unwrap().is_none(), "zero TTL is already expired");
    }

    #[tokio::test]
    async fn refresh_rotates_token_and_is_monotonic() {
        let store = SessionStore::in_memory();
        let (token, old) = store.issue(WID, Uuid::new_v4(), Duration::from_secs(3600)).await.unwrap();

        // Refresh with a shorter TTL must not shorten the session.
        let (new_token, record) = store
            .refresh(&token, Duration::from_secs(10))
            .await
            .unwrap()
            .expect("refreshable");
        assert_ne!(new_token, token);
        assert!(record.expires_at >= old.expires_at);

        assert!(store.resolve(&token).await.unwrap().is_none(), "old token must die");
        assert!(store.resolve(&new_token).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn revoke_all_for_enforces_single_active_device() {
        let store = SessionStore::in_memory();
        let (t1, _) = store.issue(WID, Uuid::new_v4(), Duration::from_secs(60)).await.unwrap();
        let (t2, _) = store.issue(WID, Uuid::new_v4(), Duration::from_secs(60)).await.unwrap();
        let (other, _) = store
            .issue("WSP-DDDD-EEEE-FFFF", Uuid::new_v4(), Duration::from_secs(60))
            .await
            .unwrap();

        store.revoke_all_for(WID).await.unwrap();

        assert!(store.resolve(&t1).await.unwrap().is_none());
        assert!(store.resolve(&t2).await.unwrap().is_none());
        assert!(store.resolve(&other).await.unwrap().is_some(), "other identities untouched");
    }

    #[tokio::test]
    async fn gc_drops_expired_records() {
        let store = SessionStore::in_memory();
        let (dead, _) = store.issue(WID, Uuid::new_v4(), Duration::ZERO).await.unwrap();
        let (live, _) = store.issue(WID, Uuid::new_v4(), Duration::from_secs(60)).await.unwrap();
        store.gc().await;
        assert!(store.resolve(&dead).await.unwrap().is_none());
        assert!(store.resolve(&live).await.unwrap().is_some());
    }
}
