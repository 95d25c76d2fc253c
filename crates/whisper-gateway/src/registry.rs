//! Live-session registry — which identities have an open socket right now.
//!
//! Each connection registers a handle carrying its bounded outbound queue.
//! Fanout uses `try_send`: a full queue skips live delivery (the envelope
//! is already durable and the drain path will replay it), so a slow
//! recipient can never block a sender's task. The drain path itself uses
//! the blocking `send` for backpressure.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use whisper_common::protocol::{ErrorBody, Frame, PresenceStatus};

/// What flows through a connection's outbound queue.
#[derive(Debug, Clone)]
pub enum Outbound {
    Frame(Frame),
    /// Terminal: send the final error frame (if any), then close the socket.
    Close(Option<ErrorBody>),
}

/// One live connection of an identity.
#[derive(Clone)]
pub struct SessionHandle {
    pub device_id: Uuid,
    pub tx: mpsc::Sender<Outbound>,
}

/// Tracks all live gateway sessions.
pub struct LiveRegistry {
    /// Map of whisper_id → open connections (normally at most one).
    sessions: Arc<RwLock<HashMap<String, Vec<SessionHandle>>>>,
    /// Last reported presence per identity.
    presence: Arc<RwLock<HashMap<String, PresenceStatus>>>,
}

impl LiveRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            presence: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a connection. An existing handle for the same device is
    /// replaced (reconnect won the race over its own cleanup).
    pub async fn register(&self, whisper_id: &str, handle: SessionHandle) {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.entry(whisper_id.to_string()).or_default();
        entry.retain(|h| h.device_id != handle.device_id);
        entry.push(handle);
    }

    /// Remove a connection on close.
    pub async fn remove(&self, whisper_id: &str, device_id: Uuid) {
        let mut sessions = self.sessions.write().await;
        if let Some(entry) = sessions.get_mut(whisper_id) {
            entry.retain(|h| h.device_id != device_id);
            if entry.is_empty() {
                sessions.remove(whisper_id);
                self.presence.write().await.remove(whisper_id);
            }
        }
    }

    /// Outbound queues of an identity's live connections.
    pub async fn senders_for(&self, whisper_id: &str) -> Vec<mpsc::Sender<Outbound>> {
        self.sessions
            .read()
            .await
            .get(whisper_id)
            .map(|handles| handles.iter().map(|h| h.tx.clone()).collect())
            .unwrap_or_default()
    }

    pub async fn is_online(&self, whisper_id: &str) -> bool {
        self.sessions
            .read()
            .await
            .get(whisper_id)
            .is_some_and(|handles| !handles.is_empty())
    }

    /// Best-effort live delivery. Returns `true` if at least one connection
    /// accepted the frame.
    pub async fn try_deliver(&self, whisper_id: &str, frame: &Frame) -> bool {
        let mut delivered = false;
        for tx in self.senders_for(whisper_id).await {
            if tx.try_send(Outbound::Frame(frame.clone())).is_ok() {
                delivered = true;
            }
        }
        delivered
    }

    /// Force-close every connection of an identity (ban, device rebind).
    pub async fn close_all(&self, whisper_id: &str, error: Option<ErrorBody>) {
        let handles = {
            let mut sessions = self.sessions.write().await;
            sessions.remove(whisper_id).unwrap_or_default()
        };
        self.presence.write().await.remove(whisper_id);
        for handle in handles {
            let _ = handle.tx.try_send(Outbound::Close(error.clone()));
        }
    }

    pub async fn set_presence(&self, whisper_id: &str, status: PresenceStatus) {
        self.presence.write().await.insert(whisper_id.to_string(), status);
    }

    pub async fn presence_of(&self, whisper_id: &str) -> Option<PresenceStatus> {
        self.presence.read().await.get(whisper_id).copied()
    }

    /// Total live connections.
    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.values().map(Vec::len).sum()
    }
}

impl Default for LiveRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use whisper_common::protocol::kind;

    const WID: &str = "WSP-AAAA-BBBB-CCCC";

    fn handle(capacity: usize) -> (SessionHandle, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity);
        (SessionHandle { device_id: Uuid::new_v4(), tx }, rx)
    }

    fn ping() -> Frame {
        Frame { kind: kind::PING.into(), request_id: None, payload: serde_json::Value::Null }
    }

    #[tokio::test]
    async fn register_and_deliver() {
        let registry = LiveRegistry::new();
        let (h, mut rx) = handle(4);
        registry.register(WID, h).await;

        assert!(registry.is_online(WID).await);
        assert!(registry.try_deliver(WID, &ping()).await);
        assert!(matches!(rx.recv().await, Some(Outbound::Frame(_))));
        assert!(!registry.try_deliver("WSP-DDDD-EEEE-FFFF", &ping()).await);
    }

    #[tokio::test]
    async fn remove_takes_identity_offline() {
        let registry = LiveRegistry::new();
        let (h, _rx) = handle(4);
        let device = h.device_id;
        registry.register(WID, h).await;
        registry.remove(WID, device).await;
        assert!(!registry.is_online(WID).await);
        assert_eq!(registry.active_count().await, 0);
    }

    #[tokio::test]
    async fn full_queue_does_not_count_as_delivered() {
        let registry = LiveRegistry::new();
        let (h, _rx) = handle(1);
        registry.register(WID, h).await;

        assert!(registry.try_deliver(WID, &ping()).await);
        // Queue of 1 is now full; the envelope stays in the durable queue.
        assert!(!registry.try_deliver(WID, &ping()).await);
    }

    #[tokio::test]
    async fn close_all_sends_terminal_and_unregisters() {
        let registry = LiveRegistry::new();
        let (h1, mut rx1) = handle(4);
        let (h2, mut rx2) = handle(4);
        registry.register(WID, h1).await;
        registry.register(WID, h2).await;

        registry.close_all(WID, None).await;

        assert!(!registry.is_online(WID).await);
        assert!(matches!(rx1.recv().await, Some(Outbound::Close(None))));
        assert!(matches!(rx2.recv().await, Some(Outbound::Close(None))));
    }

    #[tokio::test]
    async fn reconnect_replaces_same_device_handle() {
        let registry = LiveRegistry::new();
        let (h1, _rx1) = handle(4);
        let device = h1.device_id;
        registry.register(WID, h1).await;

        let (tx, _rx2) = mpsc::channel(4);
        registry.register(WID, SessionHandle { device_id: device, tx }).await;
        assert_eq!(registry.active_count().await, 1);
    }
}
