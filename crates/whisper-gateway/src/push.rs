//! Push hand-off seam.
//!
//! The push provider (APNs/FCM wire formats) is an external collaborator.
//! The gateway only decides *when* to hand off: an offline callee at
//! `call_initiate`, or an offline recipient with a queued envelope. The
//! in-tree implementation just logs.

use async_trait::async_trait;
use uuid::Uuid;
use whisper_common::models::Device;

#[async_trait]
pub trait PushSender: Send + Sync {
    /// Wake an offline callee for an incoming call (VoIP push).
    async fn notify_call(&self, callee: &str, devices: &[Device], call_id: Uuid, caller: &str);

    /// Nudge an offline recipient that envelopes are waiting.
    async fn notify_message(&self, recipient: &str, devices: &[Device]);
}

/// Logging no-op used until a real provider is wired in.
pub struct LogOnlyPush;

#[async_trait]
impl PushSender for LogOnlyPush {
    async fn notify_call(&self, callee: &str, devices: &[Device], call_id: Uuid, caller: &str) {
        let with_voip = devices.iter().filter(|d| d.voip_token.is_some()).count();
        tracing::info!(
            callee,
            caller,
            call_id = %call_id,
            devices = devices.len(),
            with_voip,
            "push hand-off: incoming call for offline callee"
        );
    }

    async fn notify_message(&self, recipient: &str, devices: &[Device]) {
        tracing::debug!(recipient, devices = devices.len(), "push hand-off: queued envelope");
    }
}
