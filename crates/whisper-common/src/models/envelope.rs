//! Pending-queue row — the durable form of an undelivered frame.
//!
//! Two kinds share the queue: signed message envelopes and delivery
//! receipts routed back to an offline sender. Replay order per recipient is
//! insertion order (`seq`); rows are deleted on client ack or TTL expiry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::protocol::{
    self, AttachmentRef, Frame, MessageDelivered, MessageReceived, MsgType, ReceiptStatus, kind,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    Message,
    Receipt,
}

/// One queued row, as stored and as replayed.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PendingEnvelope {
    /// Monotonic insertion order per recipient; the replay cursor.
    pub seq: i64,

    pub recipient: String,

    /// Sender-generated UUID. `(recipient, message_id)` is unique.
    pub message_id: Uuid,

    pub kind: EnvelopeKind,

    /// `text|image|voice|file|system` for messages, `system` for receipts.
    pub msg_type: String,

    pub sender: String,

    /// Client timestamp in ms since epoch, as signed.
    pub timestamp: i64,

    pub nonce: Option<String>,
    pub ciphertext: Option<String>,
    pub sig: Option<String>,

    pub reply_to: Option<Uuid>,

    /// `AttachmentRef` as JSONB, when the envelope references a blob.
    pub attachment: Option<Value>,

    /// For receipt rows: the message being confirmed and the ack level.
    pub receipt_of: Option<Uuid>,
    pub receipt_status: Option<String>,

    pub queued_at: DateTime<Utc>,
}

impl PendingEnvelope {
    /// Rebuild the outbound frame this row replays as: `message_received`
    /// for messages, `message_delivered` for queued receipts.
    pub fn to_frame(&self) -> Frame {
        match self.kind {
            EnvelopeKind::Message => {
                let payload = MessageReceived {
                    message_id: self.message_id,
                    msg_type: MsgType::parse(&self.msg_type).unwrap_or(MsgType::Text),
                    from: self.sender.clone(),
                    to: self.recipient.clone(),
                    timestamp: self.timestamp,
                    nonce: self.nonce.clone().unwrap_or_default(),
                    ciphertext: self.ciphertext.clone().unwrap_or_default(),
                    sig: self.sig.clone().unwrap_or_default(),
                    reply_to: self.reply_to,
                    attachment: self
                        .attachment
                        .clone()
                        .and_then(|v| serde_json::from_value::<AttachmentRef>(v).ok()),
                };
                Frame::new(kind::MESSAGE_RECEIVED, &payload)
            }
            EnvelopeKind::Receipt => {
                let payload = MessageDelivered {
                    message_id: self.receipt_of.unwrap_or(self.message_id),
                    status: self
                        .receipt_status
                        .as_deref()
                        .and_then(ReceiptStatus::parse)
                        .unwrap_or(ReceiptStatus::Delivered),
                    from: self.sender.clone(),
                    server_time: self.timestamp,
                };
                Frame::new(kind::MESSAGE_DELIVERED, &payload)
            }
        }
    }
}

/// A row about to be enqueued (no `seq` yet — assigned by the store).
#[derive(Debug, Clone)]
pub struct NewEnvelope {
    pub recipient: String,
    pub message_id: Uuid,
    pub kind: EnvelopeKind,
    pub msg_type: String,
    pub sender: String,
    pub timestamp: i64,
    pub nonce: Option<String>,
    pub ciphertext: Option<String>,
    pub sig: Option<String>,
    pub reply_to: Option<Uuid>,
    pub attachment: Option<Value>,
    pub receipt_of: Option<Uuid>,
    pub receipt_status: Option<String>,
}

impl NewEnvelope {
    /// The frame this envelope delivers as on the live path. Mirrors
    /// [`PendingEnvelope::to_frame`] for rows that never hit a page fetch.
    pub fn to_frame(&self) -> Frame {
        match self.kind {
            EnvelopeKind::Message => {
                let payload = MessageReceived {
                    message_id: self.message_id,
                    msg_type: MsgType::parse(&self.msg_type).unwrap_or(MsgType::Text),
                    from: self.sender.clone(),
                    to: self.recipient.clone(),
                    timestamp: self.timestamp,
                    nonce: self.nonce.clone().unwrap_or_default(),
                    ciphertext: self.ciphertext.clone().unwrap_or_default(),
                    sig: self.sig.clone().unwrap_or_default(),
                    reply_to: self.reply_to,
                    attachment: self
                        .attachment
                        .clone()
                        .and_then(|v| serde_json::from_value::<AttachmentRef>(v).ok()),
                };
                Frame::new(kind::MESSAGE_RECEIVED, &payload)
            }
            EnvelopeKind::Receipt => {
                let payload = MessageDelivered {
                    message_id: self.receipt_of.unwrap_or(self.message_id),
                    status: self
                        .receipt_status
                        .as_deref()
                        .and_then(ReceiptStatus::parse)
                        .unwrap_or(ReceiptStatus::Delivered),
                    from: self.sender.clone(),
                    server_time: self.timestamp,
                };
                Frame::new(kind::MESSAGE_DELIVERED, &payload)
            }
        }
    }

    /// Build a message row from a validated `send_message` payload.
    pub fn message(msg: &protocol::SendMessage) -> Self {
        Self {
            recipient: msg.to.clone(),
            message_id: msg.message_id,
            kind: EnvelopeKind::Message,
            msg_type: msg.msg_type.as_str().to_string(),
            sender: msg.from.clone(),
            timestamp: msg.timestamp,
            nonce: Some(msg.nonce.clone()),
            ciphertext: Some(msg.ciphertext.clone()),
            sig: Some(msg.sig.clone()),
            reply_to: msg.reply_to,
            attachment: msg
                .attachment
                .as_ref()
                .map(|a| serde_json::to_value(a).expect("attachment serializes")),
            receipt_of: None,
            receipt_status: None,
        }
    }

    /// Build a receipt row addressed back to the original sender.
    pub fn receipt(
        original_sender: &str,
        acker: &str,
        message_id: Uuid,
        status: ReceiptStatus,
        server_time: i64,
    ) -> Self {
        Self {
            recipient: original_sender.to_string(),
            message_id: Uuid::new_v4(),
            kind: EnvelopeKind::Receipt,
            msg_type: "system".to_string(),
            sender: acker.to_string(),
            timestamp: server_time,
            nonce: None,
            ciphertext: None,
            sig: None,
            reply_to: None,
            attachment: None,
            receipt_of: Some(message_id),
            receipt_status: Some(status.as_str().to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message_row() -> PendingEnvelope {
        PendingEnvelope {
            seq: 7,
            recipient: "WSP-DDDD-EEEE-FFFF".into(),
            message_id: Uuid::nil(),
            kind: EnvelopeKind::Message,
            msg_type: "text".into(),
            sender: "WSP-AAAA-BBBB-CCCC".into(),
            timestamp: 1_700_000_000_000,
            nonce: Some("bm9uY2U=".into()),
            ciphertext: Some("Y3Q=".into()),
            sig: Some("c2ln".into()),
            reply_to: None,
            attachment: None,
            receipt_of: None,
            receipt_status: None,
            queued_at: Utc::now(),
        }
    }

    #[test]
    fn message_row_replays_as_message_received() {
        let frame = message_row().to_frame();
        assert_eq!(frame.kind, kind::MESSAGE_RECEIVED);
        assert_eq!(frame.payload["from"], "WSP-AAAA-BBBB-CCCC");
        assert_eq!(frame.payload["nonce"], "bm9uY2U=");
    }

    #[test]
    fn receipt_row_replays_as_message_delivered() {
        let original = Uuid::new_v4();
        let mut row = message_row();
        row.kind = EnvelopeKind::Receipt;
        row.receipt_of = Some(original);
        row.receipt_status = Some("read".into());
        let frame = row.to_frame();
        assert_eq!(frame.kind, kind::MESSAGE_DELIVERED);
        assert_eq!(frame.payload["messageId"], original.to_string());
        assert_eq!(frame.payload["status"], "read");
    }
}
