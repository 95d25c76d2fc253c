//! Wire protocol — WebSocket frames and typed payloads.
//!
//! Every frame on the gateway socket is `{"type": <string>, "requestId"?:
//! <uuid>, "payload": <object>}`. The payload shape depends on the type;
//! payloads are camelCase on the wire. Signed payloads additionally carry
//! `protocolVersion`, `cryptoVersion`, and `sessionToken`.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use uuid::Uuid;

use crate::error::RelayError;

/// Current protocol version accepted by the relay.
pub const PROTOCOL_VERSION: u32 = 1;
/// Current crypto version accepted by the relay.
pub const CRYPTO_VERSION: u32 = 1;

/// Frame type names.
pub mod kind {
    pub const REGISTER_BEGIN: &str = "register_begin";
    pub const REGISTER_CHALLENGE: &str = "register_challenge";
    pub const REGISTER_PROOF: &str = "register_proof";
    pub const REGISTER_ACK: &str = "register_ack";
    pub const SESSION_RESUME: &str = "session_resume";
    pub const SESSION_REFRESH: &str = "session_refresh";
    pub const SESSION_REFRESHED: &str = "session_refreshed";
    pub const LOGOUT: &str = "logout";
    pub const PING: &str = "ping";
    pub const PONG: &str = "pong";
    pub const SEND_MESSAGE: &str = "send_message";
    pub const MESSAGE_ACCEPTED: &str = "message_accepted";
    pub const MESSAGE_RECEIVED: &str = "message_received";
    pub const DELIVERY_RECEIPT: &str = "delivery_receipt";
    pub const MESSAGE_DELIVERED: &str = "message_delivered";
    pub const FETCH_PENDING: &str = "fetch_pending";
    pub const PENDING_MESSAGES: &str = "pending_messages";
    pub const GROUP_CREATE: &str = "group_create";
    pub const GROUP_UPDATE: &str = "group_update";
    pub const GROUP_SEND_MESSAGE: &str = "group_send_message";
    pub const CALL_INITIATE: &str = "call_initiate";
    pub const CALL_ANSWER: &str = "call_answer";
    pub const CALL_ICE_CANDIDATE: &str = "call_ice_candidate";
    pub const CALL_END: &str = "call_end";
    pub const CALL_RINGING: &str = "call_ringing";
    pub const CALL_INCOMING: &str = "call_incoming";
    pub const CALL_ANSWERED: &str = "call_answered";
    pub const CALL_ENDED: &str = "call_ended";
    pub const UPDATE_TOKENS: &str = "update_tokens";
    pub const PRESENCE_UPDATE: &str = "presence_update";
    pub const TYPING: &str = "typing";
    pub const ERROR: &str = "error";
}

/// The outer envelope of every gateway frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "requestId", default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Uuid>,
    #[serde(default)]
    pub payload: Value,
}

impl Frame {
    /// Build a frame from a serializable payload.
    pub fn new(kind: &str, payload: &impl Serialize) -> Self {
        Self {
            kind: kind.to_string(),
            request_id: None,
            payload: serde_json::to_value(payload).expect("payload serializes"),
        }
    }

    pub fn with_request_id(mut self, request_id: Option<Uuid>) -> Self {
        self.request_id = request_id;
        self
    }

    /// Parse the payload into a typed struct; `INVALID_PAYLOAD` on mismatch.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, RelayError> {
        if !self.payload.is_object() {
            return Err(RelayError::invalid(format!("{} payload must be an object", self.kind)));
        }
        serde_json::from_value(self.payload.clone())
            .map_err(|e| RelayError::invalid(format!("malformed {} payload: {e}", self.kind)))
    }

    /// Build an `error` frame for a failed request, echoing its requestId.
    pub fn error(err: &RelayError, request_id: Option<Uuid>) -> Self {
        let mut body = ErrorBody::from(err);
        body.request_id = request_id;
        Self {
            kind: kind::ERROR.to_string(),
            request_id,
            payload: serde_json::to_value(body).expect("error body serializes"),
        }
    }
}

/// Body of an `error` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Uuid>,
    #[serde(rename = "retryAfter", default, skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

impl From<&RelayError> for ErrorBody {
    fn from(err: &RelayError) -> Self {
        Self {
            code: err.error_code().to_string(),
            message: err.public_message(),
            request_id: None,
            retry_after_ms: err.retry_after_ms(),
        }
    }
}

/// Content class of an envelope. The relay never inspects the ciphertext;
/// the type only informs push handling and client rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MsgType {
    Text,
    Image,
    Voice,
    File,
    System,
}

impl MsgType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Voice => "voice",
            Self::File => "file",
            Self::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "image" => Some(Self::Image),
            "voice" => Some(Self::Voice),
            "file" => Some(Self::File),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

// ─── Registration & session ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterBegin {
    pub protocol_version: u32,
    pub crypto_version: u32,
    pub whisper_id: String,
    pub device_id: Uuid,
    pub platform: String,
    pub sign_public_key: String,
    pub enc_public_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voip_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterChallenge {
    pub challenge_id: Uuid,
    /// Base64 of 32 random bytes. The client signs SHA-256 of the raw bytes.
    pub challenge: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterProof {
    pub challenge_id: Uuid,
    pub signature: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterAck {
    pub success: bool,
    pub whisper_id: String,
    pub session_token: String,
    pub server_time: i64,
    pub expires_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResume {
    pub session_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRefresh {
    pub session_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRefreshed {
    pub session_token: String,
    pub expires_at: i64,
    pub server_time: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pong {
    pub server_time: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTokens {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voip_token: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Away,
    Offline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceUpdate {
    pub status: PresenceStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Typing {
    pub to: String,
    pub typing: bool,
}

// ─── Messaging ───────────────────────────────────────────────────────────────

/// Reference to an encrypted attachment blob riding with an envelope.
/// `fileKeyBox` is the per-recipient wrapped file key; the relay treats it
/// as opaque.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentRef {
    pub object_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    pub file_key_box: String,
}

/// A signed 1:1 message envelope (`send_message`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    pub protocol_version: u32,
    pub crypto_version: u32,
    pub session_token: String,
    pub message_id: Uuid,
    pub msg_type: MsgType,
    pub from: String,
    pub to: String,
    pub timestamp: i64,
    pub nonce: String,
    pub ciphertext: String,
    pub sig: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<AttachmentRef>,
}

/// Acknowledgement of durable enqueue — not of delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageAccepted {
    pub message_id: Uuid,
    pub status: String,
    pub server_time: i64,
}

/// An envelope as relayed to its recipient (`message_received`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageReceived {
    pub message_id: Uuid,
    pub msg_type: MsgType,
    pub from: String,
    pub to: String,
    pub timestamp: i64,
    pub nonce: String,
    pub ciphertext: String,
    pub sig: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<AttachmentRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptStatus {
    Delivered,
    Read,
}

impl ReceiptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::Read => "read",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "delivered" => Some(Self::Delivered),
            "read" => Some(Self::Read),
            _ => None,
        }
    }
}

/// Recipient → relay: confirm receipt of a message (`delivery_receipt`).
/// `to` is the original sender the receipt is routed back to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryReceipt {
    pub message_id: Uuid,
    pub to: String,
    pub status: ReceiptStatus,
}

/// Relay → original sender: a recipient confirmed receipt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDelivered {
    pub message_id: Uuid,
    pub status: ReceiptStatus,
    pub from: String,
    pub server_time: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchPending {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

/// One page of queued frames. Each entry is a complete frame
/// (`message_received` or `message_delivered`) in insertion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingMessages {
    pub envelopes: Vec<Frame>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

// ─── Groups ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupCreate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<Uuid>,
    pub name: String,
    pub members: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupUpdate {
    pub group_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub add_members: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remove_members: Vec<String>,
}

/// Server → client: group metadata after create/update.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupInfo {
    pub group_id: Uuid,
    pub name: String,
    pub owner: String,
    pub members: Vec<String>,
}

/// Per-recipient entry of a group fanout. Each member gets its own
/// `(nonce, ciphertext, sig)` because each decrypts with its own key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupEntry {
    pub to: String,
    pub nonce: String,
    pub ciphertext: String,
    pub sig: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSendMessage {
    pub protocol_version: u32,
    pub crypto_version: u32,
    pub session_token: String,
    pub message_id: Uuid,
    pub msg_type: MsgType,
    pub from: String,
    pub group_id: Uuid,
    pub timestamp: i64,
    pub entries: Vec<GroupEntry>,
}

// ─── Call signaling ──────────────────────────────────────────────────────────

/// A signed call-signaling frame (`call_initiate` / `call_answer` /
/// `call_ice_candidate` / `call_end`). The ciphertext holds the encrypted
/// SDP or ICE blob; the canonical `to` is the callee's WhisperID.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFrame {
    pub protocol_version: u32,
    pub crypto_version: u32,
    pub session_token: String,
    pub call_id: Uuid,
    pub message_id: Uuid,
    pub from: String,
    pub to: String,
    pub timestamp: i64,
    pub nonce: String,
    pub ciphertext: String,
    pub sig: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// A call frame as routed to the peer (`call_incoming`, `call_answered`,
/// `call_ice_candidate`, `call_ended`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallEvent {
    pub call_id: Uuid,
    pub message_id: Uuid,
    pub from: String,
    pub to: String,
    pub timestamp: i64,
    pub nonce: String,
    pub ciphertext: String,
    pub sig: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl CallEvent {
    pub fn from_frame(f: &CallFrame) -> Self {
        Self {
            call_id: f.call_id,
            message_id: f.message_id,
            from: f.from.clone(),
            to: f.to.clone(),
            timestamp: f.timestamp,
            nonce: f.nonce.clone(),
            ciphertext: f.ciphertext.clone(),
            sig: f.sig.clone(),
            reason: f.reason.clone(),
        }
    }
}

/// Server → caller: the callee's gateway has observed the offer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRinging {
    pub call_id: Uuid,
    pub server_time: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_wire_shape() {
        let ack = MessageAccepted {
            message_id: Uuid::nil(),
            status: "sent".into(),
            server_time: 1_700_000_000_000,
        };
        let frame = Frame::new(kind::MESSAGE_ACCEPTED, &ack).with_request_id(Some(Uuid::nil()));
        let json = serde_json::to_value(&frame).unwrap();

        assert_eq!(json["type"], "message_accepted");
        assert_eq!(json["requestId"], Uuid::nil().to_string());
        assert_eq!(json["payload"]["messageId"], Uuid::nil().to_string());
        assert_eq!(json["payload"]["status"], "sent");
        assert_eq!(json["payload"]["serverTime"], 1_700_000_000_000i64);
    }

    #[test]
    fn request_id_is_omitted_when_absent() {
        let frame = Frame::new(kind::PONG, &Pong { server_time: 1 });
        let json = serde_json::to_string(&frame).unwrap();
        assert!(!json.contains("requestId"));
    }

    #[test]
    fn send_message_parses_from_camel_case() {
        let raw = serde_json::json!({
            "type": "send_message",
            "payload": {
                "protocolVersion": 1,
                "cryptoVersion": 1,
                "sessionToken": "tok",
                "messageId": "7f000000-0000-0000-0000-000000000001",
                "msgType": "text",
                "from": "WSP-AAAA-BBBB-CCCC",
                "to": "WSP-DDDD-EEEE-FFFF",
                "timestamp": 1700000000000i64,
                "nonce": "bm9uY2U=",
                "ciphertext": "Y3Q=",
                "sig": "c2ln"
            }
        });
        let frame: Frame = serde_json::from_value(raw).unwrap();
        let msg: SendMessage = frame.parse().unwrap();
        assert_eq!(msg.msg_type, MsgType::Text);
        assert_eq!(msg.from, "WSP-AAAA-BBBB-CCCC");
        assert!(msg.attachment.is_none());
    }

    #[test]
    fn non_object_payload_is_rejected() {
        let frame = Frame {
            kind: kind::SEND_MESSAGE.into(),
            request_id: None,
            payload: Value::String("nope".into()),
        };
        assert!(frame.parse::<SendMessage>().is_err());
    }

    #[test]
    fn error_frame_carries_code_and_retry() {
        let err = RelayError::RateLimited { retry_after_ms: 1500 };
        let frame = Frame::error(&err, Some(Uuid::nil()));
        assert_eq!(frame.kind, kind::ERROR);
        assert_eq!(frame.payload["code"], "RATE_LIMITED");
        assert_eq!(frame.payload["retryAfter"], 1500);
    }

    #[test]
    fn receipt_status_round_trips() {
        assert_eq!(ReceiptStatus::parse("delivered"), Some(ReceiptStatus::Delivered));
        assert_eq!(ReceiptStatus::parse("read"), Some(ReceiptStatus::Read));
        assert_eq!(ReceiptStatus::parse("seen"), None);
        assert_eq!(
            serde_json::to_value(ReceiptStatus::Delivered).unwrap(),
            Value::String("delivered".into())
        );
    }
}
