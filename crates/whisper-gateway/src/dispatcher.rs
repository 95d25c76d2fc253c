//! Fanout dispatcher — bridges live sockets with the durable queue.
//!
//! For every validated envelope: persist first, then attempt live delivery.
//! `message_accepted` confirms durable enqueue, never delivery. A
//! successful live write acks the row and routes a `message_delivered`
//! receipt back to the sender through this same dispatcher, so receipts
//! themselves survive a sender going offline.

use whisper_common::error::{RelayError, RelayResult};
use whisper_common::metrics::RelayMetrics;
use whisper_common::models::{EnvelopeKind, NewEnvelope};
use whisper_common::protocol::{
    DeliveryReceipt, GroupSendMessage, MessageAccepted, ReceiptStatus, SendMessage,
};
use whisper_db::repository::{attachments, devices, pending};

use crate::GatewayState;

/// Accept a validated 1:1 envelope: grants, enqueue, live fanout, ack.
pub async fn accept_message(
    state: &GatewayState,
    msg: &SendMessage,
) -> RelayResult<MessageAccepted> {
    if let Some(att) = &msg.attachment {
        link_attachment(state, &msg.from, &att.object_key, &msg.to).await?;
    }

    deliver(state, NewEnvelope::message(msg)).await?;
    RelayMetrics::incr(&state.metrics.messages_accepted);

    Ok(MessageAccepted {
        message_id: msg.message_id,
        status: "sent".into(),
        server_time: whisper_common::now_ms(),
    })
}

/// Accept a validated group envelope. Every active member except the sender
/// must have a fanout entry; one member's failure does not abort the rest.
pub async fn accept_group_message(
    state: &GatewayState,
    msg: &GroupSendMessage,
    members: &[String],
) -> RelayResult<MessageAccepted> {
    let expected: Vec<&String> = members.iter().filter(|m| **m != msg.from).collect();
    for member in &expected {
        if !msg.entries.iter().any(|e| e.to == ***member) {
            return Err(RelayError::invalid(format!("missing fanout entry for {member}")));
        }
    }

    let mut delivered_any = false;
    for entry in &msg.entries {
        if entry.to == msg.from {
            continue;
        }
        let env = NewEnvelope {
            recipient: entry.to.clone(),
            message_id: msg.message_id,
            kind: EnvelopeKind::Message,
            msg_type: msg.msg_type.as_str().to_string(),
            sender: msg.from.clone(),
            timestamp: msg.timestamp,
            nonce: Some(entry.nonce.clone()),
            ciphertext: Some(entry.ciphertext.clone()),
            sig: Some(entry.sig.clone()),
            reply_to: None,
            attachment: None,
            receipt_of: None,
            receipt_status: None,
        };
        match deliver(state, env).await {
            Ok(()) => delivered_any = true,
            Err(e) => {
                tracing::warn!(
                    group_id = %msg.group_id,
                    member = %entry.to,
                    error = %e,
                    "group fanout failed for one member"
                );
            }
        }
    }
    if !delivered_any {
        return Err(RelayError::Internal(anyhow::anyhow!("group fanout failed for all members")));
    }

    RelayMetrics::incr(&state.metrics.messages_accepted);
    Ok(MessageAccepted {
        message_id: msg.message_id,
        status: "sent".into(),
        server_time: whisper_common::now_ms(),
    })
}

/// Route a client `delivery_receipt` back to the original sender. On
/// `delivered`, the acker's queue row is removed first; on `read`, the row
/// is already gone and only the receipt is routed.
pub async fn handle_receipt(
    state: &GatewayState,
    acker: &str,
    receipt: &DeliveryReceipt,
) -> RelayResult<()> {
    if receipt.status == ReceiptStatus::Delivered {
        pending::ack_delivered(&state.db.pg, acker, receipt.message_id).await?;
    }

    let env = NewEnvelope::receipt(
        &receipt.to,
        acker,
        receipt.message_id,
        receipt.status,
        whisper_common::now_ms(),
    );
    deliver(state, env).await?;
    RelayMetrics::incr(&state.metrics.receipts_routed);
    Ok(())
}

/// The core persist-then-deliver step, shared by messages and receipts.
///
/// The enqueue commits before any live write; the caller's ack therefore
/// always means "durable". Live fanout is best-effort `try_send` — a full
/// connection queue leaves the row for the drain path instead of blocking
/// the sender's task.
pub async fn deliver(state: &GatewayState, env: NewEnvelope) -> RelayResult<()> {
    let inserted = pending::enqueue(&state.db.pg, &env).await?;
    if !inserted {
        // Duplicate (recipient, messageId) — client retry; the original row
        // is still queued or already delivered. Nothing more to do.
        tracing::debug!(
            recipient = %env.recipient,
            message_id = %env.message_id,
            "duplicate enqueue ignored"
        );
        return Ok(());
    }
    RelayMetrics::incr(&state.metrics.messages_queued);

    let frame = env.to_frame();
    if state.registry.try_deliver(&env.recipient, &frame).await {
        pending::ack_delivered(&state.db.pg, &env.recipient, env.message_id).await?;
        RelayMetrics::incr(&state.metrics.messages_delivered_live);

        if env.kind == EnvelopeKind::Message {
            let receipt = NewEnvelope::receipt(
                &env.sender,
                &env.recipient,
                env.message_id,
                ReceiptStatus::Delivered,
                whisper_common::now_ms(),
            );
            Box::pin(deliver(state, receipt)).await?;
        }
    } else if env.kind == EnvelopeKind::Message {
        // Recipient offline — nudge the push provider.
        if let Ok(device_list) = devices::list_for(&state.db.pg, &env.recipient).await {
            state.push.notify_message(&env.recipient, &device_list).await;
            RelayMetrics::incr(&state.metrics.push_handoffs);
        }
    }
    Ok(())
}

/// A `send_message` referencing an owned attachment grants the recipient
/// download access for the attachment TTL.
async fn link_attachment(
    state: &GatewayState,
    sender: &str,
    object_key: &str,
    recipient: &str,
) -> RelayResult<()> {
    let Some(_meta) = attachments::find_owned(&state.db.pg, object_key, sender).await? else {
        return Err(RelayError::Forbidden);
    };
    attachments::mark_linked(&state.db.pg, object_key).await?;
    attachments::grant_access(
        &state.db.pg,
        object_key,
        recipient,
        state.limits.attachment_ttl_days,
    )
    .await?;
    Ok(())
}
