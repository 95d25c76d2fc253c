//! Envelope validation pipeline.
//!
//! Every signed inbound frame traverses the same ordered checks, rejecting
//! on first failure: shape (done at parse), versions, session, sender
//! identity, timestamp, recipient shape, canonical signature, rate limit.
//! Each failure path has its own error kind and counter; the pipeline never
//! panics into the connection task.

use std::net::IpAddr;

use whisper_common::crypto;
use whisper_common::error::{RelayError, RelayResult};
use whisper_common::metrics::RelayMetrics;
use whisper_common::models::Identity;
use whisper_common::protocol::{CallFrame, GroupSendMessage, SendMessage};
use whisper_common::ratelimit::EndpointClass;
use whisper_common::whisper_id;
use whisper_db::repository::{groups, identities};
use whisper_db::sessions::SessionRecord;

use crate::GatewayState;

/// Maximum tolerated client clock skew, in milliseconds. A timestamp at
/// exactly the bound passes.
pub const MAX_CLOCK_SKEW_MS: i64 = 600_000;

/// The authenticated principal behind a validated frame.
pub struct SenderContext {
    pub session: SessionRecord,
    pub identity: Identity,
}

/// Versions gate — both must equal 1.
pub fn check_versions(protocol_version: u32, crypto_version: u32) -> RelayResult<()> {
    if protocol_version != whisper_common::protocol::PROTOCOL_VERSION
        || crypto_version != whisper_common::protocol::CRYPTO_VERSION
    {
        return Err(RelayError::invalid(format!(
            "unsupported versions: protocol={protocol_version} crypto={crypto_version}"
        )));
    }
    Ok(())
}

/// Timestamp gate — `|now - ts| ≤ 600 000` ms.
pub fn check_timestamp(now_ms: i64, timestamp: i64) -> RelayResult<()> {
    if (now_ms - timestamp).abs() > MAX_CLOCK_SKEW_MS {
        return Err(RelayError::InvalidTimestamp);
    }
    Ok(())
}

/// Recipient must be a well-formed WhisperID.
pub fn check_recipient(to: &str) -> RelayResult<()> {
    if !whisper_id::is_valid(to) {
        return Err(RelayError::invalid(format!("malformed recipient id: {to}")));
    }
    Ok(())
}

/// Nonce, signature, and ciphertext material checks.
pub fn check_envelope_material(
    nonce: &str,
    ciphertext: &str,
    sig: &str,
    max_ciphertext_bytes: u64,
) -> RelayResult<()> {
    crypto::decode_exact(nonce, crypto::NONCE_LEN, "nonce")
        .map_err(|e| RelayError::invalid(e.to_string()))?;
    crypto::decode_exact(sig, crypto::SIGNATURE_LEN, "sig")
        .map_err(|e| RelayError::invalid(e.to_string()))?;
    let ct = crypto::from_base64(ciphertext)
        .ok_or_else(|| RelayError::invalid("ciphertext is not valid base64"))?;
    if ct.is_empty() {
        return Err(RelayError::invalid("ciphertext is empty"));
    }
    if ct.len() as u64 > max_ciphertext_bytes {
        return Err(RelayError::invalid(format!(
            "ciphertext exceeds {max_ciphertext_bytes} bytes"
        )));
    }
    Ok(())
}

/// Resolve a session token to an active identity.
///
/// A session for a now-banned identity behaves as invalid — except that the
/// caller is told `USER_BANNED` so the connection can be force-closed.
pub async fn authenticate(state: &GatewayState, token: &str) -> RelayResult<SenderContext> {
    let Some(session) = state.sessions.resolve(token).await? else {
        RelayMetrics::incr(&state.metrics.auth_failures);
        return Err(RelayError::AuthFailed);
    };
    let Some(identity) = identities::find(&state.db.pg, &session.whisper_id).await? else {
        return Err(RelayError::NotRegistered);
    };
    if identity.is_banned() {
        RelayMetrics::incr(&state.metrics.banned_rejections);
        return Err(RelayError::UserBanned);
    }
    Ok(SenderContext { session, identity })
}

/// Full pipeline for a `send_message` frame.
pub async fn validate_send_message(
    state: &GatewayState,
    ip: IpAddr,
    msg: &SendMessage,
) -> RelayResult<SenderContext> {
    check_versions(msg.protocol_version, msg.crypto_version)?;

    let ctx = authenticate(state, &msg.session_token).await?;
    if msg.from != ctx.session.whisper_id {
        return Err(RelayError::Forbidden);
    }

    check_timestamp(whisper_common::now_ms(), msg.timestamp)?;
    check_recipient(&msg.to)?;
    check_envelope_material(
        &msg.nonce,
        &msg.ciphertext,
        &msg.sig,
        state.limits.max_ciphertext_bytes,
    )?;

    let canonical = crypto::canonical_signing_bytes(
        msg.msg_type.as_str(),
        &msg.message_id.to_string(),
        &msg.from,
        &msg.to,
        msg.timestamp,
        &msg.nonce,
        &msg.ciphertext,
    );
    crypto::verify_signed_digest(&ctx.identity.sign_public_key, &msg.sig, &canonical)
        .map_err(|_| RelayError::AuthFailed)?;

    rate_limit(state, ip, Some(&ctx.session.whisper_id), EndpointClass::Message)?;
    Ok(ctx)
}

/// Pipeline for a `group_send_message` frame. Returns the sender context
/// and the group's active member list for fanout.
pub async fn validate_group_send(
    state: &GatewayState,
    ip: IpAddr,
    msg: &GroupSendMessage,
) -> RelayResult<(SenderContext, Vec<String>)> {
    check_versions(msg.protocol_version, msg.crypto_version)?;

    let ctx = authenticate(state, &msg.session_token).await?;
    if msg.from != ctx.session.whisper_id {
        return Err(RelayError::Forbidden);
    }

    check_timestamp(whisper_common::now_ms(), msg.timestamp)?;

    if groups::find(&state.db.pg, msg.group_id).await?.is_none() {
        return Err(RelayError::invalid("unknown group"));
    }
    if !groups::is_active_member(&state.db.pg, msg.group_id, &msg.from).await? {
        return Err(RelayError::Forbidden);
    }
    let members = groups::list_active_members(&state.db.pg, msg.group_id).await?;

    if msg.entries.is_empty() {
        return Err(RelayError::invalid("group fanout has no entries"));
    }
    for entry in &msg.entries {
        check_recipient(&entry.to)?;
        if !members.contains(&entry.to) {
            return Err(RelayError::invalid(format!(
                "fanout entry for non-member {}",
                entry.to
            )));
        }
        check_envelope_material(
            &entry.nonce,
            &entry.ciphertext,
            &entry.sig,
            state.limits.max_ciphertext_bytes,
        )?;
        let canonical = crypto::canonical_signing_bytes(
            msg.msg_type.as_str(),
            &msg.message_id.to_string(),
            &msg.from,
            &entry.to,
            msg.timestamp,
            &entry.nonce,
            &entry.ciphertext,
        );
        crypto::verify_signed_digest(&ctx.identity.sign_public_key, &entry.sig, &canonical)
            .map_err(|_| RelayError::AuthFailed)?;
    }

    rate_limit(state, ip, Some(&ctx.session.whisper_id), EndpointClass::Message)?;
    Ok((ctx, members))
}

/// Pipeline for a signed call-signaling frame. `frame_kind` is the wire
/// type (`call_initiate`, `call_answer`, …) and doubles as the canonical
/// message type.
pub async fn validate_call_frame(
    state: &GatewayState,
    ip: IpAddr,
    frame_kind: &str,
    frame: &CallFrame,
) -> RelayResult<SenderContext> {
    check_versions(frame.protocol_version, frame.crypto_version)?;

    let ctx = authenticate(state, &frame.session_token).await?;
    if frame.from != ctx.session.whisper_id {
        return Err(RelayError::Forbidden);
    }

    check_timestamp(whisper_common::now_ms(), frame.timestamp)?;
    check_recipient(&frame.to)?;
    check_envelope_material(
        &frame.nonce,
        &frame.ciphertext,
        &frame.sig,
        state.limits.max_ciphertext_bytes,
    )?;

    let canonical = crypto::canonical_signing_bytes(
        frame_kind,
        &frame.message_id.to_string(),
        &frame.from,
        &frame.to,
        frame.timestamp,
        &frame.nonce,
        &frame.ciphertext,
    );
    crypto::verify_signed_digest(&ctx.identity.sign_public_key, &frame.sig, &canonical)
        .map_err(|_| RelayError::AuthFailed)?;

    rate_limit(state, ip, Some(&ctx.session.whisper_id), EndpointClass::Call)?;
    Ok(ctx)
}

fn rate_limit(
    state: &GatewayState,
    ip: IpAddr,
    whisper_id: Option<&str>,
    class: EndpointClass,
) -> RelayResult<()> {
    state.limiter.check(ip, whisper_id, class).map_err(|retry_after_ms| {
        RelayMetrics::incr(&state.metrics.rate_limited);
        RelayError::RateLimited { retry_after_ms }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};
    use uuid::Uuid;
    use whisper_common::crypto::{canonical_signing_bytes, sha256, to_base64};

    #[test]
    fn version_gate() {
        assert!(check_versions(1, 1).is_ok());
        assert!(check_versions(2, 1).is_err());
        assert!(check_versions(1, 0).is_err());
    }

    #[test]
    fn timestamp_boundary_is_inclusive() {
        let now = 1_700_000_000_000;
        assert!(check_timestamp(now, now).is_ok());
        assert!(check_timestamp(now, now - MAX_CLOCK_SKEW_MS).is_ok());
        assert!(check_timestamp(now, now + MAX_CLOCK_SKEW_MS).is_ok());
        assert!(matches!(
            check_timestamp(now, now - MAX_CLOCK_SKEW_MS - 1),
            Err(RelayError::InvalidTimestamp)
        ));
        assert!(matches!(
            check_timestamp(now, now + MAX_CLOCK_SKEW_MS + 1),
            Err(RelayError::InvalidTimestamp)
        ));
    }

    #[test]
    fn recipient_shape_gate() {
        assert!(check_recipient("WSP-ABCD-EFGH-2345").is_ok());
        assert!(check_recipient("WSP-abcd-EFGH-2345").is_err());
        assert!(check_recipient("not-an-id").is_err());
    }

    #[test]
    fn envelope_material_gate() {
        let nonce = to_base64(&[0u8; 24]);
        let sig = to_base64(&[0u8; 64]);
        let ct = to_base64(b"ciphertext");

        assert!(check_envelope_material(&nonce, &ct, &sig, 65_536).is_ok());
        // wrong nonce length
        assert!(check_envelope_material(&to_base64(&[0u8; 12]), &ct, &sig, 65_536).is_err());
        // wrong sig length
        assert!(check_envelope_material(&nonce, &ct, &to_base64(&[0u8; 32]), 65_536).is_err());
        // empty ciphertext
        assert!(check_envelope_material(&nonce, "", &sig, 65_536).is_err());
        // oversized ciphertext
        assert!(check_envelope_material(&nonce, &to_base64(&[0u8; 32]), &sig, 16).is_err());
    }

    #[test]
    fn canonical_signature_accepts_only_the_signed_fields() {
        let key = SigningKey::generate(&mut rand_core::OsRng);
        let pubkey = to_base64(key.verifying_key().as_bytes());
        let message_id = Uuid::new_v4();

        let canonical = canonical_signing_bytes(
            "text",
            &message_id.to_string(),
            "WSP-AAAA-BBBB-CCCC",
            "WSP-DDDD-EEEE-FFFF",
            1_700_000_000_000,
            "bm9uY2U=",
            "Y3Q=",
        );
        let sig = to_base64(&key.sign(&sha256(&canonical)).to_bytes());

        assert!(
            whisper_common::crypto::verify_signed_digest(&pubkey, &sig, &canonical).is_ok()
        );

        // Same signature over a different recipient must fail.
        let other = canonical_signing_bytes(
            "text",
            &message_id.to_string(),
            "WSP-AAAA-BBBB-CCCC",
            "WSP-DDDD-EEEE-2222",
            1_700_000_000_000,
            "bm9uY2U=",
            "Y3Q=",
        );
        assert!(whisper_common::crypto::verify_signed_digest(&pubkey, &sig, &other).is_err());
    }
}
