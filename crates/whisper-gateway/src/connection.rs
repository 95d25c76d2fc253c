//! Per-connection lifecycle: the auth state machine and frame dispatch.
//!
//! One task owns each socket. Inbound frames are handled sequentially —
//! this serialization is what makes per-recipient ordering hold between
//! the live path and the drain path. Outbound frames go through a bounded
//! mpsc queue drained by a writer task; the drain loop `send().await`s
//! into that queue, so a slow client pauses its own replay instead of
//! growing memory.
//!
//! State machine:
//! `Connected → Challenged → Verifying → Authenticated → Closed`
//! (`session_resume` jumps straight to Authenticated.)

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use rand::RngCore;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use uuid::Uuid;

use whisper_common::error::{RelayError, RelayResult};
use whisper_common::metrics::RelayMetrics;
use whisper_common::protocol::{self, Frame, kind};
use whisper_common::{crypto, now_ms, whisper_id};
use whisper_db::repository::{devices, groups, identities, pending};

use crate::registry::{Outbound, SessionHandle};
use crate::{GatewayState, dispatcher, validator};

/// Server pings after this much inbound silence.
const PING_AFTER: Duration = Duration::from_secs(30);
/// Socket closes after this much inbound silence.
const DEAD_AFTER: Duration = Duration::from_secs(60);

struct AuthedSession {
    whisper_id: String,
    device_id: Uuid,
    session_token: String,
}

struct PendingChallenge {
    challenge_id: Uuid,
    bytes: [u8; 32],
    issued: Instant,
    begin: protocol::RegisterBegin,
}

enum Next {
    Continue,
    Close,
}

struct Conn {
    state: Arc<GatewayState>,
    ip: IpAddr,
    tx: mpsc::Sender<Outbound>,
    authed: Option<AuthedSession>,
    challenge: Option<PendingChallenge>,
}

/// Run one connection to completion.
pub async fn run(socket: WebSocket, ip: IpAddr, state: Arc<GatewayState>) {
    let (ws_tx, mut ws_rx) = socket.split();
    let (tx, rx) = mpsc::channel::<Outbound>(state.limits.send_queue_capacity as usize);

    RelayMetrics::incr(&state.metrics.connections_opened);
    let writer = tokio::spawn(writer_task(ws_tx, rx, state.metrics.clone()));

    let mut conn = Conn { state: state.clone(), ip, tx, authed: None, challenge: None };
    let handshake_deadline =
        Instant::now() + Duration::from_secs(state.auth.handshake_timeout_secs);
    let mut last_inbound = Instant::now();
    let mut last_ping: Option<Instant> = None;
    let mut tick = tokio::time::interval(Duration::from_secs(5));
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            inbound = ws_rx.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        last_inbound = Instant::now();
                        last_ping = None;
                        RelayMetrics::incr(&state.metrics.frames_in);
                        match conn.handle_text(&text).await {
                            Next::Continue => {}
                            Next::Close => break,
                        }
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                        last_inbound = Instant::now();
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // binary frames are not part of the protocol
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "socket read failed");
                        break;
                    }
                }
            }
            _ = tick.tick() => {
                let now = Instant::now();
                if conn.authed.is_none() && now >= handshake_deadline {
                    tracing::debug!("auth handshake deadline exceeded");
                    break;
                }
                let silence = now.saturating_duration_since(last_inbound);
                if silence >= DEAD_AFTER {
                    tracing::debug!("keepalive timeout, closing socket");
                    break;
                }
                if conn.authed.is_some()
                    && silence >= PING_AFTER
                    && last_ping.is_none_or(|t| now.saturating_duration_since(t) >= PING_AFTER)
                {
                    let ping = Frame {
                        kind: kind::PING.into(),
                        request_id: None,
                        payload: serde_json::json!({ "serverTime": now_ms() }),
                    };
                    if conn.tx.send(Outbound::Frame(ping)).await.is_err() {
                        break;
                    }
                    last_ping = Some(now);
                }
            }
        }
    }

    // Cleanup — unregister and let the writer flush with a deadline.
    if let Some(authed) = &conn.authed {
        state.registry.remove(&authed.whisper_id, authed.device_id).await;
        tracing::info!(whisper_id = %authed.whisper_id, "client disconnected");
    }
    RelayMetrics::incr(&state.metrics.connections_closed);
    drop(conn);
    let _ = tokio::time::timeout(Duration::from_secs(5), writer).await;
}

async fn writer_task(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Outbound>,
    metrics: Arc<RelayMetrics>,
) {
    while let Some(out) = rx.recv().await {
        match out {
            Outbound::Frame(frame) => {
                let Ok(text) = serde_json::to_string(&frame) else { continue };
                if ws_tx.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
                RelayMetrics::incr(&metrics.frames_out);
            }
            Outbound::Close(body) => {
                if let Some(body) = body {
                    let frame = Frame {
                        kind: kind::ERROR.into(),
                        request_id: None,
                        payload: serde_json::to_value(&body).unwrap_or_default(),
                    };
                    if let Ok(text) = serde_json::to_string(&frame) {
                        let _ = ws_tx.send(Message::Text(text.into())).await;
                    }
                }
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }
        }
    }
    let _ = ws_tx.close().await;
}

impl Conn {
    async fn handle_text(&mut self, text: &str) -> Next {
        let frame: Frame = match serde_json::from_str(text) {
            Ok(f) => f,
            Err(e) => {
                let err = RelayError::invalid(format!("malformed frame: {e}"));
                return self.fail(err, None).await;
            }
        };
        let request_id = frame.request_id;

        let result = match frame.kind.as_str() {
            kind::PING => self.on_ping(request_id).await,
            _ if self.authed.is_none() => match frame.kind.as_str() {
                kind::REGISTER_BEGIN => self.on_register_begin(&frame).await,
                kind::REGISTER_PROOF => self.on_register_proof(&frame).await,
                kind::SESSION_RESUME => self.on_session_resume(&frame).await,
                other => {
                    tracing::debug!(kind = other, "frame before authentication");
                    Err(RelayError::AuthFailed)
                }
            },
            kind::PONG => Ok(()),
            kind::SEND_MESSAGE => self.on_send_message(&frame).await,
            kind::DELIVERY_RECEIPT => self.on_delivery_receipt(&frame).await,
            kind::FETCH_PENDING => self.on_fetch_pending(&frame).await,
            kind::GROUP_SEND_MESSAGE => self.on_group_send(&frame).await,
            kind::GROUP_CREATE => self.on_group_create(&frame).await,
            kind::GROUP_UPDATE => self.on_group_update(&frame).await,
            kind::CALL_INITIATE | kind::CALL_ANSWER | kind::CALL_ICE_CANDIDATE
            | kind::CALL_END => self.on_call_frame(&frame).await,
            kind::SESSION_REFRESH => self.on_session_refresh(&frame).await,
            kind::UPDATE_TOKENS => self.on_update_tokens(&frame).await,
            kind::PRESENCE_UPDATE => self.on_presence_update(&frame).await,
            kind::TYPING => self.on_typing(&frame).await,
            kind::LOGOUT => return self.on_logout().await,
            other => Err(RelayError::invalid(format!("unknown frame type: {other}"))),
        };

        match result {
            Ok(()) => Next::Continue,
            Err(err) => self.fail(err, request_id).await,
        }
    }

    /// Turn a handler error into an `error` frame — or a forced close for
    /// fatal conditions (ban, session revoked elsewhere).
    async fn fail(&mut self, err: RelayError, request_id: Option<Uuid>) -> Next {
        match &err {
            RelayError::InvalidPayload { .. } | RelayError::InvalidTimestamp => {
                RelayMetrics::incr(&self.state.metrics.validation_failures);
            }
            RelayError::Database(_) | RelayError::Redis(_) | RelayError::Internal(_) => {
                RelayMetrics::incr(&self.state.metrics.internal_errors);
            }
            _ => {}
        }

        if matches!(err, RelayError::UserBanned) {
            if let Some(authed) = &self.authed {
                let whisper_id = authed.whisper_id.clone();
                if let Err(e) = self.state.sessions.revoke_all_for(&whisper_id).await {
                    tracing::error!(error = %e, "failed to revoke sessions of banned identity");
                }
                self.state
                    .registry
                    .close_all(&whisper_id, Some(protocol::ErrorBody::from(&err)))
                    .await;
            }
            let _ = self
                .tx
                .send(Outbound::Close(Some(protocol::ErrorBody::from(&err))))
                .await;
            return Next::Close;
        }

        // AUTH_FAILED on an authenticated socket is fatal only when the
        // session itself is gone (revoked elsewhere); a bad signature or a
        // failed handshake attempt keeps the connection alive.
        if matches!(err, RelayError::AuthFailed) {
            if let Some(authed) = &self.authed {
                let still_valid = self
                    .state
                    .sessions
                    .resolve(&authed.session_token)
                    .await
                    .ok()
                    .flatten()
                    .is_some();
                if !still_valid {
                    let _ = self
                        .tx
                        .send(Outbound::Close(Some(protocol::ErrorBody::from(&err))))
                        .await;
                    return Next::Close;
                }
            }
        }

        let _ = self.tx.send(Outbound::Frame(Frame::error(&err, request_id))).await;
        Next::Continue
    }

    fn authed(&self) -> RelayResult<&AuthedSession> {
        self.authed.as_ref().ok_or(RelayError::AuthFailed)
    }

    /// Re-check session and ban status for unsigned frames. Signed frames
    /// get the same check inside the validator pipeline.
    async fn ensure_active(&self) -> RelayResult<validator::SenderContext> {
        let authed = self.authed()?;
        validator::authenticate(&self.state, &authed.session_token).await
    }

    async fn reply(&self, frame: Frame) -> RelayResult<()> {
        self.tx
            .send(Outbound::Frame(frame))
            .await
            .map_err(|_| RelayError::Internal(anyhow::anyhow!("connection closed")))
    }

    // ─── Handshake ───────────────────────────────────────────────────────

    async fn on_register_begin(&mut self, frame: &Frame) -> RelayResult<()> {
        self.state
            .limiter
            .check(self.ip, None, whisper_common::ratelimit::EndpointClass::Register)
            .map_err(|retry_after_ms| {
                RelayMetrics::incr(&self.state.metrics.rate_limited);
                RelayError::RateLimited { retry_after_ms }
            })?;

        let begin: protocol::RegisterBegin = frame.parse()?;
        validator::check_versions(begin.protocol_version, begin.crypto_version)?;

        if !whisper_id::is_valid(&begin.whisper_id) {
            return Err(RelayError::invalid("malformed whisper id"));
        }
        crypto::validate_public_key(&begin.enc_public_key, "encPublicKey")
            .map_err(|e| RelayError::invalid(e.to_string()))?;
        crypto::validate_public_key(&begin.sign_public_key, "signPublicKey")
            .map_err(|e| RelayError::invalid(e.to_string()))?;

        // The ID is a pure function of the signing key; reject mismatches
        // before issuing a challenge.
        match whisper_id::derive_from_base64(&begin.sign_public_key) {
            Some(expected) if expected == begin.whisper_id => {}
            _ => return Err(RelayError::invalid("whisper id does not match signing key")),
        }

        let mut bytes = [0u8; crypto::CHALLENGE_LEN];
        rand::rng().fill_bytes(&mut bytes);
        let challenge_id = Uuid::new_v4();
        self.challenge = Some(PendingChallenge {
            challenge_id,
            bytes,
            issued: Instant::now(),
            begin,
        });

        let payload = protocol::RegisterChallenge {
            challenge_id,
            challenge: crypto::to_base64(&bytes),
        };
        self.reply(Frame::new(kind::REGISTER_CHALLENGE, &payload).with_request_id(frame.request_id))
            .await
    }

    async fn on_register_proof(&mut self, frame: &Frame) -> RelayResult<()> {
        let proof: protocol::RegisterProof = frame.parse()?;
        // Challenges are single-use: taken here, gone on any failure.
        let pending_challenge = self.challenge.take().ok_or(RelayError::AuthFailed)?;

        if proof.challenge_id != pending_challenge.challenge_id {
            return Err(RelayError::AuthFailed);
        }
        if pending_challenge.issued.elapsed()
            > Duration::from_secs(self.state.auth.challenge_ttl_secs)
        {
            return Err(RelayError::AuthFailed);
        }

        let begin = &pending_challenge.begin;
        crypto::verify_signed_digest(
            &begin.sign_public_key,
            &proof.signature,
            &pending_challenge.bytes,
        )
        .map_err(|_| {
            RelayMetrics::incr(&self.state.metrics.auth_failures);
            RelayError::AuthFailed
        })?;

        let identity = identities::create_or_verify(
            &self.state.db.pg,
            &begin.whisper_id,
            &begin.enc_public_key,
            &begin.sign_public_key,
        )
        .await?;
        if identity.is_banned() {
            return Err(RelayError::UserBanned);
        }

        let is_new_device = devices::bind_device(
            &self.state.db.pg,
            &begin.whisper_id,
            begin.device_id,
            &begin.platform,
            begin.push_token.as_deref(),
            begin.voip_token.as_deref(),
        )
        .await?;

        if is_new_device {
            // Single-active-device: a new binding kills every prior session
            // and socket of this identity.
            self.state.sessions.revoke_all_for(&begin.whisper_id).await?;
            let err = RelayError::AuthFailed;
            self.state
                .registry
                .close_all(&begin.whisper_id, Some(protocol::ErrorBody::from(&err)))
                .await;
        }

        let ttl = Duration::from_secs(self.state.auth.session_ttl_secs);
        let (token, record) =
            self.state.sessions.issue(&begin.whisper_id, begin.device_id, ttl).await?;

        let ack = protocol::RegisterAck {
            success: true,
            whisper_id: begin.whisper_id.clone(),
            session_token: token.clone(),
            server_time: now_ms(),
            expires_at: record.expires_at.timestamp_millis(),
        };
        self.reply(Frame::new(kind::REGISTER_ACK, &ack).with_request_id(frame.request_id))
            .await?;

        self.become_authenticated(begin.whisper_id.clone(), begin.device_id, token).await;
        RelayMetrics::incr(&self.state.metrics.registrations);
        tracing::info!(whisper_id = %begin.whisper_id, new_device = is_new_device, "registered");
        Ok(())
    }

    async fn on_session_resume(&mut self, frame: &Frame) -> RelayResult<()> {
        let resume: protocol::SessionResume = frame.parse()?;
        let ctx = validator::authenticate(&self.state, &resume.session_token).await?;

        let ack = protocol::RegisterAck {
            success: true,
            whisper_id: ctx.session.whisper_id.clone(),
            session_token: resume.session_token.clone(),
            server_time: now_ms(),
            expires_at: ctx.session.expires_at.timestamp_millis(),
        };
        self.reply(Frame::new(kind::REGISTER_ACK, &ack).with_request_id(frame.request_id))
            .await?;

        self.become_authenticated(
            ctx.session.whisper_id.clone(),
            ctx.session.device_id,
            resume.session_token,
        )
        .await;
        RelayMetrics::incr(&self.state.metrics.resumes);
        tracing::info!(whisper_id = %ctx.session.whisper_id, "session resumed");
        Ok(())
    }

    async fn become_authenticated(&mut self, whisper_id: String, device_id: Uuid, token: String) {
        self.state
            .registry
            .register(&whisper_id, SessionHandle { device_id, tx: self.tx.clone() })
            .await;
        self.authed =
            Some(AuthedSession { whisper_id: whisper_id.clone(), device_id, session_token: token });

        // One automatic drain cycle: replay everything queued while the
        // client was offline, oldest first, before new traffic interleaves.
        if let Err(e) = self.drain_pending(&whisper_id).await {
            tracing::error!(whisper_id = %whisper_id, error = %e, "pending drain failed");
        }
    }

    async fn drain_pending(&self, whisper_id: &str) -> RelayResult<()> {
        let mut cursor = None;
        loop {
            let (rows, next_cursor) = pending::fetch_page(
                &self.state.db.pg,
                whisper_id,
                cursor,
                self.state.limits.fetch_page_size,
            )
            .await?;
            for row in &rows {
                // Blocking send: a full queue pauses the drain rather than
                // dropping envelopes.
                if self.tx.send(Outbound::Frame(row.to_frame())).await.is_err() {
                    return Ok(());
                }
                RelayMetrics::incr(&self.state.metrics.pending_replayed);
            }
            match next_cursor {
                Some(c) => cursor = Some(c),
                None => break,
            }
        }
        Ok(())
    }

    // ─── Authenticated frames ────────────────────────────────────────────

    async fn on_ping(&self, request_id: Option<Uuid>) -> RelayResult<()> {
        self.reply(
            Frame::new(kind::PONG, &protocol::Pong { server_time: now_ms() })
                .with_request_id(request_id),
        )
        .await
    }

    async fn on_send_message(&self, frame: &Frame) -> RelayResult<()> {
        let msg: protocol::SendMessage = frame.parse()?;
        validator::validate_send_message(&self.state, self.ip, &msg).await?;
        let accepted = dispatcher::accept_message(&self.state, &msg).await?;
        self.reply(Frame::new(kind::MESSAGE_ACCEPTED, &accepted).with_request_id(frame.request_id))
            .await
    }

    async fn on_delivery_receipt(&self, frame: &Frame) -> RelayResult<()> {
        let ctx = self.ensure_active().await?;
        let receipt: protocol::DeliveryReceipt = frame.parse()?;
        validator::check_recipient(&receipt.to)?;
        dispatcher::handle_receipt(&self.state, &ctx.session.whisper_id, &receipt).await
    }

    async fn on_fetch_pending(&self, frame: &Frame) -> RelayResult<()> {
        let ctx = self.ensure_active().await?;
        let fetch: protocol::FetchPending = frame.parse()?;

        let cursor = pending::parse_cursor(fetch.cursor.as_deref());
        let limit = pending::clamp_limit(fetch.limit, self.state.limits.fetch_page_size);
        let (rows, next_cursor) =
            pending::fetch_page(&self.state.db.pg, &ctx.session.whisper_id, cursor, limit).await?;

        let page = protocol::PendingMessages {
            envelopes: rows.iter().map(|r| r.to_frame()).collect(),
            next_cursor: next_cursor.map(pending::encode_cursor),
        };
        self.reply(Frame::new(kind::PENDING_MESSAGES, &page).with_request_id(frame.request_id))
            .await
    }

    async fn on_group_send(&self, frame: &Frame) -> RelayResult<()> {
        let msg: protocol::GroupSendMessage = frame.parse()?;
        let (_ctx, members) = validator::validate_group_send(&self.state, self.ip, &msg).await?;
        let accepted = dispatcher::accept_group_message(&self.state, &msg, &members).await?;
        self.reply(Frame::new(kind::MESSAGE_ACCEPTED, &accepted).with_request_id(frame.request_id))
            .await
    }

    async fn on_group_create(&self, frame: &Frame) -> RelayResult<()> {
        let ctx = self.ensure_active().await?;
        let req: protocol::GroupCreate = frame.parse()?;

        if req.name.trim().is_empty() || req.name.len() > 128 {
            return Err(RelayError::invalid("group name must be 1-128 chars"));
        }
        for member in &req.members {
            validator::check_recipient(member)?;
        }

        let group_id = req.group_id.unwrap_or_else(Uuid::new_v4);
        let owner = &ctx.session.whisper_id;
        groups::create_group(&self.state.db.pg, group_id, &req.name, owner, &req.members).await?;
        let members = groups::list_active_members(&self.state.db.pg, group_id).await?;

        let info = protocol::GroupInfo {
            group_id,
            name: req.name.clone(),
            owner: owner.clone(),
            members: members.clone(),
        };
        self.reply(Frame::new(kind::GROUP_CREATE, &info).with_request_id(frame.request_id))
            .await?;
        self.notify_group(&info, owner).await;
        Ok(())
    }

    async fn on_group_update(&self, frame: &Frame) -> RelayResult<()> {
        let ctx = self.ensure_active().await?;
        let req: protocol::GroupUpdate = frame.parse()?;

        let group = groups::find(&self.state.db.pg, req.group_id)
            .await?
            .ok_or_else(|| RelayError::NotFound { resource: "group".into() })?;
        if group.owner != ctx.session.whisper_id {
            return Err(RelayError::Forbidden);
        }
        for member in req.add_members.iter().chain(req.remove_members.iter()) {
            validator::check_recipient(member)?;
        }

        groups::update_group(
            &self.state.db.pg,
            req.group_id,
            req.name.as_deref(),
            &req.add_members,
            &req.remove_members,
        )
        .await?;
        let members = groups::list_active_members(&self.state.db.pg, req.group_id).await?;

        let info = protocol::GroupInfo {
            group_id: req.group_id,
            name: req.name.unwrap_or(group.name),
            owner: group.owner.clone(),
            members: members.clone(),
        };
        self.reply(Frame::new(kind::GROUP_UPDATE, &info).with_request_id(frame.request_id))
            .await?;
        self.notify_group(&info, &ctx.session.whisper_id).await;
        Ok(())
    }

    /// Push group metadata to all live members except the actor.
    async fn notify_group(&self, info: &protocol::GroupInfo, actor: &str) {
        let frame = Frame::new(kind::GROUP_UPDATE, info);
        for member in &info.members {
            if member != actor {
                self.state.registry.try_deliver(member, &frame).await;
            }
        }
    }

    async fn on_call_frame(&self, frame: &Frame) -> RelayResult<()> {
        let call: protocol::CallFrame = frame.parse()?;
        validator::validate_call_frame(&self.state, self.ip, &frame.kind, &call).await?;

        match frame.kind.as_str() {
            kind::CALL_INITIATE => self.state.calls.clone().initiate(&call).await,
            kind::CALL_ANSWER => self.state.calls.answer(&call).await,
            kind::CALL_ICE_CANDIDATE => self.state.calls.ice_candidate(&call).await,
            kind::CALL_END => self.state.calls.end(&call).await,
            _ => unreachable!("routed by kind"),
        }
    }

    async fn on_session_refresh(&mut self, frame: &Frame) -> RelayResult<()> {
        let req: protocol::SessionRefresh = frame.parse()?;
        let ttl = Duration::from_secs(self.state.auth.session_ttl_secs);
        let Some((token, record)) = self.state.sessions.refresh(&req.session_token, ttl).await?
        else {
            return Err(RelayError::AuthFailed);
        };

        if let Some(authed) = &mut self.authed {
            if authed.session_token == req.session_token {
                authed.session_token = token.clone();
            }
        }

        let payload = protocol::SessionRefreshed {
            session_token: token,
            expires_at: record.expires_at.timestamp_millis(),
            server_time: now_ms(),
        };
        self.reply(Frame::new(kind::SESSION_REFRESHED, &payload).with_request_id(frame.request_id))
            .await
    }

    async fn on_update_tokens(&self, frame: &Frame) -> RelayResult<()> {
        let ctx = self.ensure_active().await?;
        let req: protocol::UpdateTokens = frame.parse()?;
        devices::update_tokens(
            &self.state.db.pg,
            &ctx.session.whisper_id,
            ctx.session.device_id,
            req.push_token.as_deref(),
            req.voip_token.as_deref(),
        )
        .await?;
        Ok(())
    }

    async fn on_presence_update(&self, frame: &Frame) -> RelayResult<()> {
        let ctx = self.ensure_active().await?;
        let req: protocol::PresenceUpdate = frame.parse()?;
        self.state.registry.set_presence(&ctx.session.whisper_id, req.status).await;
        Ok(())
    }

    async fn on_typing(&self, frame: &Frame) -> RelayResult<()> {
        let ctx = self.ensure_active().await?;
        let req: protocol::Typing = frame.parse()?;
        validator::check_recipient(&req.to)?;

        // Typing indicators are ephemeral: live-only, never queued.
        let relayed = Frame {
            kind: kind::TYPING.into(),
            request_id: None,
            payload: serde_json::json!({
                "from": ctx.session.whisper_id,
                "typing": req.typing,
            }),
        };
        self.state.registry.try_deliver(&req.to, &relayed).await;
        Ok(())
    }

    async fn on_logout(&mut self) -> Next {
        if let Some(authed) = &self.authed {
            if let Err(e) = self.state.sessions.revoke(&authed.session_token).await {
                tracing::error!(error = %e, "failed to revoke session on logout");
            }
        }
        let _ = self.tx.send(Outbound::Close(None)).await;
        Next::Close
    }
}
