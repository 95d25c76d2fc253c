//! Call signaling router.
//!
//! The relay routes encrypted SDP/ICE blobs between caller and callee and
//! tracks one tagged state per call:
//!
//! `Ringing ──answer──► Connected ──end──► Ended{reason}`
//!
//! A ring timeout (60 s without an answer) ends the call with
//! `reason = "timeout"`. Timers are cancelled by any terminal transition.
//! If the callee has no live session at `call_initiate`, the offer is
//! handed to the push provider and the timer still runs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use uuid::Uuid;

use whisper_common::error::{RelayError, RelayResult};
use whisper_common::metrics::RelayMetrics;
use whisper_common::protocol::{CallEvent, CallFrame, CallRinging, Frame, kind};
use whisper_db::Database;
use whisper_db::repository::devices;

use crate::push::PushSender;
use crate::registry::LiveRegistry;

/// How long a call may ring before the relay ends it.
pub const RING_TIMEOUT: Duration = Duration::from_secs(60);

/// Calls older than this are swept regardless of state (leaked entries
/// from crashed peers).
const STALE_AFTER: Duration = Duration::from_secs(3600);

/// Tagged call lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallState {
    Ringing,
    Connected,
    Ended { reason: String },
}

/// Inputs that drive the state machine.
#[derive(Debug, Clone)]
pub enum CallInput {
    Answer,
    Ice,
    End { reason: String },
    Timeout,
}

/// Pure transition function. `Err(())` marks an illegal transition, which
/// the router reports as `INVALID_PAYLOAD`.
pub fn apply(state: &CallState, input: &CallInput) -> Result<CallState, ()> {
    match (state, input) {
        (CallState::Ringing, CallInput::Answer) => Ok(CallState::Connected),
        (CallState::Ringing, CallInput::Ice) => Ok(CallState::Ringing),
        (CallState::Connected, CallInput::Ice) => Ok(CallState::Connected),
        (CallState::Ringing | CallState::Connected, CallInput::End { reason }) => {
            Ok(CallState::Ended { reason: reason.clone() })
        }
        (CallState::Ringing, CallInput::Timeout) => {
            Ok(CallState::Ended { reason: "timeout".into() })
        }
        _ => Err(()),
    }
}

struct CallSession {
    caller: String,
    callee: String,
    state: CallState,
    started_at: std::time::Instant,
    ring_timer: Option<JoinHandle<()>>,
}

/// Routes call frames and owns the per-call state map.
pub struct CallRouter {
    db: Database,
    registry: Arc<LiveRegistry>,
    metrics: Arc<RelayMetrics>,
    push: Arc<dyn PushSender>,
    calls: RwLock<HashMap<Uuid, CallSession>>,
}

impl CallRouter {
    pub fn new(
        db: Database,
        registry: Arc<LiveRegistry>,
        metrics: Arc<RelayMetrics>,
        push: Arc<dyn PushSender>,
    ) -> Self {
        Self { db, registry, metrics, push, calls: RwLock::new(HashMap::new()) }
    }

    /// `call_initiate` — create the call, route the offer, start ringing.
    pub async fn initiate(self: Arc<Self>, frame: &CallFrame) -> RelayResult<()> {
        {
            let mut calls = self.calls.write().await;
            if calls.contains_key(&frame.call_id) {
                return Err(RelayError::invalid("call already exists"));
            }
            calls.insert(
                frame.call_id,
                CallSession {
                    caller: frame.from.clone(),
                    callee: frame.to.clone(),
                    state: CallState::Ringing,
                    started_at: std::time::Instant::now(),
                    ring_timer: None,
                },
            );
        }
        RelayMetrics::incr(&self.metrics.calls_initiated);

        let offer = Frame::new(kind::CALL_INCOMING, &CallEvent::from_frame(frame));
        let reached = self.registry.try_deliver(&frame.to, &offer).await;
        if reached {
            // The callee's gateway observed the offer — tell the caller.
            let ringing = Frame::new(
                kind::CALL_RINGING,
                &CallRinging { call_id: frame.call_id, server_time: whisper_common::now_ms() },
            );
            self.registry.try_deliver(&frame.from, &ringing).await;
        } else {
            // Offline callee: VoIP push hand-off, ring timer keeps running.
            if let Ok(device_list) = devices::list_for(&self.db.pg, &frame.to).await {
                self.push.notify_call(&frame.to, &device_list, frame.call_id, &frame.from).await;
                RelayMetrics::incr(&self.metrics.push_handoffs);
            }
        }

        // Arm the ring timeout.
        let router = Arc::clone(&self);
        let call_id = frame.call_id;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(RING_TIMEOUT).await;
            router.timeout(call_id).await;
        });
        if let Some(session) = self.calls.write().await.get_mut(&frame.call_id) {
            session.ring_timer = Some(timer);
        } else {
            // Call already ended while we armed the timer.
            timer.abort();
        }
        Ok(())
    }

    /// `call_answer` — only the callee may answer, only while ringing.
    pub async fn answer(&self, frame: &CallFrame) -> RelayResult<()> {
        let caller = {
            let mut calls = self.calls.write().await;
            let session = calls
                .get_mut(&frame.call_id)
                .ok_or_else(|| RelayError::NotFound { resource: "call".into() })?;
            if session.callee != frame.from {
                return Err(RelayError::Forbidden);
            }
            session.state = apply(&session.state, &CallInput::Answer)
                .map_err(|_| RelayError::invalid("call is not ringing"))?;
            if let Some(timer) = session.ring_timer.take() {
                timer.abort();
            }
            session.caller.clone()
        };
        RelayMetrics::incr(&self.metrics.calls_answered);

        let event = Frame::new(kind::CALL_ANSWERED, &CallEvent::from_frame(frame));
        self.registry.try_deliver(&caller, &event).await;
        Ok(())
    }

    /// `call_ice_candidate` — relay trickle ICE to the peer.
    pub async fn ice_candidate(&self, frame: &CallFrame) -> RelayResult<()> {
        let peer = {
            let calls = self.calls.read().await;
            let session = calls
                .get(&frame.call_id)
                .ok_or_else(|| RelayError::NotFound { resource: "call".into() })?;
            apply(&session.state, &CallInput::Ice)
                .map_err(|_| RelayError::invalid("call is not active"))?;
            peer_of(session, &frame.from)?
        };

        let event = Frame::new(kind::CALL_ICE_CANDIDATE, &CallEvent::from_frame(frame));
        self.registry.try_deliver(&peer, &event).await;
        Ok(())
    }

    /// `call_end` — either side, any non-terminal state.
    pub async fn end(&self, frame: &CallFrame) -> RelayResult<()> {
        let peer = {
            let mut calls = self.calls.write().await;
            let session = calls
                .get_mut(&frame.call_id)
                .ok_or_else(|| RelayError::NotFound { resource: "call".into() })?;
            let peer = peer_of(session, &frame.from)?;
            let reason = frame.reason.clone().unwrap_or_else(|| "hangup".into());
            session.state = apply(&session.state, &CallInput::End { reason })
                .map_err(|_| RelayError::invalid("call already ended"))?;
            if let Some(timer) = session.ring_timer.take() {
                timer.abort();
            }
            calls.remove(&frame.call_id);
            peer
        };
        RelayMetrics::incr(&self.metrics.calls_ended);

        let event = Frame::new(kind::CALL_ENDED, &CallEvent::from_frame(frame));
        self.registry.try_deliver(&peer, &event).await;
        Ok(())
    }

    /// Ring timer fired — end the call both ways if still ringing.
    async fn timeout(&self, call_id: Uuid) {
        let Some((caller, callee)) = ({
            let mut calls = self.calls.write().await;
            match calls.get_mut(&call_id) {
                Some(session) if session.state == CallState::Ringing => {
                    session.state = CallState::Ended { reason: "timeout".into() };
                    let pair = (session.caller.clone(), session.callee.clone());
                    calls.remove(&call_id);
                    Some(pair)
                }
                _ => None,
            }
        }) else {
            return;
        };
        RelayMetrics::incr(&self.metrics.call_timeouts);
        tracing::info!(call_id = %call_id, "call ring timeout");

        let payload = serde_json::json!({
            "callId": call_id,
            "reason": "timeout",
            "serverTime": whisper_common::now_ms(),
        });
        let frame = Frame { kind: kind::CALL_ENDED.into(), request_id: None, payload };
        self.registry.try_deliver(&caller, &frame).await;
        self.registry.try_deliver(&callee, &frame).await;
    }

    /// Sweep leaked call entries. Ring timers handle the normal path; this
    /// catches calls stuck `Connected` after both peers vanished.
    pub async fn prune_stale(&self) {
        let mut calls = self.calls.write().await;
        calls.retain(|call_id, session| {
            let stale = session.started_at.elapsed() > STALE_AFTER;
            if stale {
                tracing::warn!(call_id = %call_id, "pruning stale call session");
                if let Some(timer) = session.ring_timer.take() {
                    timer.abort();
                }
            }
            !stale
        });
    }

    pub async fn active_count(&self) -> usize {
        self.calls.read().await.len()
    }
}

fn peer_of(session: &CallSession, from: &str) -> RelayResult<String> {
    if session.caller == from {
        Ok(session.callee.clone())
    } else if session.callee == from {
        Ok(session.caller.clone())
    } else {
        Err(RelayError::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ringing_answers_into_connected() {
        assert_eq!(apply(&CallState::Ringing, &CallInput::Answer), Ok(CallState::Connected));
    }

    #[test]
    fn ice_keeps_state() {
        assert_eq!(apply(&CallState::Ringing, &CallInput::Ice), Ok(CallState::Ringing));
        assert_eq!(apply(&CallState::Connected, &CallInput::Ice), Ok(CallState::Connected));
    }

    #[test]
    fn end_is_terminal_from_any_side_and_carries_reason() {
        let ended = apply(
            &CallState::Connected,
            &CallInput::End { reason: "test_complete".into() },
        )
        .unwrap();
        assert_eq!(ended, CallState::Ended { reason: "test_complete".into() });

        let ended = apply(&CallState::Ringing, &CallInput::End { reason: "declined".into() });
        assert_eq!(ended, Ok(CallState::Ended { reason: "declined".into() }));
    }

    #[test]
    fn timeout_only_applies_while_ringing() {
        assert_eq!(
            apply(&CallState::Ringing, &CallInput::Timeout),
            Ok(CallState::Ended { reason: "timeout".into() })
        );
        assert!(apply(&CallState::Connected, &CallInput::Timeout).is_err());
    }

    #[test]
    fn terminal_state_rejects_everything() {
        let ended = CallState::Ended { reason: "hangup".into() };
        assert!(apply(&ended, &CallInput::Answer).is_err());
        assert!(apply(&ended, &CallInput::Ice).is_err());
        assert!(apply(&ended, &CallInput::End { reason: "again".into() }).is_err());
        assert!(apply(&ended, &CallInput::Timeout).is_err());
    }

    #[test]
    fn double_answer_is_rejected() {
        let connected = apply(&CallState::Ringing, &CallInput::Answer).unwrap();
        assert!(apply(&connected, &CallInput::Answer).is_err());
    }
}
