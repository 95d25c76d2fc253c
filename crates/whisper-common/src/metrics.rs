//! Relay observability counters.
//!
//! One atomic counter per accept/drop path, exposed as JSON at `/metrics`
//! and Prometheus text format at `/metrics/prometheus`.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for every relay path. Fields are public; call sites increment
/// with `fetch_add(1, Ordering::Relaxed)` via [`RelayMetrics::incr`].
#[derive(Default)]
pub struct RelayMetrics {
    pub connections_opened: AtomicU64,
    pub connections_closed: AtomicU64,
    pub registrations: AtomicU64,
    pub resumes: AtomicU64,
    pub frames_in: AtomicU64,
    pub frames_out: AtomicU64,
    pub messages_accepted: AtomicU64,
    pub messages_delivered_live: AtomicU64,
    pub messages_queued: AtomicU64,
    pub pending_replayed: AtomicU64,
    pub receipts_routed: AtomicU64,
    pub validation_failures: AtomicU64,
    pub auth_failures: AtomicU64,
    pub rate_limited: AtomicU64,
    pub banned_rejections: AtomicU64,
    pub calls_initiated: AtomicU64,
    pub calls_answered: AtomicU64,
    pub calls_ended: AtomicU64,
    pub call_timeouts: AtomicU64,
    pub push_handoffs: AtomicU64,
    pub backups_stored: AtomicU64,
    pub presigns_issued: AtomicU64,
    pub turn_issued: AtomicU64,
    pub internal_errors: AtomicU64,
}

/// Point-in-time copy of all counters, serialized by the `/metrics` route.
#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub connections_opened: u64,
    pub connections_closed: u64,
    pub registrations: u64,
    pub resumes: u64,
    pub frames_in: u64,
    pub frames_out: u64,
    pub messages_accepted: u64,
    pub messages_delivered_live: u64,
    pub messages_queued: u64,
    pub pending_replayed: u64,
    pub receipts_routed: u64,
    pub validation_failures: u64,
    pub auth_failures: u64,
    pub rate_limited: u64,
    pub banned_rejections: u64,
    pub calls_initiated: u64,
    pub calls_answered: u64,
    pub calls_ended: u64,
    pub call_timeouts: u64,
    pub push_handoffs: u64,
    pub backups_stored: u64,
    pub presigns_issued: u64,
    pub turn_issued: u64,
    pub internal_errors: u64,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment a counter field.
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let read = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            connections_opened: read(&self.connections_opened),
            connections_closed: read(&self.connections_closed),
            registrations: read(&self.registrations),
            resumes: read(&self.resumes),
            frames_in: read(&self.frames_in),
            frames_out: read(&self.frames_out),
            messages_accepted: read(&self.messages_accepted),
            messages_delivered_live: read(&self.messages_delivered_live),
            messages_queued: read(&self.messages_queued),
            pending_replayed: read(&self.pending_replayed),
            receipts_routed: read(&self.receipts_routed),
            validation_failures: read(&self.validation_failures),
            auth_failures: read(&self.auth_failures),
            rate_limited: read(&self.rate_limited),
            banned_rejections: read(&self.banned_rejections),
            calls_initiated: read(&self.calls_initiated),
            calls_answered: read(&self.calls_answered),
            calls_ended: read(&self.calls_ended),
            call_timeouts: read(&self.call_timeouts),
            push_handoffs: read(&self.push_handoffs),
            backups_stored: read(&self.backups_stored),
            presigns_issued: read(&self.presigns_issued),
            turn_issued: read(&self.turn_issued),
            internal_errors: read(&self.internal_errors),
        }
    }

    /// Render all counters in Prometheus text exposition format.
    pub fn render_prometheus(&self) -> String {
        let snap = self.snapshot();
        let mut out = String::with_capacity(2048);
        let mut gauge = |name: &str, value: u64| {
            out.push_str(&format!(
                "# TYPE whisper_relay_{name} counter\nwhisper_relay_{name} {value}\n"
            ));
        };
        gauge("connections_opened_total", snap.connections_opened);
        gauge("connections_closed_total", snap.connections_closed);
        gauge("registrations_total", snap.registrations);
        gauge("resumes_total", snap.resumes);
        gauge("frames_in_total", snap.frames_in);
        gauge("frames_out_total", snap.frames_out);
        gauge("messages_accepted_total", snap.messages_accepted);
        gauge("messages_delivered_live_total", snap.messages_delivered_live);
        gauge("messages_queued_total", snap.messages_queued);
        gauge("pending_replayed_total", snap.pending_replayed);
        gauge("receipts_routed_total", snap.receipts_routed);
        gauge("validation_failures_total", snap.validation_failures);
        gauge("auth_failures_total", snap.auth_failures);
        gauge("rate_limited_total", snap.rate_limited);
        gauge("banned_rejections_total", snap.banned_rejections);
        gauge("calls_initiated_total", snap.calls_initiated);
        gauge("calls_answered_total", snap.calls_answered);
        gauge("calls_ended_total", snap.calls_ended);
        gauge("call_timeouts_total", snap.call_timeouts);
        gauge("push_handoffs_total", snap.push_handoffs);
        gauge("backups_stored_total", snap.backups_stored);
        gauge("presigns_issued_total", snap.presigns_issued);
        gauge("turn_issued_total", snap.turn_issued);
        gauge("internal_errors_total", snap.internal_errors);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_increments() {
        let m = RelayMetrics::new();
        RelayMetrics::incr(&m.messages_accepted);
        RelayMetrics::incr(&m.messages_accepted);
        RelayMetrics::incr(&m.rate_limited);
        let snap = m.snapshot();
        assert_eq!(snap.messages_accepted, 2);
        assert_eq!(snap.rate_limited, 1);
        assert_eq!(snap.frames_in, 0);
    }

    #[test]
    fn prometheus_rendering_contains_counters() {
        let m = RelayMetrics::new();
        RelayMetrics::incr(&m.turn_issued);
        let text = m.render_prometheus();
        assert!(text.contains("whisper_relay_turn_issued_total 1"));
        assert!(text.contains("# TYPE whisper_relay_messages_accepted_total counter"));
    }
}
