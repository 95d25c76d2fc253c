//! In-process token-bucket rate limiter.
//!
//! Buckets are keyed by `(ip, whisperId?, endpoint-class)`. Each class has
//! its own capacity and refill rate. Exhaustion yields the `retryAfter`
//! hint in milliseconds. Single-node; multi-node deployments put a Redis
//! counter in front (see `whisper_db::redis_pool::incr_expire`).

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Endpoint classes with independent budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointClass {
    /// `send_message`, `group_send_message`, receipts.
    Message,
    /// Call signaling frames.
    Call,
    /// Registration handshake, keyed by IP only.
    Register,
    /// Contact-backup HTTP operations.
    Backup,
    /// Attachment presign HTTP operations.
    Presign,
    /// Key lookup / TURN issuance.
    Lookup,
}

impl EndpointClass {
    /// `(burst capacity, refill tokens per second)`
    fn budget(self) -> (f64, f64) {
        match self {
            Self::Message => (30.0, 1.0),
            Self::Call => (10.0, 0.5),
            Self::Register => (5.0, 5.0 / 60.0),
            Self::Backup => (10.0, 10.0 / 60.0),
            Self::Presign => (30.0, 0.5),
            Self::Lookup => (60.0, 1.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BucketKey {
    ip: IpAddr,
    whisper_id: Option<String>,
    class: EndpointClass,
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token-bucket limiter shared by the gateway and the HTTP surface.
pub struct RateLimiter {
    buckets: Mutex<HashMap<BucketKey, Bucket>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self { buckets: Mutex::new(HashMap::new()) }
    }

    /// Take one token; on exhaustion, returns the wait in milliseconds until
    /// the next token is available.
    pub fn check(
        &self,
        ip: IpAddr,
        whisper_id: Option<&str>,
        class: EndpointClass,
    ) -> Result<(), u64> {
        self.check_at(ip, whisper_id, class, Instant::now())
    }

    fn check_at(
        &self,
        ip: IpAddr,
        whisper_id: Option<&str>,
        class: EndpointClass,
        now: Instant,
    ) -> Result<(), u64> {
        let (capacity, refill_per_sec) = class.budget();
        let key = BucketKey { ip, whisper_id: whisper_id.map(str::to_owned), class };

        let mut buckets = self.buckets.lock().expect("limiter lock");
        let bucket = buckets
            .entry(key)
            .or_insert(Bucket { tokens: capacity, last_refill: now });

        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * refill_per_sec).min(capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(())
        } else {
            let deficit = 1.0 - bucket.tokens;
            Err((deficit / refill_per_sec * 1000.0).ceil() as u64)
        }
    }

    /// Drop buckets idle long enough to be full again. Called by the sweeper.
    pub fn prune(&self) {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().expect("limiter lock");
        buckets.retain(|key, bucket| {
            let (capacity, refill_per_sec) = key.class.budget();
            let idle = now.saturating_duration_since(bucket.last_refill);
            idle < Duration::from_secs_f64(capacity / refill_per_sec)
        });
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip() -> IpAddr {
        "203.0.113.7".parse().unwrap()
    }

    #[test]
    fn burst_then_exhaustion() {
        let limiter = RateLimiter::new();
        let now = Instant::now();
        for _ in 0..30 {
            assert!(limiter.check_at(ip(), Some("WSP-A"), EndpointClass::Message, now).is_ok());
        }
        let retry = limiter
            .check_at(ip(), Some("WSP-A"), EndpointClass::Message, now)
            .expect_err("31st message in a burst must be limited");
        assert!(retry > 0);
    }

    #[test]
    fn refill_restores_tokens() {
        let limiter = RateLimiter::new();
        let t0 = Instant::now();
        for _ in 0..30 {
            limiter.check_at(ip(), Some("WSP-A"), EndpointClass::Message, t0).unwrap();
        }
        assert!(limiter.check_at(ip(), Some("WSP-A"), EndpointClass::Message, t0).is_err());

        // Message class refills at 1 token/sec.
        let t1 = t0 + Duration::from_secs(2);
        assert!(limiter.check_at(ip(), Some("WSP-A"), EndpointClass::Message, t1).is_ok());
    }

    #[test]
    fn buckets_are_independent_per_identity_and_class() {
        let limiter = RateLimiter::new();
        let now = Instant::now();
        for _ in 0..30 {
            limiter.check_at(ip(), Some("WSP-A"), EndpointClass::Message, now).unwrap();
        }
        assert!(limiter.check_at(ip(), Some("WSP-A"), EndpointClass::Message, now).is_err());
        // Different identity, same IP: fresh bucket.
        assert!(limiter.check_at(ip(), Some("WSP-B"), EndpointClass::Message, now).is_ok());
        // Same identity, different class: fresh bucket.
        assert!(limiter.check_at(ip(), Some("WSP-A"), EndpointClass::Call, now).is_ok());
    }

    #[test]
    fn register_is_keyed_by_ip_alone() {
        let limiter = RateLimiter::new();
        let now = Instant::now();
        for _ in 0..5 {
            assert!(limiter.check_at(ip(), None, EndpointClass::Register, now).is_ok());
        }
        assert!(limiter.check_at(ip(), None, EndpointClass::Register, now).is_err());
    }
}
