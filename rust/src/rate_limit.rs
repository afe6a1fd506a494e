//! Client-side advisory rate limiter for sensitive actions (OTP requests, logins).
//!
//! Counting uses a fixed window keyed by `(action, identifier)`. Bursts straddling a window
//! boundary can reach up to twice `max_attempts`; the backend is the authoritative guard.

use std::sync::Arc;

use agora_storage_traits::rate_limit::types::RateLimitRecord;
use agora_storage_traits::rate_limit::RateLimitStorage;
use sha2::{Digest, Sha256};

use crate::clock::SharedClock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_attempts: u32,
    pub window_ms: i64,
    pub block_duration_ms: i64,
}

impl RateLimitConfig {
    /// One-time-password requests: 3 per minute, then a 5 minute lockout.
    pub const OTP: Self = Self {
        max_attempts: 3,
        window_ms: 60_000,
        block_duration_ms: 300_000,
    };

    /// Password logins: 5 per 15 minutes, then a 15 minute lockout.
    pub const LOGIN: Self = Self {
        max_attempts: 5,
        window_ms: 900_000,
        block_duration_ms: 900_000,
    };
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining_attempts: Option<u32>,
    pub blocked_until: Option<i64>,
}

impl RateLimitDecision {
    fn allow(remaining: u32) -> Self {
        Self {
            allowed: true,
            remaining_attempts: Some(remaining),
            blocked_until: None,
        }
    }

    fn deny(blocked_until: i64) -> Self {
        Self {
            allowed: false,
            remaining_attempts: Some(0),
            blocked_until: Some(blocked_until),
        }
    }

    fn fail_open() -> Self {
        Self {
            allowed: true,
            remaining_attempts: None,
            blocked_until: None,
        }
    }
}

/// Storage key for a `(action, identifier)` pair. Raw identifiers (emails, phone numbers)
/// never reach disk.
pub fn hashed_identifier(action: &str, identifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(action.as_bytes());
    hasher.update(b":");
    hasher.update(identifier.as_bytes());
    hex::encode(hasher.finalize())
}

/// Apply one attempt to `existing`. Returns the record to persist (if it changed) and the
/// decision for this attempt.
fn step(
    existing: Option<RateLimitRecord>,
    key: &str,
    action: &str,
    now: i64,
    config: &RateLimitConfig,
) -> (Option<RateLimitRecord>, RateLimitDecision) {
    let max = config.max_attempts.max(1);
    match existing {
        Some(record) if record.is_blocked(now) => {
            let until = record.blocked_until.unwrap_or(now);
            (None, RateLimitDecision::deny(until))
        }
        Some(mut record)
            if record.blocked_until.is_none()
                && now.saturating_sub(record.window_start) < config.window_ms =>
        {
            record.attempt_count = record.attempt_count.saturating_add(1);
            if record.attempt_count > max {
                let until = now.saturating_add(config.block_duration_ms);
                record.blocked_until = Some(until);
                (Some(record), RateLimitDecision::deny(until))
            } else {
                let remaining = max - record.attempt_count;
                (Some(record), RateLimitDecision::allow(remaining))
            }
        }
        // No record, the window elapsed, or the lockout passed: start over.
        _ => (
            Some(RateLimitRecord::first_attempt(key, action, now)),
            RateLimitDecision::allow(max - 1),
        ),
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    storage: Arc<dyn RateLimitStorage + Send + Sync>,
    clock: SharedClock,
}

impl RateLimiter {
    pub fn new(storage: Arc<dyn RateLimitStorage + Send + Sync>, clock: SharedClock) -> Self {
        Self { storage, clock }
    }

    /// Record an attempt at `action` by `identifier` and decide whether it may proceed.
    ///
    /// Storage failures allow the attempt.
    pub fn check_and_record(
        &self,
        action: &str,
        identifier: &str,
        config: &RateLimitConfig,
    ) -> RateLimitDecision {
        let key = hashed_identifier(action, identifier);
        let now = self.clock.now_ms();

        let existing = match self.storage.rate_limit_get(&key, action) {
            Ok(existing) => existing,
            Err(e) => {
                tracing::warn!(%e, action, "rate limit lookup failed; allowing");
                return RateLimitDecision::fail_open();
            }
        };

        let (to_save, decision) = step(existing, &key, action, now, config);
        if let Some(record) = to_save {
            if let Err(e) = self.storage.rate_limit_save(&record) {
                tracing::warn!(%e, action, "rate limit save failed; allowing");
                return RateLimitDecision::fail_open();
            }
        }
        if !decision.allowed {
            tracing::info!(action, blocked_until = ?decision.blocked_until, "rate limited");
        }
        decision
    }

    /// Forget all attempts, e.g. after a successful login.
    pub fn reset(&self, action: &str, identifier: &str) {
        let key = hashed_identifier(action, identifier);
        if let Err(e) = self.storage.rate_limit_remove(&key, action) {
            tracing::warn!(%e, action, "rate limit reset failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use agora_memory_storage::AgoraMemoryStorage;
    use agora_storage_traits::StorageError;

    use super::*;
    use crate::clock::{Clock, ManualClock};

    fn limiter(start: i64) -> (RateLimiter, Arc<ManualClock>) {
        let clock = ManualClock::new(start);
        let storage = Arc::new(AgoraMemoryStorage::default());
        (RateLimiter::new(storage, clock.clone()), clock)
    }

    #[test]
    fn fourth_attempt_in_window_is_blocked() {
        let (limiter, clock) = limiter(1_000);
        let cfg = RateLimitConfig::OTP;

        for remaining in [2, 1, 0] {
            let d = limiter.check_and_record("otp", "a@example.com", &cfg);
            assert!(d.allowed);
            assert_eq!(d.remaining_attempts, Some(remaining));
            clock.advance_ms(1_000);
        }

        let at = clock.now_ms();
        let d = limiter.check_and_record("otp", "a@example.com", &cfg);
        assert!(!d.allowed);
        assert_eq!(d.blocked_until, Some(at + 300_000));

        clock.set(at + 299_999);
        assert!(!limiter.check_and_record("otp", "a@example.com", &cfg).allowed);

        clock.set(at + 300_000);
        let d = limiter.check_and_record("otp", "a@example.com", &cfg);
        assert!(d.allowed);
        assert_eq!(d.remaining_attempts, Some(2));
    }

    #[test]
    fn window_elapsing_resets_count() {
        let (limiter, clock) = limiter(0);
        let cfg = RateLimitConfig::OTP;
        for _ in 0..3 {
            assert!(limiter.check_and_record("otp", "x", &cfg).allowed);
        }
        clock.advance_ms(60_000);
        let d = limiter.check_and_record("otp", "x", &cfg);
        assert!(d.allowed);
        assert_eq!(d.remaining_attempts, Some(2));
    }

    #[test]
    fn actions_and_identifiers_are_independent() {
        let (limiter, _clock) = limiter(0);
        let cfg = RateLimitConfig {
            max_attempts: 1,
            window_ms: 60_000,
            block_duration_ms: 60_000,
        };
        assert!(limiter.check_and_record("otp", "x", &cfg).allowed);
        assert!(!limiter.check_and_record("otp", "x", &cfg).allowed);
        assert!(limiter.check_and_record("login", "x", &cfg).allowed);
        assert!(limiter.check_and_record("otp", "y", &cfg).allowed);

        limiter.reset("otp", "x");
        assert!(limiter.check_and_record("otp", "x", &cfg).allowed);
    }

    #[test]
    fn identifiers_are_hashed() {
        let key = hashed_identifier("otp", "a@example.com");
        assert_eq!(key.len(), 64);
        assert!(!key.contains("example"));
        assert_ne!(key, hashed_identifier("login", "a@example.com"));
    }

    struct BrokenStorage;

    impl RateLimitStorage for BrokenStorage {
        fn rate_limit_get(
            &self,
            _identifier: &str,
            _action: &str,
        ) -> Result<Option<RateLimitRecord>, StorageError> {
            Err(StorageError::Database("disk on fire".into()))
        }

        fn rate_limit_save(&self, _record: &RateLimitRecord) -> Result<(), StorageError> {
            Err(StorageError::Database("disk on fire".into()))
        }

        fn rate_limit_remove(&self, _identifier: &str, _action: &str) -> Result<(), StorageError> {
            Err(StorageError::Database("disk on fire".into()))
        }
    }

    #[test]
    fn storage_failure_fails_open() {
        let limiter = RateLimiter::new(Arc::new(BrokenStorage), ManualClock::new(0));
        let cfg = RateLimitConfig::OTP;
        for _ in 0..10 {
            let d = limiter.check_and_record("otp", "x", &cfg);
            assert!(d.allowed);
            assert_eq!(d.remaining_attempts, None);
        }
    }
}
