//! Types for the key/value module

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A cached payload together with the instant it was written and, optionally, the instant it
/// stops being served.
///
/// `expires_at`, when present, is always strictly greater than `created_at`. An entry is valid
/// while `now < expires_at`; an entry without `expires_at` never expires on its own and is
/// only dropped by explicit invalidation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedEntry<T> {
    /// The cached payload
    pub data: T,
    /// When the entry was written
    pub created_at: i64,
    /// When the entry stops being valid
    pub expires_at: Option<i64>,
}

impl<T> CachedEntry<T> {
    /// Wrap `data` written at `now`, valid for `ttl` when given.
    ///
    /// A zero TTL is bumped to one millisecond so the `expires_at > created_at` invariant holds.
    pub fn new(data: T, now: i64, ttl: Option<Duration>) -> Self {
        let expires_at = ttl.map(|ttl| {
            let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX).max(1);
            now.saturating_add(ttl_ms)
        });
        Self {
            data,
            created_at: now,
            expires_at,
        }
    }

    /// Whether the entry may still be served at `now`
    pub fn is_valid(&self, now: i64) -> bool {
        match self.expires_at {
            Some(expires_at) => now < expires_at,
            None => true,
        }
    }

    /// Consume the entry, returning the payload if it is still valid at `now`
    pub fn into_valid(self, now: i64) -> Option<T> {
        if self.is_valid(now) {
            Some(self.data)
        } else {
            None
        }
    }
}
