//! Types for the rate limit module

use serde::{Deserialize, Serialize};

/// Attempt counter for one `(identifier, action)` pair in the current fixed window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRecord {
    /// Who is being limited (stored hashed by the limiter)
    pub identifier: String,
    /// What is being limited, e.g. `otp` or `login`
    pub action: String,
    /// Attempts recorded in the current window
    pub attempt_count: u32,
    /// Start of the current window
    pub window_start: i64,
    /// Lockout deadline, set once the ceiling was exceeded
    pub blocked_until: Option<i64>,
}

impl RateLimitRecord {
    /// A fresh window opened at `now` holding one attempt
    pub fn first_attempt(identifier: &str, action: &str, now: i64) -> Self {
        Self {
            identifier: identifier.to_string(),
            action: action.to_string(),
            attempt_count: 1,
            window_start: now,
            blocked_until: None,
        }
    }

    /// Whether the lockout is still in force at `now`
    pub fn is_blocked(&self, now: i64) -> bool {
        self.blocked_until.is_some_and(|until| now < until)
    }
}
