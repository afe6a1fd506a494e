//! Types for the messages module

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::StorageError;

/// An object-storage attachment (image, video, file) referenced by bucket and path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MediaRef {
    /// Storage bucket
    pub bucket: String,
    /// Object path inside the bucket
    pub path: String,
    /// MIME type reported at upload time
    pub mime_type: String,
}

impl MediaRef {
    /// Whether the attachment can be served through the image transformation endpoint
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

/// A chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message id, generated by the sending client and reused by the backend row
    pub id: String,
    /// Chat the message belongs to
    pub chat_id: String,
    /// Author
    pub sender_id: String,
    /// Text content
    pub content: String,
    /// Attachments
    #[serde(default)]
    pub media: Vec<MediaRef>,
    /// Creation time
    pub created_at: i64,
    /// Last edit time, if edited
    #[serde(default)]
    pub edited_at: Option<i64>,
    /// Users that hid this message for themselves
    #[serde(default)]
    pub deleted_for: BTreeSet<String>,
    /// Users that starred this message
    #[serde(default)]
    pub starred_by: BTreeSet<String>,
    /// Disappearing-message deadline, captured at send time
    #[serde(default)]
    pub expires_at: Option<i64>,
    /// Id of the message this one was forwarded from
    #[serde(default)]
    pub forwarded_from: Option<String>,
    /// Delivery state as seen by the sender
    pub delivery: DeliveryState,
    /// Per-recipient delivery state
    #[serde(default)]
    pub receipts: BTreeMap<String, DeliveryState>,
    /// Why the last send attempt failed
    #[serde(default)]
    pub failure_reason: Option<String>,
}

impl Message {
    /// Whether the disappearing deadline has passed at `now`
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    /// Whether `user_id` should see this message at `now`.
    ///
    /// Hidden when the user soft-deleted it or when it has expired.
    pub fn is_visible_to(&self, user_id: &str, now: i64) -> bool {
        !self.deleted_for.contains(user_id) && !self.is_expired(now)
    }

    /// Whether `user_id` starred this message
    pub fn is_starred_by(&self, user_id: &str) -> bool {
        self.starred_by.contains(user_id)
    }

    /// Record a receipt from `recipient` and return whether anything changed.
    ///
    /// The per-recipient state only moves forward. The sender-facing [`Message::delivery`]
    /// is then advanced to the lowest state reported by `recipients` (recipients that never
    /// reported count as [`DeliveryState::Sent`]).
    pub fn apply_receipt(
        &mut self,
        recipient: &str,
        state: DeliveryState,
        recipients: &[String],
    ) -> bool {
        let mut changed = match self.receipts.get_mut(recipient) {
            Some(current) => current.advance(state),
            None => {
                if matches!(state, DeliveryState::Sending | DeliveryState::Failed) {
                    false
                } else {
                    self.receipts.insert(recipient.to_string(), state);
                    true
                }
            }
        };

        let floor = DeliveryState::floor(recipients.iter().map(|r| {
            self.receipts
                .get(r)
                .copied()
                .unwrap_or(DeliveryState::Sent)
        }))
        .unwrap_or(state);
        changed |= self.delivery.advance(floor);
        changed
    }

    /// Compares two messages for display ordering.
    ///
    /// Oldest first by `created_at`, ties broken by `id` so the order is deterministic.
    pub fn display_order_cmp(&self, other: &Self) -> Ordering {
        self.created_at
            .cmp(&other.created_at)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Delivery state of a message for a (message, recipient) pair.
///
/// Moves strictly forward along `Sending -> Sent -> Delivered -> Read`; a later state
/// subsumes the ones before it. `Failed` is reachable from `Sending` only and is terminal
/// for the state machine; a user-initiated retry starts a new attempt (see
/// [`DeliveryState::retry`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryState {
    /// Optimistically shown, not yet confirmed by the backend
    Sending,
    /// Stored by the backend
    Sent,
    /// Received by the recipient's client
    Delivered,
    /// Seen by the recipient
    Read,
    /// The send attempt failed
    Failed,
}

impl DeliveryState {
    fn rank(self) -> Option<u8> {
        match self {
            Self::Sending => Some(0),
            Self::Sent => Some(1),
            Self::Delivered => Some(2),
            Self::Read => Some(3),
            Self::Failed => None,
        }
    }

    /// Whether the state machine permits moving from `self` to `next`
    pub fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Sending, Self::Failed) => true,
            (Self::Failed, _) | (_, Self::Failed) => false,
            (current, next) => next.rank() > current.rank(),
        }
    }

    /// Move to `next` if permitted; returns whether the state changed.
    ///
    /// Out-of-order or duplicate events are ignored, which makes applying them idempotent.
    pub fn advance(&mut self, next: Self) -> bool {
        if self.can_transition_to(next) {
            *self = next;
            true
        } else {
            false
        }
    }

    /// Start a new attempt for a failed send. Returns whether the state changed.
    pub fn retry(&mut self) -> bool {
        if *self == Self::Failed {
            *self = Self::Sending;
            true
        } else {
            false
        }
    }

    /// The lowest non-failed state in `states`, or `None` when there is none.
    pub fn floor<I>(states: I) -> Option<Self>
    where
        I: IntoIterator<Item = Self>,
    {
        states
            .into_iter()
            .filter(|s| s.rank().is_some())
            .min_by_key(|s| s.rank())
    }

    /// No further transition is possible
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Read | Self::Failed)
    }

    /// Get as `&str`
    pub fn as_str(&self) -> &str {
        match self {
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DeliveryState {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sending" => Ok(Self::Sending),
            "sent" => Ok(Self::Sent),
            "delivered" => Ok(Self::Delivered),
            "read" => Ok(Self::Read),
            "failed" => Ok(Self::Failed),
            _ => Err(StorageError::InvalidParameters(format!(
                "Invalid delivery state: {}",
                s
            ))),
        }
    }
}

impl Serialize for DeliveryState {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for DeliveryState {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Who a delete applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeleteScope {
    /// Hide the message for the current user only
    ForMe,
    /// Remove the message for every participant (author only)
    ForEveryone,
}

impl DeleteScope {
    /// Get as `&str`
    pub fn as_str(&self) -> &str {
        match self {
            Self::ForMe => "for_me",
            Self::ForEveryone => "for_everyone",
        }
    }
}

impl fmt::Display for DeleteScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DeleteScope {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "for_me" => Ok(Self::ForMe),
            "for_everyone" => Ok(Self::ForEveryone),
            _ => Err(StorageError::InvalidParameters(format!(
                "Invalid delete scope: {}",
                s
            ))),
        }
    }
}

/// A message waiting in the scheduled-send queue.
///
/// It is not part of any chat until the backend's publisher promotes it; the promoted row
/// keeps the same id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledMessage {
    /// Id the published message will carry
    pub id: String,
    /// Target chat
    pub chat_id: String,
    /// Author
    pub sender_id: String,
    /// Text content
    pub content: String,
    /// Attachments
    #[serde(default)]
    pub media: Vec<MediaRef>,
    /// When the publisher should promote it
    pub scheduled_for: i64,
    /// Disappearing duration to apply once published
    #[serde(default)]
    pub auto_delete_secs: Option<u64>,
    /// When the user scheduled it
    pub created_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(delivery: DeliveryState) -> Message {
        Message {
            id: "m1".to_string(),
            chat_id: "c1".to_string(),
            sender_id: "alice".to_string(),
            content: "hi".to_string(),
            media: vec![],
            created_at: 10,
            edited_at: None,
            deleted_for: BTreeSet::new(),
            starred_by: BTreeSet::new(),
            expires_at: None,
            forwarded_from: None,
            delivery,
            receipts: BTreeMap::new(),
            failure_reason: None,
        }
    }

    #[test]
    fn delivery_moves_forward_only() {
        let mut state = DeliveryState::Sending;
        assert!(state.advance(DeliveryState::Sent));
        assert!(state.advance(DeliveryState::Delivered));
        assert!(!state.advance(DeliveryState::Sent));
        assert!(!state.advance(DeliveryState::Failed));
        assert!(state.advance(DeliveryState::Read));
        assert!(!state.advance(DeliveryState::Read));
        assert_eq!(state, DeliveryState::Read);
    }

    #[test]
    fn read_before_delivered_subsumes_earlier_states() {
        let mut state = DeliveryState::Sending;
        assert!(state.advance(DeliveryState::Read));
        assert!(!state.advance(DeliveryState::Delivered));
        assert_eq!(state, DeliveryState::Read);
    }

    #[test]
    fn failed_only_reachable_from_sending() {
        for from in [
            DeliveryState::Sent,
            DeliveryState::Delivered,
            DeliveryState::Read,
        ] {
            assert!(!from.can_transition_to(DeliveryState::Failed), "{from}");
        }
        let mut state = DeliveryState::Sending;
        assert!(state.advance(DeliveryState::Failed));
        assert!(state.is_terminal());
        assert!(!state.advance(DeliveryState::Sent));
    }

    #[test]
    fn retry_restarts_failed_send_only() {
        let mut failed = DeliveryState::Failed;
        assert!(failed.retry());
        assert_eq!(failed, DeliveryState::Sending);

        let mut sent = DeliveryState::Sent;
        assert!(!sent.retry());
        assert_eq!(sent, DeliveryState::Sent);
    }

    #[test]
    fn floor_ignores_failed() {
        let floor = DeliveryState::floor([
            DeliveryState::Read,
            DeliveryState::Failed,
            DeliveryState::Delivered,
        ]);
        assert_eq!(floor, Some(DeliveryState::Delivered));
        assert_eq!(DeliveryState::floor([]), None);
    }

    #[test]
    fn group_delivery_waits_for_slowest_recipient() {
        let recipients = vec!["bob".to_string(), "carol".to_string()];
        let mut msg = message(DeliveryState::Sent);

        assert!(msg.apply_receipt("bob", DeliveryState::Read, &recipients));
        assert_eq!(msg.delivery, DeliveryState::Sent);

        assert!(msg.apply_receipt("carol", DeliveryState::Delivered, &recipients));
        assert_eq!(msg.delivery, DeliveryState::Delivered);

        assert!(msg.apply_receipt("carol", DeliveryState::Read, &recipients));
        assert_eq!(msg.delivery, DeliveryState::Read);

        // Replaying an old receipt changes nothing.
        assert!(!msg.apply_receipt("bob", DeliveryState::Delivered, &recipients));
    }

    #[test]
    fn visibility_respects_soft_delete_and_expiry() {
        let mut msg = message(DeliveryState::Sent);
        msg.deleted_for.insert("alice".to_string());
        msg.expires_at = Some(100);

        assert!(!msg.is_visible_to("alice", 50));
        assert!(msg.is_visible_to("bob", 50));
        assert!(!msg.is_visible_to("bob", 100));
    }

    #[test]
    fn delivery_state_string_roundtrip() {
        for state in [
            DeliveryState::Sending,
            DeliveryState::Sent,
            DeliveryState::Delivered,
            DeliveryState::Read,
            DeliveryState::Failed,
        ] {
            assert_eq!(DeliveryState::from_str(state.as_str()).unwrap(), state);
        }
        assert!(DeliveryState::from_str("lost").is_err());
        assert_eq!(
            serde_json::to_string(&DeliveryState::Delivered).unwrap(),
            "\"delivered\""
        );
    }

    #[test]
    fn delete_scope_parses() {
        assert_eq!(DeleteScope::from_str("for_me").unwrap(), DeleteScope::ForMe);
        assert_eq!(
            DeleteScope::from_str("for_everyone").unwrap(),
            DeleteScope::ForEveryone
        );
        assert!(DeleteScope::from_str("everyone").is_err());
    }
}
