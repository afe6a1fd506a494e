//! Realtime event bridge.
//!
//! The host's transport pushes backend change events into [`RealtimeBridge::deliver`]; the
//! bridge fans them out to the listeners registered on that channel. Listeners are owned by
//! [`Subscription`] guards and are removed when the guard is dropped, so a scope that forgets
//! to unsubscribe cannot leak its callback.

use std::sync::{Arc, Weak};

use agora_storage_traits::messages::types::{DeliveryState, Message};
use agora_storage_traits::objects::types::Post;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::MessageRecord;

pub mod channels {
    pub const POSTS: &str = "posts";

    pub fn notifications(user_id: &str) -> String {
        format!("notifications:{user_id}")
    }

    pub fn messages(user_id: &str) -> String {
        format!("messages:{user_id}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_uppercase().as_str() {
            "INSERT" => Some(Self::Insert),
            "UPDATE" => Some(Self::Update),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub kind: String,
    #[serde(default)]
    pub actor_id: Option<String>,
    #[serde(default)]
    pub body: String,
    pub created_at: i64,
    #[serde(default)]
    pub read: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RealtimeRecord {
    Message(Message),
    MessageDeleted {
        message_id: String,
        chat_id: String,
    },
    Receipt {
        message_id: String,
        chat_id: String,
        user_id: String,
        state: DeliveryState,
    },
    Post(Post),
    Notification(Notification),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealtimeEvent {
    pub change: ChangeKind,
    pub record: RealtimeRecord,
}

impl RealtimeEvent {
    pub fn new(change: ChangeKind, record: RealtimeRecord) -> Self {
        Self { change, record }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("malformed change payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown change type {0:?}")]
    UnknownChange(String),
    #[error("unhandled table {0:?}")]
    UnknownTable(String),
    #[error("payload has no {0}")]
    Missing(&'static str),
}

#[derive(Deserialize)]
struct ChangePayload {
    #[serde(rename = "type", alias = "eventType")]
    change: String,
    table: String,
    #[serde(default)]
    record: Option<Value>,
    #[serde(default)]
    old_record: Option<Value>,
}

#[derive(Deserialize)]
struct MessageKey {
    id: String,
    chat_id: String,
}

#[derive(Deserialize)]
struct ReceiptRow {
    message_id: String,
    chat_id: String,
    user_id: String,
    state: DeliveryState,
}

/// Parse a table change payload as pushed by the backend's realtime service:
/// `{"type": "INSERT", "table": "messages", "record": {...}, "old_record": {...}}`.
pub fn parse_change_payload(json: &str) -> Result<RealtimeEvent, PayloadError> {
    let payload: ChangePayload = serde_json::from_str(json)?;
    let change = ChangeKind::parse(&payload.change)
        .ok_or_else(|| PayloadError::UnknownChange(payload.change.clone()))?;

    let row = match change {
        ChangeKind::Delete => payload.old_record.or(payload.record),
        _ => payload.record,
    }
    .ok_or(PayloadError::Missing("record"))?;

    let record = match (payload.table.as_str(), change) {
        ("messages", ChangeKind::Delete) => {
            let key: MessageKey = serde_json::from_value(row)?;
            RealtimeRecord::MessageDeleted {
                message_id: key.id,
                chat_id: key.chat_id,
            }
        }
        ("messages", _) => {
            let row: MessageRecord = serde_json::from_value(row)?;
            RealtimeRecord::Message(Message::from(row))
        }
        ("message_receipts", _) => {
            let r: ReceiptRow = serde_json::from_value(row)?;
            RealtimeRecord::Receipt {
                message_id: r.message_id,
                chat_id: r.chat_id,
                user_id: r.user_id,
                state: r.state,
            }
        }
        ("posts", _) => RealtimeRecord::Post(serde_json::from_value(row)?),
        ("notifications", _) => RealtimeRecord::Notification(serde_json::from_value(row)?),
        (other, _) => return Err(PayloadError::UnknownTable(other.to_string())),
    };

    Ok(RealtimeEvent { change, record })
}

/// Which change kinds a listener wants. An empty filter accepts everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    changes: Vec<ChangeKind>,
}

impl EventFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn only(changes: &[ChangeKind]) -> Self {
        Self {
            changes: changes.to_vec(),
        }
    }

    pub fn matches(&self, event: &RealtimeEvent) -> bool {
        self.changes.is_empty() || self.changes.contains(&event.change)
    }
}

type Callback = Arc<dyn Fn(&RealtimeEvent) + Send + Sync>;

struct Listener {
    id: u64,
    channel: String,
    filter: EventFilter,
    callback: Callback,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: Vec<Listener>,
}

impl Registry {
    fn remove(&mut self, id: u64) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|l| l.id != id);
        self.listeners.len() != before
    }
}

#[derive(Clone, Default)]
pub struct RealtimeBridge {
    registry: Arc<Mutex<Registry>>,
}

impl RealtimeBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(
        &self,
        channel: impl Into<String>,
        filter: EventFilter,
        on_event: F,
    ) -> Subscription
    where
        F: Fn(&RealtimeEvent) + Send + Sync + 'static,
    {
        let channel = channel.into();
        let mut registry = self.registry.lock();
        registry.next_id += 1;
        let id = registry.next_id;
        registry.listeners.push(Listener {
            id,
            channel: channel.clone(),
            filter,
            callback: Arc::new(on_event),
        });
        tracing::debug!(id, channel = %channel, "realtime subscribe");
        Subscription {
            id,
            channel,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Release `subscription` now rather than at the end of its owning scope.
    pub fn unsubscribe(&self, subscription: Subscription) {
        drop(subscription);
    }

    /// Invoke every listener on `channel` whose filter accepts `event`, in registration
    /// order. Returns how many listeners ran.
    pub fn deliver(&self, channel: &str, event: &RealtimeEvent) -> usize {
        let callbacks: Vec<Callback> = {
            let registry = self.registry.lock();
            registry
                .listeners
                .iter()
                .filter(|l| l.channel == channel && l.filter.matches(event))
                .map(|l| l.callback.clone())
                .collect()
        };
        // Lock is released so callbacks may subscribe or unsubscribe.
        for callback in &callbacks {
            callback(event);
        }
        callbacks.len()
    }

    /// Parse a raw change payload and deliver it on `channel`.
    pub fn deliver_payload(&self, channel: &str, json: &str) -> Result<usize, PayloadError> {
        let event = parse_change_payload(json)?;
        Ok(self.deliver(channel, &event))
    }

    pub fn subscription_count(&self) -> usize {
        self.registry.lock().listeners.len()
    }
}

/// Live registration on a [`RealtimeBridge`]. Dropping it unregisters the listener.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    channel: String,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("channel", &self.channel)
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            if registry.lock().remove(self.id) {
                tracing::debug!(id = self.id, channel = %self.channel, "realtime unsubscribe");
            }
        }
    }
}
