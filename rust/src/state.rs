use agora_storage_traits::messages::types::{DeliveryState, ScheduledMessage};

use crate::realtime::Notification;

#[derive(Clone, Debug, PartialEq)]
pub struct AppState {
    pub rev: u64,
    pub session: SessionState,
    pub online: bool,
    pub my_profile: Option<ProfileView>,
    pub busy: BusyState,
    pub chat_list: Vec<ChatSummary>,
    pub current_chat: Option<ChatViewState>,
    /// Messages waiting for the backend's publisher.
    pub scheduled: Vec<ScheduledMessage>,
    pub feed: Vec<FeedItem>,
    pub notifications: Vec<Notification>,
    pub last_forward: Option<ForwardReport>,
    pub toast: Option<String>,
}

impl AppState {
    pub fn empty() -> Self {
        Self {
            rev: 0,
            session: SessionState::SignedOut,
            online: true,
            my_profile: None,
            busy: BusyState::idle(),
            chat_list: vec![],
            current_chat: None,
            scheduled: vec![],
            feed: vec![],
            notifications: vec![],
            last_forward: None,
            toast: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    SignedOut,
    SignedIn { user_id: String },
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BusyState {
    pub loading_chats: bool,
    pub loading_messages: bool,
    pub loading_feed: bool,
}

impl BusyState {
    pub fn idle() -> Self {
        Self::default()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProfileView {
    pub user_id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub is_premium: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatSummary {
    pub chat_id: String,
    pub is_group: bool,
    /// Group name, or the peer's display name for direct chats.
    pub title: Option<String>,
    pub last_message: Option<String>,
    pub last_message_at: Option<i64>,
    pub unread_count: u32,
    pub is_pinned: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatViewState {
    pub chat_id: String,
    pub is_group: bool,
    pub title: Option<String>,
    pub auto_delete_secs: Option<u64>,
    /// Oldest first; hidden and expired messages are excluded.
    pub messages: Vec<ChatMessage>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: String,
    pub sender_id: String,
    pub content: String,
    pub media: Vec<MediaView>,
    pub created_at: i64,
    pub edited_at: Option<i64>,
    pub expires_at: Option<i64>,
    pub forwarded_from: Option<String>,
    pub is_mine: bool,
    pub is_starred: bool,
    pub delivery: DeliveryState,
    pub failure_reason: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaView {
    pub url: String,
    pub thumbnail_url: Option<String>,
    pub mime_type: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedItem {
    pub post_id: String,
    pub author_id: String,
    pub content: String,
    pub media: Vec<MediaView>,
    pub hashtags: Vec<String>,
    pub like_count: u64,
    pub comment_count: u64,
    pub created_at: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForwardOutcome {
    pub chat_id: String,
    pub ok: bool,
    /// Classified user-facing message when `ok` is false.
    pub error: Option<String>,
}

/// Per-target result of the last forward request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForwardReport {
    pub message_ids: Vec<String>,
    pub outcomes: Vec<ForwardOutcome>,
}

impl ForwardReport {
    pub fn succeeded(&self, chat_id: &str) -> Option<bool> {
        self.outcomes
            .iter()
            .find(|o| o.chat_id == chat_id)
            .map(|o| o.ok)
    }

    pub fn success_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.ok).count()
    }
}
