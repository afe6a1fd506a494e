//! The hosted backend as seen by the core: table reads, mutations and RPCs.

mod rest;

use std::collections::BTreeSet;

use agora_storage_traits::chats::types::Chat;
use agora_storage_traits::messages::types::{DeliveryState, MediaRef, Message, ScheduledMessage};
use agora_storage_traits::objects::types::{Post, Profile};
use async_trait::async_trait;
use serde::Deserialize;

use crate::error::BackendError;

pub use rest::RestBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FeedTab {
    #[default]
    ForYou,
    Following,
    Trending,
}

impl FeedTab {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedTab::ForYou => "for_you",
            FeedTab::Following => "following",
            FeedTab::Trending => "trending",
        }
    }
}

/// Query/mutation interface of the hosted backend.
///
/// Row-level authorization happens server-side; a rejected call comes back as a
/// [`BackendError`] carrying the backend's code.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Credentials for subsequent calls. `None` signs out.
    fn set_access_token(&self, _token: Option<String>) {}

    async fn fetch_chats(&self, user_id: &str) -> Result<Vec<Chat>, BackendError>;

    /// Newest `limit` messages of `chat_id`, in any order.
    async fn fetch_messages(&self, chat_id: &str, limit: u32) -> Result<Vec<Message>, BackendError>;

    /// Insert a message whose id was generated by the client.
    async fn insert_message(&self, message: &Message) -> Result<(), BackendError>;

    async fn schedule_message(&self, message: &ScheduledMessage) -> Result<(), BackendError>;

    async fn update_message_content(
        &self,
        message_id: &str,
        content: &str,
        edited_at: i64,
    ) -> Result<(), BackendError>;

    /// Add `user_id` to the message's `deleted_for` set.
    async fn hide_message_for(&self, message_id: &str, user_id: &str) -> Result<(), BackendError>;

    /// Hard delete for every participant.
    async fn delete_message(&self, message_id: &str) -> Result<(), BackendError>;

    async fn set_starred(
        &self,
        message_id: &str,
        user_id: &str,
        starred: bool,
    ) -> Result<(), BackendError>;

    async fn mark_read(&self, message_id: &str, user_id: &str) -> Result<(), BackendError>;

    /// Insert copies of `messages` into `target_chat_id`. All or nothing for that chat.
    async fn forward_messages(
        &self,
        target_chat_id: &str,
        messages: &[Message],
    ) -> Result<(), BackendError>;

    async fn fetch_feed(&self, tab: FeedTab, limit: u32) -> Result<Vec<Post>, BackendError>;

    async fn fetch_profile(&self, user_id: &str) -> Result<Option<Profile>, BackendError>;
}

/// A `messages` row as returned by the backend. Rows carry no local-only fields.
#[derive(Deserialize)]
pub(crate) struct MessageRecord {
    id: String,
    chat_id: String,
    sender_id: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    media: Vec<MediaRef>,
    created_at: i64,
    #[serde(default)]
    edited_at: Option<i64>,
    #[serde(default)]
    deleted_for: BTreeSet<String>,
    #[serde(default)]
    starred_by: BTreeSet<String>,
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    forwarded_from: Option<String>,
    #[serde(default = "default_delivery")]
    delivery: DeliveryState,
}

fn default_delivery() -> DeliveryState {
    DeliveryState::Sent
}

impl From<MessageRecord> for Message {
    fn from(r: MessageRecord) -> Self {
        Message {
            id: r.id,
            chat_id: r.chat_id,
            sender_id: r.sender_id,
            content: r.content,
            media: r.media,
            created_at: r.created_at,
            edited_at: r.edited_at,
            deleted_for: r.deleted_for,
            starred_by: r.starred_by,
            expires_at: r.expires_at,
            forwarded_from: r.forwarded_from,
            delivery: r.delivery,
            receipts: Default::default(),
            failure_reason: None,
        }
    }
}
