// Local storage wiring + projection of session data into AppState.

use std::path::Path;

use agora_memory_storage::AgoraMemoryStorage;
use agora_sqlite_storage::AgoraSqliteStorage;
use agora_storage_traits::messages::types::MediaRef;
use agora_storage_traits::AgoraStorageProvider;

use super::config::StorageKind;
use super::*;
use crate::media::ImageTransform;
use crate::state::{ChatMessage, ChatSummary, ChatViewState, FeedItem, MediaView};

const DB_FILE: &str = "agora.db";

/// Open the configured local store. A sqlite store that cannot be opened degrades to memory
/// so the app still runs, just without persistence.
pub(crate) fn open_storage(data_dir: &str, config: &AppConfig) -> Arc<dyn AgoraStorageProvider> {
    match config.storage_kind() {
        StorageKind::Memory => Arc::new(AgoraMemoryStorage::new()),
        StorageKind::Sqlite => {
            let path = Path::new(data_dir).join(DB_FILE);
            match AgoraSqliteStorage::new(&path) {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    tracing::warn!(%e, path = %path.display(), "sqlite open failed; using memory storage");
                    Arc::new(AgoraMemoryStorage::new())
                }
            }
        }
    }
}

impl AppCore {
    pub(super) fn refresh_views(&mut self) {
        let now = self.clock.now_ms();
        let Some(sess) = self.session.as_ref() else {
            self.state.chat_list = vec![];
            self.state.current_chat = None;
            self.state.feed = vec![];
            return;
        };

        self.state.chat_list = project_chat_list(sess, now);
        self.state.current_chat = sess
            .current_chat
            .as_ref()
            .and_then(|id| sess.chats.get(id))
            .map(|chat| ChatViewState {
                chat_id: chat.id.clone(),
                is_group: chat.is_group,
                title: chat_title(chat, &sess.user_id),
                auto_delete_secs: chat.auto_delete().map(|d| d.as_secs()),
                messages: visible_messages(sess, &chat.id, now)
                    .into_iter()
                    .map(|m| self.chat_message(m, &sess.user_id))
                    .collect(),
            });
        self.state.feed = sess.feed.iter().map(|p| self.feed_item(p)).collect();

        self.reschedule_expiry(now);
    }

    fn chat_message(&self, m: &Message, me: &str) -> ChatMessage {
        ChatMessage {
            id: m.id.clone(),
            sender_id: m.sender_id.clone(),
            content: m.content.clone(),
            media: m.media.iter().map(|r| self.media_view(r)).collect(),
            created_at: m.created_at,
            edited_at: m.edited_at,
            expires_at: m.expires_at,
            forwarded_from: m.forwarded_from.clone(),
            is_mine: m.sender_id == me,
            is_starred: m.is_starred_by(me),
            delivery: m.delivery,
            failure_reason: m.failure_reason.clone(),
        }
    }

    fn feed_item(&self, p: &Post) -> FeedItem {
        FeedItem {
            post_id: p.id.clone(),
            author_id: p.author_id.clone(),
            content: p.content.clone(),
            media: p.media.iter().map(|r| self.media_view(r)).collect(),
            hashtags: p.hashtags.clone(),
            like_count: p.like_count,
            comment_count: p.comment_count,
            created_at: p.created_at,
        }
    }

    pub(super) fn media_view(&self, media: &MediaRef) -> MediaView {
        match &self.media {
            Some(urls) => MediaView {
                url: urls.public_url(media),
                thumbnail_url: media
                    .is_image()
                    .then(|| urls.transformed_url(media, &ImageTransform::THUMBNAIL)),
                mime_type: media.mime_type.clone(),
            },
            None => MediaView {
                url: format!("{}/{}", media.bucket, media.path),
                thumbnail_url: None,
                mime_type: media.mime_type.clone(),
            },
        }
    }

    /// Arm a single timer for the next disappearing message so the views drop it on time.
    fn reschedule_expiry(&mut self, now: i64) {
        let next = self.session.as_ref().and_then(|sess| {
            sess.messages
                .values()
                .filter(|m| !m.deleted_for.contains(&sess.user_id))
                .filter_map(|m| m.expires_at)
                .filter(|at| *at > now)
                .min()
        });

        if self.expiry_timer.as_ref().map(|t| t.deadline) == next {
            return;
        }
        if let Some(old) = self.expiry_timer.take() {
            old.handle.abort();
        }
        let Some(deadline) = next else {
            return;
        };

        let tx = self.core_sender.clone();
        let clock = self.clock.clone();
        let handle = self.runtime.spawn(async move {
            let wait = (deadline - clock.now_ms()).max(0) as u64;
            tokio::time::sleep(std::time::Duration::from_millis(wait)).await;
            let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::ExpiryTick {
                deadline,
            })));
        });
        self.expiry_timer = Some(ExpiryTimer { deadline, handle });
    }

    pub(super) fn cancel_expiry_timer(&mut self) {
        if let Some(timer) = self.expiry_timer.take() {
            timer.handle.abort();
        }
    }

    /// Write the chat's current page back to the local cache.
    pub(super) fn cache_chat_messages(&self, chat_id: &str) {
        let Some(sess) = self.session.as_ref() else {
            return;
        };
        let mut page: Vec<Message> = sess
            .messages
            .values()
            .filter(|m| m.chat_id == chat_id)
            .cloned()
            .collect();
        page.sort_by(|a, b| b.display_order_cmp(a));
        page.truncate(self.config.message_page_size() as usize);
        self.local_cache.put_messages(chat_id, &page);
    }

    pub(super) fn cache_chat_list(&self) {
        let Some(sess) = self.session.as_ref() else {
            return;
        };
        let chats: Vec<Chat> = sess.chats.values().cloned().collect();
        self.local_cache.put_chat_list(&sess.user_id, &chats);
    }
}

fn visible_messages<'a>(sess: &'a Session, chat_id: &str, now: i64) -> Vec<&'a Message> {
    let mut out: Vec<&Message> = sess
        .messages
        .values()
        .filter(|m| m.chat_id == chat_id && m.is_visible_to(&sess.user_id, now))
        .collect();
    out.sort_by(|a, b| a.display_order_cmp(b));
    out
}

fn chat_title(chat: &Chat, me: &str) -> Option<String> {
    if chat.is_group {
        return chat.name.clone();
    }
    chat.peer_of(me)
        .map(|p| p.display_name.clone().unwrap_or_else(|| p.user_id.clone()))
}

fn project_chat_list(sess: &Session, now: i64) -> Vec<ChatSummary> {
    let mut list: Vec<ChatSummary> = sess
        .chats
        .values()
        .map(|chat| {
            let newest = visible_messages(sess, &chat.id, now).pop();
            let last_message_at = match (newest.map(|m| m.created_at), chat.last_message_at) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (a, b) => a.or(b),
            };
            ChatSummary {
                chat_id: chat.id.clone(),
                is_group: chat.is_group,
                title: chat_title(chat, &sess.user_id),
                last_message: newest.map(|m| m.content.clone()),
                last_message_at,
                unread_count: sess.unread.get(&chat.id).copied().unwrap_or(0),
                is_pinned: chat.is_pinned_by(&sess.user_id),
            }
        })
        .collect();

    // Pinned first, then most recent activity; chats without activity sink.
    list.sort_by(|a, b| {
        b.is_pinned
            .cmp(&a.is_pinned)
            .then_with(|| match (a.last_message_at, b.last_message_at) {
                (Some(x), Some(y)) => y.cmp(&x),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            })
            .then_with(|| a.chat_id.cmp(&b.chat_id))
    });
    list
}
