// Applying pushed change events to session state.

use agora_storage_traits::messages::types::DeliveryState;
use agora_storage_traits::objects::types::CachedObject;

use super::*;
use crate::realtime::{ChangeKind, Notification, RealtimeEvent, RealtimeRecord};

impl AppCore {
    pub(super) fn handle_realtime(&mut self, event: RealtimeEvent) {
        if self.session.is_none() {
            return;
        }
        match event.record {
            RealtimeRecord::Message(message) => self.on_remote_message(event.change, message),
            RealtimeRecord::MessageDeleted {
                message_id,
                chat_id,
            } => self.on_remote_delete(&message_id, &chat_id),
            RealtimeRecord::Receipt {
                message_id,
                chat_id,
                user_id,
                state,
            } => self.on_receipt(&message_id, &chat_id, &user_id, state),
            RealtimeRecord::Post(post) => self.on_post_change(event.change, post),
            RealtimeRecord::Notification(n) => self.on_notification(event.change, n),
        }
    }

    fn on_remote_message(&mut self, change: ChangeKind, message: Message) {
        let Some(sess) = self.session.as_mut() else {
            return;
        };
        if change == ChangeKind::Delete {
            let (id, chat_id) = (message.id, message.chat_id);
            self.on_remote_delete(&id, &chat_id);
            return;
        }
        if !sess.chats.contains_key(&message.chat_id) {
            // A chat we haven't seen yet; the list fetch brings it and its messages.
            tracing::debug!(chat_id = %message.chat_id, "message for unknown chat");
            self.refresh_chats();
            return;
        }

        let is_new = !sess.messages.contains_key(&message.id);
        let incoming = message.sender_id != sess.user_id;
        let chat_id = message.chat_id.clone();
        if is_new && incoming && sess.current_chat.as_deref() != Some(chat_id.as_str()) {
            *sess.unread.entry(chat_id.clone()).or_insert(0) += 1;
        }
        if !is_new {
            tracing::debug!(message_id = %message.id, "confirmation for known message");
        }

        self.merge_remote(message);
        self.cache_chat_messages(&chat_id);
        self.publish();
    }

    fn on_remote_delete(&mut self, message_id: &str, chat_id: &str) {
        let removed = self
            .session
            .as_mut()
            .and_then(|s| s.messages.remove(message_id))
            .is_some();
        let before = self.state.scheduled.len();
        self.state.scheduled.retain(|s| s.id != message_id);
        if removed || before != self.state.scheduled.len() {
            self.cache_chat_messages(chat_id);
            self.publish();
        }
    }

    fn on_receipt(&mut self, message_id: &str, chat_id: &str, user_id: &str, state: DeliveryState) {
        let Some(sess) = self.session.as_mut() else {
            return;
        };
        let me = sess.user_id.clone();
        let recipients = sess
            .chats
            .get(chat_id)
            .map(|c| c.recipients_of(&me))
            .unwrap_or_default();
        let Some(m) = sess.messages.get_mut(message_id) else {
            return;
        };

        let changed = if m.sender_id == me {
            // Never our own receipt on our own message.
            user_id != me && m.apply_receipt(user_id, state, &recipients)
        } else if user_id == me {
            m.delivery.advance(state)
        } else {
            false
        };

        if changed {
            self.cache_chat_messages(chat_id);
            self.publish();
        }
    }

    fn on_post_change(&mut self, change: ChangeKind, post: Post) {
        if change != ChangeKind::Delete {
            if let Err(e) = self.objects.put(CachedObject::Post(post.clone())) {
                tracing::debug!(%e, "object cache write failed");
            }
        }
        let Some(sess) = self.session.as_mut() else {
            return;
        };

        let pos = sess.feed.iter().position(|p| p.id == post.id);
        let changed = match (change, pos) {
            (ChangeKind::Delete, Some(i)) => {
                sess.feed.remove(i);
                true
            }
            (ChangeKind::Delete, None) => false,
            (_, Some(i)) => {
                // Replays of the same row are no-ops.
                if sess.feed[i] != post {
                    sess.feed[i] = post;
                    true
                } else {
                    false
                }
            }
            // Updates to posts outside the loaded page are ignored.
            (ChangeKind::Update, None) => false,
            (ChangeKind::Insert, None) => {
                sess.feed.insert(0, post);
                true
            }
        };
        if changed {
            let tab = sess.feed_tab;
            self.local_cache.put_feed(tab, &sess.feed);
            self.publish();
        }
    }

    fn on_notification(&mut self, change: ChangeKind, notification: Notification) {
        let Some(sess) = self.session.as_ref() else {
            return;
        };
        if notification.user_id != sess.user_id {
            return;
        }
        let list = &mut self.state.notifications;
        let pos = list.iter().position(|n| n.id == notification.id);
        match (change, pos) {
            (ChangeKind::Delete, Some(i)) => {
                list.remove(i);
            }
            (ChangeKind::Delete, None) => return,
            (_, Some(i)) => {
                if list[i] == notification {
                    return;
                }
                list[i] = notification;
            }
            (_, None) => {
                list.insert(0, notification);
                list.truncate(MAX_NOTIFICATIONS);
            }
        }
        self.emit_state();
    }
}
