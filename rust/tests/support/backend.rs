#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use agora_core::backend::{Backend, FeedTab};
use agora_core::error::BackendError;
use agora_core::DeliveryState;
use agora_storage_traits::chats::types::{Chat, ParticipantRef};
use agora_storage_traits::messages::types::{Message, ScheduledMessage};
use agora_storage_traits::objects::types::{Post, Profile};
use async_trait::async_trait;
use tokio::sync::watch;

/// In-process stand-in for the hosted backend.
///
/// Keeps rows in memory, records every call, can be scripted to fail per operation (or per
/// target chat for forwards), and can hold inserts until the test releases them.
pub struct FakeBackend {
    chats: Mutex<Vec<Chat>>,
    messages: Mutex<Vec<Message>>,
    scheduled: Mutex<Vec<ScheduledMessage>>,
    posts: Mutex<Vec<Post>>,
    profiles: Mutex<HashMap<String, Profile>>,
    calls: Mutex<Vec<String>>,
    failures: Mutex<HashMap<String, BackendError>>,
    chat_fetch_delays: Mutex<VecDeque<Duration>>,
    token: Mutex<Option<String>>,
    insert_gate: watch::Sender<bool>,
}

impl Default for FakeBackend {
    fn default() -> Self {
        let (insert_gate, _) = watch::channel(true);
        Self {
            chats: Mutex::new(vec![]),
            messages: Mutex::new(vec![]),
            scheduled: Mutex::new(vec![]),
            posts: Mutex::new(vec![]),
            profiles: Mutex::new(HashMap::new()),
            calls: Mutex::new(vec![]),
            failures: Mutex::new(HashMap::new()),
            chat_fetch_delays: Mutex::new(VecDeque::new()),
            token: Mutex::new(None),
            insert_gate,
        }
    }
}

impl FakeBackend {
    pub fn set_chats(&self, chats: Vec<Chat>) {
        *self.chats.lock().unwrap() = chats;
    }

    pub fn add_message(&self, message: Message) {
        self.messages.lock().unwrap().push(message);
    }

    pub fn set_posts(&self, posts: Vec<Post>) {
        *self.posts.lock().unwrap() = posts;
    }

    pub fn set_profile(&self, profile: Profile) {
        self.profiles
            .lock()
            .unwrap()
            .insert(profile.id.clone(), profile);
    }

    /// Every later call to `op` fails with `err` until [`FakeBackend::succeed`].
    ///
    /// `op` is a method name, or `forward_messages:{chat_id}` for a single forward target.
    pub fn fail(&self, op: &str, err: BackendError) {
        self.failures.lock().unwrap().insert(op.to_string(), err);
    }

    pub fn succeed(&self, op: &str) {
        self.failures.lock().unwrap().remove(op);
    }

    /// The next `fetch_chats` sleeps for `delay` after reading its rows.
    pub fn delay_next_chat_fetch(&self, delay: Duration) {
        self.chat_fetch_delays.lock().unwrap().push_back(delay);
    }

    /// Park `insert_message` calls until [`FakeBackend::release_inserts`].
    pub fn hold_inserts(&self) {
        self.insert_gate.send_replace(false);
    }

    pub fn release_inserts(&self) {
        self.insert_gate.send_replace(true);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, op: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.split(' ').next() == Some(op))
            .count()
    }

    pub fn stored_messages(&self) -> Vec<Message> {
        self.messages.lock().unwrap().clone()
    }

    pub fn stored_scheduled(&self) -> Vec<ScheduledMessage> {
        self.scheduled.lock().unwrap().clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.token.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn check(&self, op: &str) -> Result<(), BackendError> {
        match self.failures.lock().unwrap().get(op) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn update_message<F>(&self, message_id: &str, f: F) -> Result<(), BackendError>
    where
        F: FnOnce(&mut Message),
    {
        let mut messages = self.messages.lock().unwrap();
        let m = messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| BackendError::new("PGRST116", "no rows returned"))?;
        f(m);
        Ok(())
    }
}

#[async_trait]
impl Backend for FakeBackend {
    fn set_access_token(&self, token: Option<String>) {
        *self.token.lock().unwrap() = token;
    }

    async fn fetch_chats(&self, user_id: &str) -> Result<Vec<Chat>, BackendError> {
        let rows: Vec<Chat> = self
            .chats
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.has_participant(user_id))
            .cloned()
            .collect();
        let delay = self.chat_fetch_delays.lock().unwrap().pop_front();
        self.record(format!("fetch_chats {user_id}"));
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check("fetch_chats")?;
        Ok(rows)
    }

    async fn fetch_messages(&self, chat_id: &str, limit: u32) -> Result<Vec<Message>, BackendError> {
        self.record(format!("fetch_messages {chat_id}"));
        self.check("fetch_messages")?;
        let mut rows: Vec<Message> = self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn insert_message(&self, message: &Message) -> Result<(), BackendError> {
        self.record(format!("insert_message {}", message.id));
        let mut gate = self.insert_gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;
        self.check("insert_message")?;

        let mut messages = self.messages.lock().unwrap();
        if messages.iter().any(|m| m.id == message.id) {
            return Err(BackendError::new(
                "23505",
                "duplicate key value violates unique constraint \"messages_pkey\"",
            ));
        }
        let mut row = message.clone();
        row.delivery = DeliveryState::Sent;
        row.failure_reason = None;
        messages.push(row);
        Ok(())
    }

    async fn schedule_message(&self, message: &ScheduledMessage) -> Result<(), BackendError> {
        self.record(format!("schedule_message {}", message.id));
        self.check("schedule_message")?;
        self.scheduled.lock().unwrap().push(message.clone());
        Ok(())
    }

    async fn update_message_content(
        &self,
        message_id: &str,
        content: &str,
        edited_at: i64,
    ) -> Result<(), BackendError> {
        self.record(format!("update_message_content {message_id}"));
        self.check("update_message_content")?;
        self.update_message(message_id, |m| {
            m.content = content.to_string();
            m.edited_at = Some(edited_at);
        })
    }

    async fn hide_message_for(&self, message_id: &str, user_id: &str) -> Result<(), BackendError> {
        self.record(format!("hide_message_for {message_id}"));
        self.check("hide_message_for")?;
        self.update_message(message_id, |m| {
            m.deleted_for.insert(user_id.to_string());
        })
    }

    async fn delete_message(&self, message_id: &str) -> Result<(), BackendError> {
        self.record(format!("delete_message {message_id}"));
        self.check("delete_message")?;
        self.messages.lock().unwrap().retain(|m| m.id != message_id);
        Ok(())
    }

    async fn set_starred(
        &self,
        message_id: &str,
        user_id: &str,
        starred: bool,
    ) -> Result<(), BackendError> {
        self.record(format!("set_starred {message_id} {starred}"));
        self.check("set_starred")?;
        self.update_message(message_id, |m| {
            if starred {
                m.starred_by.insert(user_id.to_string());
            } else {
                m.starred_by.remove(user_id);
            }
        })
    }

    async fn mark_read(&self, message_id: &str, user_id: &str) -> Result<(), BackendError> {
        self.record(format!("mark_read {message_id}"));
        self.check("mark_read")?;
        self.update_message(message_id, |m| {
            m.receipts.insert(user_id.to_string(), DeliveryState::Read);
        })
    }

    async fn forward_messages(
        &self,
        target_chat_id: &str,
        messages: &[Message],
    ) -> Result<(), BackendError> {
        self.record(format!("forward_messages {target_chat_id}"));
        self.check("forward_messages")?;
        self.check(&format!("forward_messages:{target_chat_id}"))?;
        let mut rows = self.messages.lock().unwrap();
        for m in messages {
            let mut row = m.clone();
            row.delivery = DeliveryState::Sent;
            rows.push(row);
        }
        Ok(())
    }

    async fn fetch_feed(&self, tab: FeedTab, limit: u32) -> Result<Vec<Post>, BackendError> {
        self.record(format!("fetch_feed {}", tab.as_str()));
        self.check("fetch_feed")?;
        let mut posts = self.posts.lock().unwrap().clone();
        posts.truncate(limit as usize);
        Ok(posts)
    }

    async fn fetch_profile(&self, user_id: &str) -> Result<Option<Profile>, BackendError> {
        self.record(format!("fetch_profile {user_id}"));
        self.check("fetch_profile")?;
        Ok(self.profiles.lock().unwrap().get(user_id).cloned())
    }
}

// Fixture builders

pub fn participant(user_id: &str) -> ParticipantRef {
    ParticipantRef {
        user_id: user_id.to_string(),
        display_name: Some(user_id.to_uppercase()),
        avatar: None,
    }
}

pub fn direct_chat(id: &str, a: &str, b: &str) -> Chat {
    Chat {
        id: id.to_string(),
        is_group: false,
        name: None,
        participants: vec![participant(a), participant(b)],
        pinned_by: BTreeSet::new(),
        auto_delete_secs: None,
        last_message_at: None,
    }
}

pub fn group_chat(id: &str, name: &str, members: &[&str]) -> Chat {
    Chat {
        id: id.to_string(),
        is_group: true,
        name: Some(name.to_string()),
        participants: members.iter().map(|m| participant(m)).collect(),
        pinned_by: BTreeSet::new(),
        auto_delete_secs: None,
        last_message_at: None,
    }
}

pub fn message(id: &str, chat_id: &str, sender_id: &str, content: &str, created_at: i64) -> Message {
    Message {
        id: id.to_string(),
        chat_id: chat_id.to_string(),
        sender_id: sender_id.to_string(),
        content: content.to_string(),
        media: vec![],
        created_at,
        edited_at: None,
        deleted_for: BTreeSet::new(),
        starred_by: BTreeSet::new(),
        expires_at: None,
        forwarded_from: None,
        delivery: DeliveryState::Sent,
        receipts: BTreeMap::new(),
        failure_reason: None,
    }
}

pub fn post(id: &str, author_id: &str, content: &str, like_count: u64) -> Post {
    Post {
        id: id.to_string(),
        author_id: author_id.to_string(),
        content: content.to_string(),
        media: vec![],
        hashtags: vec![],
        like_count,
        comment_count: 0,
        created_at: 1_000,
        updated_at: None,
    }
}
