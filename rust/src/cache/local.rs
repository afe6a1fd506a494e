use std::sync::Arc;
use std::time::Duration;

use agora_storage_traits::chats::types::Chat;
use agora_storage_traits::kv::types::CachedEntry;
use agora_storage_traits::kv::KeyValueStorage;
use agora_storage_traits::messages::types::Message;
use agora_storage_traits::objects::types::{Post, Profile};
use agora_storage_traits::AgoraStorageProvider;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::backend::FeedTab;
use crate::clock::SharedClock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    pub feed: Duration,
    pub chat_list: Duration,
    pub messages: Duration,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            feed: Duration::from_secs(5 * 60),
            chat_list: Duration::from_secs(2 * 60),
            messages: Duration::from_secs(60),
        }
    }
}

pub mod keys {
    use crate::backend::FeedTab;

    pub fn profile(user_id: &str) -> String {
        format!("profile:{user_id}")
    }

    pub fn feed(tab: FeedTab) -> String {
        format!("feed:{}", tab.as_str())
    }

    pub fn chat_list(user_id: &str) -> String {
        format!("chat_list:{user_id}")
    }

    pub fn messages(chat_id: &str) -> String {
        format!("messages:{chat_id}")
    }
}

/// TTL-aware snapshots over the key/value store.
///
/// Each key holds one JSON [`CachedEntry`], so a payload and its expiry are written together.
/// Reads never fail: unreadable, expired or unavailable entries are misses.
#[derive(Clone)]
pub struct LocalCache {
    store: Arc<dyn AgoraStorageProvider>,
    clock: SharedClock,
    ttl: TtlPolicy,
}

impl LocalCache {
    pub fn new(store: Arc<dyn AgoraStorageProvider>, clock: SharedClock, ttl: TtlPolicy) -> Self {
        Self { store, clock, ttl }
    }

    fn encode<T: Serialize>(&self, data: &T, ttl: Option<Duration>) -> Option<String> {
        let entry = CachedEntry::new(data, self.clock.now_ms(), ttl);
        match serde_json::to_string(&entry) {
            Ok(json) => Some(json),
            Err(e) => {
                tracing::warn!(%e, "cache encode failed");
                None
            }
        }
    }

    fn decode<T: DeserializeOwned>(&self, key: &str, raw: &str) -> Option<T> {
        let entry: CachedEntry<T> = match serde_json::from_str(raw) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!(key, %e, "cache entry unreadable; treating as miss");
                self.remove(key);
                return None;
            }
        };
        let now = self.clock.now_ms();
        if !entry.is_valid(now) {
            tracing::debug!(key, "cache entry expired");
            self.remove(key);
            return None;
        }
        Some(entry.data)
    }

    /// Store `data` under `key`. `ttl = None` keeps it until invalidated.
    pub fn put<T: Serialize>(&self, key: &str, data: &T, ttl: Option<Duration>) -> bool {
        let Some(json) = self.encode(data, ttl) else {
            return false;
        };
        match self.store.kv_set(key, &json) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(key, %e, "cache write failed");
                false
            }
        }
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.store.kv_get(key) {
            Ok(Some(raw)) => self.decode(key, &raw),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(key, %e, "cache read failed");
                None
            }
        }
    }

    /// One slot per key, in order.
    pub fn get_many<T: DeserializeOwned>(&self, keys: &[String]) -> Vec<Option<T>> {
        let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        match self.store.kv_multi_get(&refs) {
            Ok(raws) => raws
                .into_iter()
                .zip(keys)
                .map(|(raw, key)| raw.and_then(|raw| self.decode(key, &raw)))
                .collect(),
            Err(e) => {
                tracing::warn!(count = keys.len(), %e, "cache batch read failed");
                keys.iter().map(|_| None).collect()
            }
        }
    }

    pub fn remove(&self, key: &str) {
        if let Err(e) = self.store.kv_remove(key) {
            tracing::warn!(key, %e, "cache remove failed");
        }
    }

    pub fn put_profile(&self, profile: &Profile) {
        self.put(&keys::profile(&profile.id), profile, None);
    }

    pub fn profile(&self, user_id: &str) -> Option<Profile> {
        self.get(&keys::profile(user_id))
    }

    pub fn invalidate_profile(&self, user_id: &str) {
        self.remove(&keys::profile(user_id));
    }

    pub fn put_feed(&self, tab: FeedTab, posts: &[Post]) {
        self.put(&keys::feed(tab), &posts, Some(self.ttl.feed));
    }

    pub fn feed(&self, tab: FeedTab) -> Option<Vec<Post>> {
        self.get(&keys::feed(tab))
    }

    pub fn put_chat_list(&self, user_id: &str, chats: &[Chat]) {
        self.put(&keys::chat_list(user_id), &chats, Some(self.ttl.chat_list));
    }

    pub fn chat_list(&self, user_id: &str) -> Option<Vec<Chat>> {
        self.get(&keys::chat_list(user_id))
    }

    pub fn put_messages(&self, chat_id: &str, messages: &[Message]) {
        self.put(&keys::messages(chat_id), &messages, Some(self.ttl.messages));
    }

    pub fn messages(&self, chat_id: &str) -> Option<Vec<Message>> {
        self.get(&keys::messages(chat_id))
    }

    pub fn message_pages(&self, chat_ids: &[String]) -> Vec<Option<Vec<Message>>> {
        let cache_keys: Vec<String> = chat_ids.iter().map(|c| keys::messages(c)).collect();
        self.get_many(&cache_keys)
    }

    pub fn invalidate_messages(&self, chat_id: &str) {
        self.remove(&keys::messages(chat_id));
    }
}
