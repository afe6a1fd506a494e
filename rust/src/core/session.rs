// Session lifecycle + fetch side effects.

use agora_storage_traits::messages::types::MediaRef;
use agora_storage_traits::objects::types::{CachedObject, Profile};

use super::*;
use crate::realtime::{channels, EventFilter, RealtimeEvent};
use crate::state::{ProfileView, SessionState};

const AVATAR_BUCKET: &str = "avatars";

impl AppCore {
    pub(super) fn start_session(
        &mut self,
        user_id: String,
        access_token: String,
    ) -> Result<(), CoreError> {
        let user_id = user_id.trim().to_string();
        if user_id.is_empty() {
            return Err(CoreError::Validation("user id is required".into()));
        }

        // Tear down any existing session first.
        self.end_session();

        tracing::info!(user_id = %user_id, "start_session");
        let token = access_token.trim();
        self.backend
            .set_access_token((!token.is_empty()).then(|| token.to_string()));

        let subscriptions = [
            channels::messages(&user_id),
            channels::notifications(&user_id),
            channels::POSTS.to_string(),
        ]
        .into_iter()
        .map(|channel| {
            let tx = self.core_sender.clone();
            self.realtime
                .subscribe(channel, EventFilter::all(), move |event: &RealtimeEvent| {
                    let _ = tx.send(CoreMsg::Internal(Box::new(InternalEvent::Realtime(
                        event.clone(),
                    ))));
                })
        })
        .collect();

        let mut sess = Session {
            user_id: user_id.clone(),
            _subscriptions: subscriptions,
            chats: HashMap::new(),
            messages: HashMap::new(),
            current_chat: None,
            unread: HashMap::new(),
            feed_tab: FeedTab::default(),
            feed: vec![],
            pending_reads: HashSet::new(),
        };

        // Warm start from the local cache; the fetches below replace it.
        if let Some(chats) = self.local_cache.chat_list(&user_id) {
            let ids: Vec<String> = chats.iter().map(|c| c.id.clone()).collect();
            sess.chats = chats.into_iter().map(|c| (c.id.clone(), c)).collect();
            for page in self.local_cache.message_pages(&ids).into_iter().flatten() {
                for m in page {
                    sess.messages.insert(m.id.clone(), m);
                }
            }
        }
        if let Some(posts) = self.local_cache.feed(sess.feed_tab) {
            sess.feed = posts;
        }
        tracing::debug!(
            chats = sess.chats.len(),
            messages = sess.messages.len(),
            "warm start from cache"
        );

        self.session = Some(sess);
        self.state.session = SessionState::SignedIn {
            user_id: user_id.clone(),
        };
        self.state.my_profile = self.local_cache.profile(&user_id).map(|p| self.profile_view(&p));
        self.publish();

        self.refresh_chats();
        self.refresh_feed(FeedTab::default());
        self.refresh_my_profile();
        Ok(())
    }

    pub(super) fn end_session(&mut self) {
        // Results of in-flight requests belong to the old session.
        self.chats_token += 1;
        self.messages_token += 1;
        self.feed_token += 1;
        self.profile_token += 1;
        self.cancel_expiry_timer();

        if let Some(sess) = self.session.take() {
            tracing::info!(user_id = %sess.user_id, "end_session");
            self.backend.set_access_token(None);
            // Dropping the session releases its realtime subscriptions.
            drop(sess);
        }

        let online = self.state.online;
        let rev = self.state.rev;
        self.state = AppState::empty();
        self.state.online = online;
        self.state.rev = rev;
    }

    /// Re-fetch everything that may have changed while the app was away or offline.
    pub(super) fn resync(&mut self) {
        let Some(sess) = self.session.as_ref() else {
            return;
        };
        let tab = sess.feed_tab;
        let current = sess.current_chat.clone();
        self.refresh_chats();
        if let Some(chat_id) = current {
            self.fetch_messages(&chat_id);
        }
        self.refresh_feed(tab);
    }

    pub(super) fn refresh_chats(&mut self) {
        let Some(sess) = self.session.as_ref() else {
            return;
        };
        self.chats_token += 1;
        let token = self.chats_token;
        let user_id = sess.user_id.clone();
        self.state.busy.loading_chats = true;
        self.emit_state();

        let backend = self.backend.clone();
        let connectivity = self.connectivity.clone();
        self.spawn_internal(async move {
            let result = when_online(connectivity, backend.fetch_chats(&user_id)).await;
            InternalEvent::ChatsFetched {
                token,
                user_id,
                result,
            }
        });
    }

    pub(super) fn on_chats_fetched(
        &mut self,
        token: u64,
        user_id: &str,
        result: Result<Vec<Chat>, BackendError>,
    ) {
        if token != self.chats_token {
            tracing::debug!(token, current = self.chats_token, "stale chat list ignored");
            return;
        }
        self.state.busy.loading_chats = false;
        let Some(sess) = self.session.as_mut().filter(|s| s.user_id == user_id) else {
            return;
        };

        let chats = match result {
            Ok(chats) => chats,
            Err(e) => {
                tracing::warn!(%e, "fetch chats failed");
                self.publish();
                self.report_backend(e);
                return;
            }
        };

        let previous: Vec<String> = sess.chats.keys().cloned().collect();
        sess.chats = chats
            .into_iter()
            .filter_map(|chat| match chat.validate() {
                Ok(()) => Some((chat.id.clone(), chat)),
                Err(e) => {
                    tracing::warn!(%e, "skipping malformed chat");
                    None
                }
            })
            .collect();
        let known = &sess.chats;
        sess.messages.retain(|_, m| known.contains_key(&m.chat_id));
        sess.unread.retain(|id, _| known.contains_key(id));
        if sess
            .current_chat
            .as_ref()
            .is_some_and(|id| !known.contains_key(id))
        {
            sess.current_chat = None;
        }

        // Chats we no longer belong to keep nothing on disk.
        for chat_id in previous.iter().filter(|id| !known.contains_key(*id)) {
            self.local_cache.invalidate_messages(chat_id);
        }

        self.cache_chat_list();
        self.publish();
    }

    pub(super) fn open_chat(&mut self, chat_id: String) -> Result<(), CoreError> {
        let sess = self.session.as_mut().ok_or(CoreError::NotSignedIn)?;
        if !sess.chats.contains_key(&chat_id) {
            return Err(CoreError::NotFound(format!("chat {chat_id}")));
        }
        sess.current_chat = Some(chat_id.clone());
        sess.unread.remove(&chat_id);

        if let Some(page) = self.local_cache.messages(&chat_id) {
            for m in page {
                sess.messages.entry(m.id.clone()).or_insert(m);
            }
        }

        self.publish();
        self.fetch_messages(&chat_id);
        Ok(())
    }

    pub(super) fn fetch_messages(&mut self, chat_id: &str) {
        self.messages_token += 1;
        let token = self.messages_token;
        self.state.busy.loading_messages = true;
        self.emit_state();

        let backend = self.backend.clone();
        let connectivity = self.connectivity.clone();
        let chat_id = chat_id.to_string();
        let limit = self.config.message_page_size();
        self.spawn_internal(async move {
            let result =
                when_online(connectivity, backend.fetch_messages(&chat_id, limit)).await;
            InternalEvent::MessagesFetched {
                token,
                chat_id,
                result,
            }
        });
    }

    pub(super) fn on_messages_fetched(
        &mut self,
        token: u64,
        chat_id: &str,
        result: Result<Vec<Message>, BackendError>,
    ) {
        if token != self.messages_token {
            tracing::debug!(token, chat_id, "stale message page ignored");
            return;
        }
        self.state.busy.loading_messages = false;
        if self.session.is_none() {
            return;
        }

        match result {
            Ok(page) => {
                for m in page.into_iter().filter(|m| m.chat_id == chat_id) {
                    self.merge_remote(m);
                }
                self.cache_chat_messages(chat_id);
                self.publish();
            }
            Err(e) => {
                tracing::warn!(%e, chat_id, "fetch messages failed");
                self.publish();
                self.report_backend(e);
            }
        }
    }

    pub(super) fn refresh_feed(&mut self, tab: FeedTab) {
        let Some(sess) = self.session.as_mut() else {
            return;
        };
        if sess.feed_tab != tab {
            sess.feed_tab = tab;
            sess.feed = self.local_cache.feed(tab).unwrap_or_default();
        }
        self.feed_token += 1;
        let token = self.feed_token;
        self.state.busy.loading_feed = true;
        self.publish();

        let backend = self.backend.clone();
        let connectivity = self.connectivity.clone();
        let limit = self.config.feed_page_size();
        self.spawn_internal(async move {
            let result = when_online(connectivity, backend.fetch_feed(tab, limit)).await;
            InternalEvent::FeedFetched { token, tab, result }
        });
    }

    pub(super) fn on_feed_fetched(
        &mut self,
        token: u64,
        tab: FeedTab,
        result: Result<Vec<Post>, BackendError>,
    ) {
        if token != self.feed_token {
            return;
        }
        self.state.busy.loading_feed = false;
        let Some(sess) = self.session.as_mut() else {
            return;
        };

        match result {
            Ok(posts) => {
                self.local_cache.put_feed(tab, &posts);
                for post in &posts {
                    if let Err(e) = self.objects.put(CachedObject::Post(post.clone())) {
                        tracing::debug!(%e, "object cache write failed");
                    }
                }
                sess.feed = posts;
                self.publish();
            }
            Err(e) => {
                tracing::warn!(%e, tab = tab.as_str(), "fetch feed failed");
                self.publish();
                self.report_backend(e);
            }
        }
    }

    pub(super) fn refresh_my_profile(&mut self) {
        let Some(sess) = self.session.as_ref() else {
            return;
        };
        self.profile_token += 1;
        let token = self.profile_token;
        let user_id = sess.user_id.clone();

        let backend = self.backend.clone();
        let connectivity = self.connectivity.clone();
        self.spawn_internal(async move {
            let result = when_online(connectivity, backend.fetch_profile(&user_id)).await;
            InternalEvent::ProfileFetched {
                token,
                user_id,
                result,
            }
        });
    }

    pub(super) fn on_profile_fetched(
        &mut self,
        token: u64,
        user_id: &str,
        result: Result<Option<Profile>, BackendError>,
    ) {
        if token != self.profile_token {
            return;
        }
        match result {
            Ok(Some(profile)) => {
                self.local_cache.put_profile(&profile);
                if let Err(e) = self.objects.put(CachedObject::Profile(profile.clone())) {
                    tracing::debug!(%e, "object cache write failed");
                }
                self.state.my_profile = Some(self.profile_view(&profile));
                self.emit_state();
            }
            Ok(None) => {
                self.local_cache.invalidate_profile(user_id);
                if self.state.my_profile.take().is_some() {
                    self.emit_state();
                }
            }
            // Cached profile stays on screen; nothing for the user to act on.
            Err(e) => tracing::warn!(%e, "fetch profile failed"),
        }
    }

    fn profile_view(&self, profile: &Profile) -> ProfileView {
        ProfileView {
            user_id: profile.id.clone(),
            username: profile.username.clone(),
            display_name: profile.display_name.clone(),
            avatar_url: profile.avatar.as_ref().map(|path| {
                self.media_view(&MediaRef {
                    bucket: AVATAR_BUCKET.to_string(),
                    path: path.clone(),
                    mime_type: "image/*".to_string(),
                })
                .url
            }),
            is_premium: profile.is_premium,
        }
    }
}
