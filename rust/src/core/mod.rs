mod config;
mod messages;
mod realtime;
mod session;
mod storage;

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, RwLock};

use agora_storage_traits::chats::types::Chat;
use agora_storage_traits::messages::types::Message;
use agora_storage_traits::objects::types::Post;
use flume::Sender;

use crate::actions::AppAction;
use crate::backend::{Backend, FeedTab};
use crate::cache::{LocalCache, ObjectCache};
use crate::clock::SharedClock;
use crate::error::{classify, BackendError, CoreError, Connectivity};
use crate::media::MediaUrls;
use crate::realtime::{RealtimeBridge, Subscription};
use crate::state::AppState;
use crate::updates::{AppUpdate, CoreMsg, InternalEvent};

pub(crate) use config::{default_app_config_json, load_app_config, AppConfig};
pub(crate) use storage::open_storage;

const MAX_MESSAGE_CHARS: usize = 4_000;
const MAX_NOTIFICATIONS: usize = 100;

/// Everything the actor needs that is also shared with the facade.
pub(crate) struct CoreDeps {
    pub(crate) update_sender: Sender<AppUpdate>,
    pub(crate) core_sender: Sender<CoreMsg>,
    pub(crate) shared_state: Arc<RwLock<AppState>>,
    pub(crate) config: AppConfig,
    pub(crate) backend: Arc<dyn Backend>,
    pub(crate) local_cache: LocalCache,
    pub(crate) objects: ObjectCache,
    pub(crate) realtime: RealtimeBridge,
    pub(crate) connectivity: Connectivity,
    pub(crate) clock: SharedClock,
    pub(crate) media: Option<MediaUrls>,
}

struct Session {
    user_id: String,
    // Held for their Drop: ending the session unsubscribes.
    _subscriptions: Vec<Subscription>,
    chats: HashMap<String, Chat>,
    /// Every known message of every chat, by id.
    messages: HashMap<String, Message>,
    current_chat: Option<String>,
    unread: HashMap<String, u32>,
    feed_tab: FeedTab,
    feed: Vec<Post>,
    pending_reads: HashSet<String>,
}

struct ExpiryTimer {
    deadline: i64,
    handle: tokio::task::JoinHandle<()>,
}

pub struct AppCore {
    pub state: AppState,
    rev: u64,
    last_outgoing_ts: i64,
    update_sender: Sender<AppUpdate>,
    core_sender: Sender<CoreMsg>,
    shared_state: Arc<RwLock<AppState>>,
    config: AppConfig,
    runtime: tokio::runtime::Runtime,
    backend: Arc<dyn Backend>,
    local_cache: LocalCache,
    objects: ObjectCache,
    realtime: RealtimeBridge,
    connectivity: Connectivity,
    clock: SharedClock,
    media: Option<MediaUrls>,
    session: Option<Session>,
    // Request generations; a result carrying an older token is ignored.
    chats_token: u64,
    messages_token: u64,
    feed_token: u64,
    profile_token: u64,
    expiry_timer: Option<ExpiryTimer>,
}

impl AppCore {
    pub(crate) fn new(deps: CoreDeps) -> Self {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_time()
            .enable_io()
            .build()
            .expect("tokio runtime");

        let mut state = AppState::empty();
        state.online = deps.connectivity.is_online();

        let this = Self {
            state,
            rev: 0,
            last_outgoing_ts: 0,
            update_sender: deps.update_sender,
            core_sender: deps.core_sender,
            shared_state: deps.shared_state,
            config: deps.config,
            runtime,
            backend: deps.backend,
            local_cache: deps.local_cache,
            objects: deps.objects,
            realtime: deps.realtime,
            connectivity: deps.connectivity,
            clock: deps.clock,
            media: deps.media,
            session: None,
            chats_token: 0,
            messages_token: 0,
            feed_token: 0,
            profile_token: 0,
            expiry_timer: None,
        };

        if let Err(e) = this.objects.init() {
            tracing::warn!(%e, "object cache init failed; will retry on first use");
        }

        // Ensure AgoraApp::state() has an immediately-available snapshot.
        let snapshot = this.state.clone();
        this.commit_state_snapshot(&snapshot);
        this
    }

    fn next_rev(&mut self) -> u64 {
        self.rev += 1;
        self.state.rev = self.rev;
        self.rev
    }

    fn commit_state_snapshot(&self, snapshot: &AppState) {
        match self.shared_state.write() {
            Ok(mut g) => *g = snapshot.clone(),
            Err(poison) => *poison.into_inner() = snapshot.clone(),
        }
    }

    fn emit_state(&mut self) {
        self.next_rev();
        let snapshot = self.state.clone();
        self.commit_state_snapshot(&snapshot);
        let _ = self.update_sender.send(AppUpdate::FullState(snapshot));
    }

    /// Rebuild every projection from the session and emit.
    fn publish(&mut self) {
        self.refresh_views();
        self.emit_state();
    }

    fn toast(&mut self, msg: impl Into<String>) {
        // Kept until the host clears it, so a resync via state() still shows it.
        self.state.toast = Some(msg.into());
        self.emit_state();
    }

    /// Classify `err` and surface it as a toast.
    fn report(&mut self, err: CoreError) {
        let classified = classify(&err, &self.connectivity);
        tracing::info!(code = classified.code, %err, "operation failed");
        self.toast(classified.user_message);
    }

    fn report_backend(&mut self, err: BackendError) {
        self.report(CoreError::Backend(err));
    }

    fn user_id(&self) -> Result<String, CoreError> {
        self.session
            .as_ref()
            .map(|s| s.user_id.clone())
            .ok_or(CoreError::NotSignedIn)
    }

    /// Strictly increasing local timestamps so rapid sends keep their order.
    fn next_outgoing_ts(&mut self) -> i64 {
        let now = self.clock.now_ms();
        let ts = now.max(self.last_outgoing_ts + 1);
        self.last_outgoing_ts = ts;
        ts
    }

    /// Run `fut` on the runtime and feed its result back into the actor.
    fn spawn_internal<F>(&self, fut: F)
    where
        F: Future<Output = InternalEvent> + Send + 'static,
    {
        let tx = self.core_sender.clone();
        self.runtime.spawn(async move {
            let event = fut.await;
            let _ = tx.send(CoreMsg::Internal(Box::new(event)));
        });
    }

    pub fn handle_message(&mut self, msg: CoreMsg) {
        match msg {
            CoreMsg::Action(action) => {
                // Never log `?action` directly: it can contain tokens and message text.
                tracing::info!(action = action.tag(), "dispatch");
                self.handle_action(action);
            }
            CoreMsg::Internal(internal) => self.handle_internal(*internal),
            CoreMsg::Shutdown => self.shutdown(),
        }
    }

    pub fn shutdown(&mut self) {
        self.end_session();
        tracing::info!("core shut down");
    }

    fn handle_action(&mut self, action: AppAction) {
        let result = match action {
            AppAction::StartSession {
                user_id,
                access_token,
            } => self.start_session(user_id, access_token),
            AppAction::EndSession => {
                self.end_session();
                self.emit_state();
                Ok(())
            }
            AppAction::RefreshChats => self.user_id().map(|_| self.refresh_chats()),
            AppAction::OpenChat { chat_id } => self.open_chat(chat_id),
            AppAction::CloseChat => {
                if let Some(sess) = self.session.as_mut() {
                    if sess.current_chat.take().is_some() {
                        self.messages_token += 1;
                        self.state.busy.loading_messages = false;
                        self.publish();
                    }
                }
                Ok(())
            }
            AppAction::SendMessage {
                chat_id,
                content,
                attachments,
                scheduled_for,
                auto_delete_secs,
            } => self.send_message(chat_id, content, attachments, scheduled_for, auto_delete_secs),
            AppAction::RetryMessage {
                chat_id,
                message_id,
            } => self.retry_message(&chat_id, &message_id),
            AppAction::EditMessage {
                message_id,
                content,
            } => self.edit_message(message_id, content),
            AppAction::DeleteMessage { message_id, scope } => {
                self.delete_message(message_id, scope)
            }
            AppAction::StarMessage { message_id } => self.set_starred(message_id, true),
            AppAction::UnstarMessage { message_id } => self.set_starred(message_id, false),
            AppAction::ForwardMessages {
                message_ids,
                target_chat_ids,
            } => self.forward_messages(message_ids, target_chat_ids),
            AppAction::MarkRead { message_id } => self.mark_read(message_id),
            AppAction::RefreshFeed { tab } => self.user_id().map(|_| self.refresh_feed(tab)),
            AppAction::NetworkChanged { online } => {
                let changed = self.connectivity.set_online(online);
                if self.state.online != online || changed {
                    self.state.online = online;
                    tracing::info!(online, "connectivity changed");
                    if online {
                        self.resync();
                    }
                    self.emit_state();
                }
                Ok(())
            }
            AppAction::Foregrounded => {
                // The host sends lifecycle signals as actions; Rust owns the state changes.
                self.resync();
                Ok(())
            }
            AppAction::ClearToast => {
                if self.state.toast.is_some() {
                    self.state.toast = None;
                    self.emit_state();
                }
                Ok(())
            }
        };

        if let Err(e) = result {
            self.report(e);
        }
    }

    fn handle_internal(&mut self, internal: InternalEvent) {
        match internal {
            InternalEvent::ChatsFetched {
                token,
                user_id,
                result,
            } => self.on_chats_fetched(token, &user_id, result),
            InternalEvent::MessagesFetched {
                token,
                chat_id,
                result,
            } => self.on_messages_fetched(token, &chat_id, result),
            InternalEvent::FeedFetched { token, tab, result } => {
                self.on_feed_fetched(token, tab, result)
            }
            InternalEvent::ProfileFetched {
                token,
                user_id,
                result,
            } => self.on_profile_fetched(token, &user_id, result),
            InternalEvent::SendResult { message_id, result } => {
                self.on_send_result(&message_id, result)
            }
            InternalEvent::ScheduleResult { message, result } => {
                self.on_schedule_result(message, result)
            }
            InternalEvent::EditResult {
                message_id,
                content,
                edited_at,
                result,
            } => self.on_edit_result(&message_id, content, edited_at, result),
            InternalEvent::DeleteResult {
                message_id,
                scope,
                result,
            } => self.on_delete_result(&message_id, scope, result),
            InternalEvent::StarResult {
                message_id,
                starred,
                result,
            } => self.on_star_result(&message_id, starred, result),
            InternalEvent::MarkReadResult { message_id, result } => {
                self.on_mark_read_result(&message_id, result)
            }
            InternalEvent::ForwardFinished {
                message_ids,
                attempts,
            } => self.on_forward_finished(message_ids, attempts),
            InternalEvent::Realtime(event) => self.handle_realtime(event),
            InternalEvent::ExpiryTick { deadline } => {
                if self
                    .expiry_timer
                    .as_ref()
                    .is_some_and(|t| t.deadline == deadline)
                {
                    self.expiry_timer = None;
                }
                if self.session.is_some() {
                    tracing::debug!(deadline, "disappearing messages due");
                    self.publish();
                }
            }
        }
    }
}

/// Fail fast with a network error while offline instead of waiting on the transport.
async fn when_online<T, F>(connectivity: Connectivity, call: F) -> Result<T, BackendError>
where
    F: Future<Output = Result<T, BackendError>>,
{
    if !connectivity.is_online() {
        return Err(BackendError::network("offline"));
    }
    call.await
}
