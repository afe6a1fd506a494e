#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use agora_core::clock::{Clock, ManualClock};
use agora_core::{AgoraApp, AppAction, AppOptions, AppReconciler, AppState, AppUpdate};
use agora_memory_storage::AgoraMemoryStorage;
use agora_storage_traits::AgoraStorageProvider;
use tempfile::TempDir;

use super::backend::{direct_chat, group_chat, message, FakeBackend};

pub const ME: &str = "alice";
pub const START_MS: i64 = 1_700_000_000_000;
pub const TIMEOUT: Duration = Duration::from_secs(5);

pub fn wait_until(what: &str, timeout: Duration, f: impl FnMut() -> bool) {
    wait_until_with_poll(what, timeout, Duration::from_millis(20), f);
}

pub fn wait_until_with_poll(
    what: &str,
    timeout: Duration,
    poll: Duration,
    mut f: impl FnMut() -> bool,
) {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if f() {
            return;
        }
        std::thread::sleep(poll);
    }
    panic!("{what}: condition not met within {timeout:?}");
}

pub fn write_config(data_dir: &str) {
    let path = std::path::Path::new(data_dir).join("agora_config.json");
    let v = serde_json::json!({
        "backend_url": "https://agora.test",
        "storage_backend": "memory",
    });
    std::fs::write(path, serde_json::to_vec(&v).unwrap()).unwrap();
}

#[derive(Clone)]
pub struct Collector(pub Arc<Mutex<Vec<AppUpdate>>>);

impl Collector {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(Vec::new())))
    }

    pub fn last_toast(&self) -> Option<String> {
        self.0.lock().unwrap().iter().rev().find_map(|u| match u {
            AppUpdate::FullState(s) => s.toast.clone(),
        })
    }

    pub fn revs(&self) -> Vec<u64> {
        self.0.lock().unwrap().iter().map(|u| u.rev()).collect()
    }

    /// Every snapshot seen so far, oldest first.
    pub fn states(&self) -> Vec<AppState> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .map(|u| match u {
                AppUpdate::FullState(s) => s.clone(),
            })
            .collect()
    }
}

impl AppReconciler for Collector {
    fn reconcile(&self, update: AppUpdate) {
        self.0.lock().unwrap().push(update);
    }
}

/// A running app wired to a [`FakeBackend`], memory storage and a manual clock.
pub struct Harness {
    pub app: Arc<AgoraApp>,
    pub backend: Arc<FakeBackend>,
    pub clock: Arc<ManualClock>,
    pub storage: Arc<AgoraMemoryStorage>,
    pub updates: Collector,
    _dir: TempDir,
}

impl Harness {
    pub fn new(backend: FakeBackend) -> Self {
        Self::with_shared_backend(Arc::new(backend))
    }

    /// A second app over the same backend rows, e.g. another participant's device.
    pub fn with_shared_backend(backend: Arc<FakeBackend>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().to_string_lossy().to_string();
        write_config(&data_dir);

        let clock = ManualClock::new(START_MS);
        let storage = Arc::new(AgoraMemoryStorage::new());
        let shared_clock: Arc<dyn Clock> = clock.clone();
        let shared_store: Arc<dyn AgoraStorageProvider> = storage.clone();
        let app = AgoraApp::with_options(
            &data_dir,
            AppOptions {
                backend: Some(backend.clone()),
                clock: Some(shared_clock),
                storage: Some(shared_store),
            },
        )
        .unwrap();
        let updates = Collector::new();
        app.listen_for_updates(Box::new(updates.clone()));

        Self {
            app,
            backend,
            clock,
            storage,
            updates,
            _dir: dir,
        }
    }

    /// Signed in as [`ME`] with the standard fixture loaded.
    pub fn signed_in() -> Self {
        let h = Self::new(fixture_backend());
        h.sign_in();
        h
    }

    pub fn sign_in(&self) {
        self.sign_in_as(ME, 3);
    }

    pub fn sign_in_as(&self, user_id: &str, expected_chats: usize) {
        self.app.dispatch(AppAction::StartSession {
            user_id: user_id.into(),
            access_token: format!("token-{user_id}"),
        });
        self.wait("chat list loaded", |s| {
            s.chat_list.len() == expected_chats && !s.busy.loading_chats
        });
    }

    pub fn open_chat(&self, chat_id: &str) {
        self.app.dispatch(AppAction::OpenChat {
            chat_id: chat_id.into(),
        });
        self.wait("chat opened", |s| {
            s.current_chat.as_ref().is_some_and(|c| c.chat_id == chat_id)
                && !s.busy.loading_messages
        });
    }

    pub fn send_text(&self, chat_id: &str, content: &str) {
        self.app.dispatch(AppAction::SendMessage {
            chat_id: chat_id.into(),
            content: content.into(),
            attachments: vec![],
            scheduled_for: None,
            auto_delete_secs: None,
        });
    }

    pub fn state(&self) -> AppState {
        self.app.state()
    }

    /// Poll `state()` until `f` holds and return the matching snapshot.
    pub fn wait(&self, what: &str, mut f: impl FnMut(&AppState) -> bool) -> AppState {
        let mut last = None;
        wait_until(what, TIMEOUT, || {
            let s = self.app.state();
            let ok = f(&s);
            last = Some(s);
            ok
        });
        last.unwrap()
    }

    pub fn wait_for_toast(&self, what: &str) -> String {
        self.wait(what, |s| s.toast.is_some()).toast.unwrap()
    }

    pub fn clear_toast(&self) {
        self.app.dispatch(AppAction::ClearToast);
        self.wait("toast cleared", |s| s.toast.is_none());
    }
}

/// Alice has a direct chat with Bob (one incoming message), a direct chat with Carol and a
/// group with both.
pub fn fixture_backend() -> FakeBackend {
    let backend = FakeBackend::default();
    backend.set_chats(vec![
        direct_chat("dm-bob", ME, "bob"),
        direct_chat("dm-carol", ME, "carol"),
        group_chat("group", "Weekend", &[ME, "bob", "carol"]),
    ]);
    backend.add_message(message("m-bob-1", "dm-bob", "bob", "hey alice", START_MS - 60_000));
    backend
}
