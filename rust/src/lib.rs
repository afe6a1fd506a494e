mod actions;
pub mod backend;
pub mod cache;
pub mod clock;
mod core;
pub mod error;
mod logging;
pub mod media;
pub mod rate_limit;
pub mod realtime;
mod state;
mod updates;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;

use agora_storage_traits::rate_limit::RateLimitStorage;
use agora_storage_traits::AgoraStorageProvider;
use flume::{Receiver, Sender};

use crate::backend::{Backend, RestBackend};
use crate::cache::{LocalCache, ObjectCache};
use crate::clock::SharedClock;
use crate::error::{CoreError, Connectivity};
use crate::media::MediaUrls;
use crate::rate_limit::{RateLimitConfig, RateLimitDecision, RateLimiter};
use crate::realtime::RealtimeBridge;

pub use actions::AppAction;
pub use agora_storage_traits::messages::types::{DeleteScope, DeliveryState, MediaRef};
pub use backend::FeedTab;
pub use logging::init_logging;
pub use state::*;
pub use updates::*;

/// Return the default `agora_config.json` payload used when no config file exists.
pub fn default_config_json() -> String {
    core::default_app_config_json()
}

pub trait AppReconciler: Send + Sync + 'static {
    fn reconcile(&self, update: AppUpdate);
}

/// Overrides for the pieces [`AgoraApp`] otherwise builds from `agora_config.json`.
#[derive(Default)]
pub struct AppOptions {
    pub backend: Option<Arc<dyn Backend>>,
    pub clock: Option<SharedClock>,
    pub storage: Option<Arc<dyn AgoraStorageProvider>>,
}

pub struct AgoraApp {
    core_tx: Sender<CoreMsg>,
    update_rx: Receiver<AppUpdate>,
    listening: AtomicBool,
    shared_state: Arc<RwLock<AppState>>,
    realtime: RealtimeBridge,
    connectivity: Connectivity,
    rate_limiter: RateLimiter,
    objects: ObjectCache,
    actor: parking_lot::Mutex<Option<thread::JoinHandle<()>>>,
}

impl AgoraApp {
    /// Build the app against the backend named in `<data_dir>/agora_config.json`.
    pub fn new(data_dir: &str) -> Result<Arc<Self>, CoreError> {
        Self::with_options(data_dir, AppOptions::default())
    }

    pub fn with_backend(data_dir: &str, backend: Arc<dyn Backend>) -> Result<Arc<Self>, CoreError> {
        let options = AppOptions {
            backend: Some(backend),
            ..AppOptions::default()
        };
        Self::with_options(data_dir, options)
    }

    pub fn with_options(data_dir: &str, options: AppOptions) -> Result<Arc<Self>, CoreError> {
        logging::init_logging(data_dir);
        tracing::info!(data_dir = %data_dir, "AgoraApp::new() starting");

        let config = core::load_app_config(data_dir);
        let media = match config.backend_url() {
            Some(url) => Some(MediaUrls::new(url)?),
            None => None,
        };
        let backend: Arc<dyn Backend> = match options.backend {
            Some(backend) => backend,
            None => {
                let url = config.backend_url().ok_or_else(|| {
                    CoreError::Config("backend_url is not set in agora_config.json".into())
                })?;
                Arc::new(RestBackend::new(url, config.backend_anon_key()))
            }
        };
        let clock = options.clock.unwrap_or_else(clock::system_clock);
        let store = options
            .storage
            .unwrap_or_else(|| core::open_storage(data_dir, &config));

        let (update_tx, update_rx) = flume::unbounded();
        let (core_tx, core_rx) = flume::unbounded::<CoreMsg>();
        let shared_state = Arc::new(RwLock::new(AppState::empty()));
        let realtime = RealtimeBridge::new();
        let connectivity = Connectivity::default();
        let limits: Arc<dyn RateLimitStorage + Send + Sync> = store.clone();
        let rate_limiter = RateLimiter::new(limits, clock.clone());
        let objects = ObjectCache::new(store.clone(), clock.clone(), config.object_cache_max_age());
        let local_cache = LocalCache::new(store, clock.clone(), config.ttl_policy());

        let deps = core::CoreDeps {
            update_sender: update_tx,
            core_sender: core_tx.clone(),
            shared_state: shared_state.clone(),
            config,
            backend,
            local_cache,
            objects: objects.clone(),
            realtime: realtime.clone(),
            connectivity: connectivity.clone(),
            clock,
            media,
        };

        // Actor loop thread (single threaded "app actor").
        let actor = thread::Builder::new()
            .name("agora-core".into())
            .spawn(move || {
                let mut core = core::AppCore::new(deps);
                while let Ok(msg) = core_rx.recv() {
                    let stop = matches!(msg, CoreMsg::Shutdown);
                    core.handle_message(msg);
                    if stop {
                        break;
                    }
                }
            })
            .map_err(|e| CoreError::Config(format!("failed to start core thread: {e}")))?;

        Ok(Arc::new(Self {
            core_tx,
            update_rx,
            listening: AtomicBool::new(false),
            shared_state,
            realtime,
            connectivity,
            rate_limiter,
            objects,
            actor: parking_lot::Mutex::new(Some(actor)),
        }))
    }

    pub fn state(&self) -> AppState {
        match self.shared_state.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    pub fn dispatch(&self, action: AppAction) {
        // Contract: never block caller.
        let _ = self.core_tx.send(CoreMsg::Action(action));
    }

    pub fn listen_for_updates(&self, reconciler: Box<dyn AppReconciler>) {
        if self
            .listening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // Avoid multiple listeners that would split messages.
            return;
        }

        let rx = self.update_rx.clone();
        thread::spawn(move || {
            while let Ok(update) = rx.recv() {
                reconciler.reconcile(update);
            }
        });
    }

    /// Where the host's realtime transport delivers change events.
    pub fn realtime(&self) -> &RealtimeBridge {
        &self.realtime
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    pub fn object_cache(&self) -> &ObjectCache {
        &self.objects
    }

    /// Record an attempt at a sensitive action (OTP request, login) before calling the backend.
    pub fn check_rate_limit(
        &self,
        action: &str,
        identifier: &str,
        config: &RateLimitConfig,
    ) -> RateLimitDecision {
        self.rate_limiter.check_and_record(action, identifier, config)
    }

    pub fn reset_rate_limit(&self, action: &str, identifier: &str) {
        self.rate_limiter.reset(action, identifier);
    }

    /// Stop the actor and wait for it to exit. Pending actions are processed first.
    pub fn shutdown(&self) {
        let _ = self.core_tx.send(CoreMsg::Shutdown);
        if let Some(handle) = self.actor.lock().take() {
            if handle.join().is_err() {
                tracing::error!("core thread panicked");
            }
        }
    }
}

impl Drop for AgoraApp {
    fn drop(&mut self) {
        let _ = self.core_tx.send(CoreMsg::Shutdown);
    }
}
