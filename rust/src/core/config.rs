use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::{TtlPolicy, DEFAULT_MAX_AGE};

const DEFAULT_MESSAGE_PAGE_SIZE: u32 = 50;
const DEFAULT_FEED_PAGE_SIZE: u32 = 20;
const MAX_PAGE_SIZE: u32 = 500;

pub(crate) const CONFIG_FILE: &str = "agora_config.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StorageKind {
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct CacheTtlOverrides {
    pub(crate) feed_secs: Option<u64>,
    pub(crate) chat_list_secs: Option<u64>,
    pub(crate) messages_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct AppConfig {
    pub(crate) backend_url: Option<String>,
    pub(crate) backend_anon_key: Option<String>,
    pub(crate) storage_backend: Option<String>,
    pub(crate) message_page_size: Option<u32>,
    pub(crate) feed_page_size: Option<u32>,
    pub(crate) cache_ttl_overrides: Option<CacheTtlOverrides>,
    pub(crate) object_cache_max_age_secs: Option<u64>,
}

pub(crate) fn load_app_config(data_dir: &str) -> AppConfig {
    let path = Path::new(data_dir).join(CONFIG_FILE);
    let Ok(bytes) = std::fs::read(&path) else {
        return AppConfig::default();
    };
    match serde_json::from_slice::<AppConfig>(&bytes) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(%e, path = %path.display(), "ignoring malformed config");
            AppConfig::default()
        }
    }
}

pub(crate) fn default_app_config_json() -> String {
    let defaults = TtlPolicy::default();
    let config = AppConfig {
        backend_url: None,
        backend_anon_key: None,
        storage_backend: Some("sqlite".to_string()),
        message_page_size: Some(DEFAULT_MESSAGE_PAGE_SIZE),
        feed_page_size: Some(DEFAULT_FEED_PAGE_SIZE),
        cache_ttl_overrides: Some(CacheTtlOverrides {
            feed_secs: Some(defaults.feed.as_secs()),
            chat_list_secs: Some(defaults.chat_list.as_secs()),
            messages_secs: Some(defaults.messages.as_secs()),
        }),
        object_cache_max_age_secs: Some(DEFAULT_MAX_AGE.as_secs()),
    };
    serde_json::to_string_pretty(&config).unwrap_or_else(|_| "{}".to_string())
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl AppConfig {
    pub(crate) fn backend_url(&self) -> Option<&str> {
        non_empty(&self.backend_url)
    }

    pub(crate) fn backend_anon_key(&self) -> &str {
        non_empty(&self.backend_anon_key).unwrap_or_default()
    }

    pub(crate) fn storage_kind(&self) -> StorageKind {
        match non_empty(&self.storage_backend) {
            Some(s) if s.eq_ignore_ascii_case("memory") => StorageKind::Memory,
            _ => StorageKind::Sqlite,
        }
    }

    pub(crate) fn message_page_size(&self) -> u32 {
        self.message_page_size
            .unwrap_or(DEFAULT_MESSAGE_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }

    pub(crate) fn feed_page_size(&self) -> u32 {
        self.feed_page_size
            .unwrap_or(DEFAULT_FEED_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }

    pub(crate) fn ttl_policy(&self) -> TtlPolicy {
        let mut policy = TtlPolicy::default();
        if let Some(o) = &self.cache_ttl_overrides {
            if let Some(s) = o.feed_secs {
                policy.feed = Duration::from_secs(s);
            }
            if let Some(s) = o.chat_list_secs {
                policy.chat_list = Duration::from_secs(s);
            }
            if let Some(s) = o.messages_secs {
                policy.messages = Duration::from_secs(s);
            }
        }
        policy
    }

    pub(crate) fn object_cache_max_age(&self) -> Duration {
        self.object_cache_max_age_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_MAX_AGE)
    }
}
