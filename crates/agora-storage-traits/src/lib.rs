//! Agora storage - storage provider traits and shared domain types for the Agora client core.
//!
//! The client keeps two kinds of local state, both advisory copies of what the hosted backend
//! owns:
//!
//! - a string key/value store ([`kv::KeyValueStorage`]) used for TTL-stamped snapshots of
//!   profiles, feeds, chat lists and per-chat message pages
//! - a versioned multi-collection object store ([`objects::ObjectStorage`]) holding posts,
//!   profiles, reels, pages and stories keyed by id
//!
//! Rate-limit counters ([`rate_limit::RateLimitStorage`]) live next to them so that lockouts
//! survive a reload.
//!
//! All timestamps in this crate are Unix milliseconds.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

pub mod chats;
pub mod error;
pub mod kv;
pub mod messages;
pub mod objects;
pub mod rate_limit;
#[cfg(feature = "test-utils")]
pub mod test_utils;

pub use error::StorageError;

use self::kv::KeyValueStorage;
use self::objects::ObjectStorage;
use self::rate_limit::RateLimitStorage;

/// Backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    /// Memory
    Memory,
    /// SQLite
    SQLite,
}

impl Backend {
    /// Check if it's a persistent backend
    ///
    /// All values different from [`Backend::Memory`] are considered persistent
    pub fn is_persistent(&self) -> bool {
        !matches!(self, Self::Memory)
    }
}

/// Storage provider for the Agora client core.
///
/// Implementors provide the local key/value store, the structured object cache and the
/// rate-limit counter table. Every method takes `&self`; implementations are expected to use
/// interior locking so a single provider can be shared behind an `Arc` between the app actor
/// and the rate limiter.
pub trait AgoraStorageProvider:
    KeyValueStorage + ObjectStorage + RateLimitStorage + Send + Sync
{
    /// Returns the backend type.
    fn backend(&self) -> Backend;
}
