//! Chats module
//!
//! Direct and group conversations. Chat rows are fetched from the backend and cached as a
//! per-user chat list snapshot.

pub mod types;
