//! Messages module
//!
//! Chat messages, their delivery state machine and the scheduled-send queue entry. Messages
//! are owned by the backend; the client keeps copies in its session state and in the per-chat
//! message cache.

pub mod types;
