mod local;
mod objects;

pub use local::{keys, LocalCache, TtlPolicy};
pub use objects::{ObjectCache, DEFAULT_MAX_AGE};
