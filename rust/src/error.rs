use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use agora_storage_traits::StorageError;

const RAW_MESSAGE_LIMIT: usize = 120;

/// Stable error taxonomy surfaced to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Auth,
    Validation,
    Permission,
    Conflict,
    Network,
    NotFound,
    RateLimited,
    Unknown,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Auth => "auth_error",
            ErrorKind::Validation => "validation_error",
            ErrorKind::Permission => "permission_error",
            ErrorKind::Conflict => "conflict_error",
            ErrorKind::Network => "network_error",
            ErrorKind::NotFound => "not_found_error",
            ErrorKind::RateLimited => "rate_limited_error",
            ErrorKind::Unknown => "unknown_error",
        }
    }

    fn default_message(&self) -> &'static str {
        match self {
            ErrorKind::Auth => "Your session has expired. Please sign in again.",
            ErrorKind::Validation => "Please check your input and try again.",
            ErrorKind::Permission => "You don't have permission to do that.",
            ErrorKind::Conflict => "That conflicts with existing data.",
            ErrorKind::Network => "You appear to be offline. Check your connection and try again.",
            ErrorKind::NotFound => "We couldn't find what you were looking for.",
            ErrorKind::RateLimited => "Too many attempts. Please wait and try again.",
            ErrorKind::Unknown => "Something went wrong.",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Raw error reported by the hosted backend or by the transport underneath it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct BackendError {
    /// Structured code (`23505`, `PGRST116`, `network`, ...), when the backend sent one.
    pub code: Option<String>,
    pub message: String,
    /// HTTP status, when the failure came from a response.
    pub status: Option<u16>,
}

impl BackendError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
            status: None,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new("network", message)
    }

    pub fn http(status: u16, code: Option<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            status: Some(status),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// The insert collided with a row that has the same primary key.
    pub fn is_duplicate_key(&self) -> bool {
        self.code.as_deref() == Some("23505")
    }
}

/// Errors raised at the operation boundary of the core.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("not signed in")]
    NotSignedIn,
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub code: &'static str,
    pub user_message: String,
}

impl ClassifiedError {
    fn new(kind: ErrorKind, user_message: impl Into<String>) -> Self {
        Self {
            kind,
            code: kind.code(),
            user_message: user_message.into(),
        }
    }

    fn canned(kind: ErrorKind) -> Self {
        Self::new(kind, kind.default_message())
    }
}

/// Shared online/offline flag. One instance per app; clones observe the same value.
#[derive(Debug, Clone)]
pub struct Connectivity {
    online: Arc<AtomicBool>,
}

impl Connectivity {
    pub fn new(online: bool) -> Self {
        Self {
            online: Arc::new(AtomicBool::new(online)),
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Returns true when the value changed.
    pub fn set_online(&self, online: bool) -> bool {
        self.online.swap(online, Ordering::SeqCst) != online
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

const CODE_TABLE: &[(&str, ErrorKind)] = &[
    ("network", ErrorKind::Network),
    ("PGRST301", ErrorKind::Auth),
    ("401", ErrorKind::Auth),
    ("42501", ErrorKind::Permission),
    ("403", ErrorKind::Permission),
    ("23505", ErrorKind::Conflict),
    ("23503", ErrorKind::Conflict),
    ("409", ErrorKind::Conflict),
    ("PGRST116", ErrorKind::NotFound),
    ("404", ErrorKind::NotFound),
    ("429", ErrorKind::RateLimited),
];

const PATTERN_TABLE: &[(&str, ErrorKind)] = &[
    ("failed to fetch", ErrorKind::Network),
    ("network", ErrorKind::Network),
    ("timed out", ErrorKind::Network),
    ("timeout", ErrorKind::Network),
    ("connection", ErrorKind::Network),
    ("jwt", ErrorKind::Auth),
    ("not authenticated", ErrorKind::Auth),
    ("session expired", ErrorKind::Auth),
    ("invalid token", ErrorKind::Auth),
    ("permission denied", ErrorKind::Permission),
    ("row-level security", ErrorKind::Permission),
    ("not allowed", ErrorKind::Permission),
    ("duplicate key", ErrorKind::Conflict),
    ("already exists", ErrorKind::Conflict),
    ("violates foreign key", ErrorKind::Conflict),
    ("not found", ErrorKind::NotFound),
    ("no rows", ErrorKind::NotFound),
    ("rate limit", ErrorKind::RateLimited),
    ("too many requests", ErrorKind::RateLimited),
];

fn lookup_code(err: &BackendError) -> Option<ErrorKind> {
    let by_code = err
        .code
        .as_deref()
        .and_then(|code| CODE_TABLE.iter().find(|(c, _)| *c == code));
    let by_status = || {
        let status = err.status?.to_string();
        CODE_TABLE.iter().find(|(c, _)| *c == status)
    };
    by_code.or_else(by_status).map(|(_, kind)| *kind)
}

fn lookup_pattern(message: &str) -> Option<ErrorKind> {
    let lowered = message.to_lowercase();
    PATTERN_TABLE
        .iter()
        .find(|(pattern, _)| lowered.contains(pattern))
        .map(|(_, kind)| *kind)
}

fn truncate_raw(message: &str) -> String {
    let trimmed = message.trim();
    if trimmed.chars().count() <= RAW_MESSAGE_LIMIT {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(RAW_MESSAGE_LIMIT).collect();
    out.push_str("...");
    out
}

/// Map a backend failure to the taxonomy. Offline wins over everything else, then the exact
/// code table, then message patterns, then the generic fallback.
pub fn classify_backend(err: &BackendError, online: bool) -> ClassifiedError {
    if !online {
        return ClassifiedError::canned(ErrorKind::Network);
    }
    if let Some(kind) = lookup_code(err) {
        return ClassifiedError::canned(kind);
    }
    if let Some(kind) = lookup_pattern(&err.message) {
        return ClassifiedError::canned(kind);
    }
    let raw = truncate_raw(&err.message);
    if raw.is_empty() {
        return ClassifiedError::canned(ErrorKind::Unknown);
    }
    ClassifiedError::new(ErrorKind::Unknown, format!("Something went wrong: {raw}"))
}

/// Classify any error raised at an operation boundary.
///
/// Errors detected locally (validation, ownership, unknown ids) already know their kind and
/// never touch the network, so they are not subject to the offline short-circuit.
pub fn classify(err: &CoreError, connectivity: &Connectivity) -> ClassifiedError {
    match err {
        CoreError::Validation(msg) => ClassifiedError::new(ErrorKind::Validation, msg.clone()),
        CoreError::Forbidden(msg) => ClassifiedError::new(ErrorKind::Permission, msg.clone()),
        // The id in the message is for logs, not for people.
        CoreError::NotFound(_) => ClassifiedError::canned(ErrorKind::NotFound),
        CoreError::NotSignedIn => ClassifiedError::canned(ErrorKind::Auth),
        CoreError::Config(msg) => {
            ClassifiedError::new(ErrorKind::Unknown, format!("Configuration error: {msg}"))
        }
        CoreError::Storage(e) => {
            ClassifiedError::new(ErrorKind::Unknown, format!("Local storage error: {e}"))
        }
        CoreError::Backend(e) => classify_backend(e, connectivity.is_online()),
    }
}
