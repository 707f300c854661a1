//! Error types for the token lifecycle

use std::time::Duration;

/// Errors from configuration, the interactive flow, refresh, and storage.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("client configuration missing: {0}")]
    ConfigMissing(String),

    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),

    #[error("callback listener bind failed: {0}")]
    ListenerBind(String),

    #[error("authorization denied: {0}")]
    AuthorizationDenied(String),

    #[error("no authorization redirect received within {}s", .0.as_secs())]
    CallbackTimeout(Duration),

    #[error("code exchange failed: {0}")]
    CodeExchange(String),

    #[error("refresh token rejected: {0}")]
    RefreshRejected(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("failed to persist credential: {0}")]
    Persist(String),

    #[error("stored credential is corrupt: {0}")]
    CorruptStore(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl Error {
    /// True when the stored refresh token can never work again and only a new
    /// interactive authorization can recover.
    pub fn requires_reauthorization(&self) -> bool {
        matches!(self, Error::RefreshRejected(_))
    }
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
