//! Error types for the link layer.

use thiserror::Error;

/// Main error type for link operations.
///
/// `Clone` because subscription errors are stored inside [`QueryState`]
/// and handed out to every watcher.
///
/// [`QueryState`]: crate::live_query::QueryState
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Account already exists: {0}")]
    AccountExists(String),

    #[error("No signed-in identity")]
    NotSignedIn,

    #[error("Invalid collection path: {0:?}")]
    InvalidPath(String),

    #[error("Subscription error: {0}")]
    Subscription(String),

    #[error("Subscription closed by backend")]
    SubscriptionClosed,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Missing configuration value: {0}")]
    MissingConfig(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalidation of {key:?} failed: {message}")]
    Invalidation { key: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for LinkError {
    fn from(e: serde_json::Error) -> Self {
        LinkError::Serialization(e.to_string())
    }
}

/// Result type for link operations.
pub type Result<T> = std::result::Result<T, LinkError>;
