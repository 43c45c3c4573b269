//! Auth error types.

use std::sync::Arc;

use serde_json::Value;
use warden_settings::SettingsError;
use warden_storage::StorageError;

/// Errors that can occur during authentication operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Token and refresh token are both unusable. Terminal until re-login.
    #[error("Both token and refresh token have expired. Your request was aborted.")]
    ExpiredSession,

    /// Invalid or incomplete setup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Option resolution failed.
    #[error(transparent)]
    Settings(#[from] SettingsError),

    /// No strategy registered under this name.
    #[error("strategy not registered: {0}")]
    StrategyNotFound(String),

    /// No strategy is active.
    #[error("no active strategy")]
    NoStrategy,

    /// Server answered with a non-success status.
    #[error("request failed with status {status}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Decoded response body.
        body: Value,
    },

    /// Request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// User endpoint answered without the configured user property.
    #[error("User Data response does not contain field {0}")]
    MissingUserData(String),

    /// Token response without the configured credential property.
    #[error("response does not contain field {0}")]
    MissingProperty(String),

    /// OIDC discovery document missing or invalid.
    #[error("configuration document: {0}")]
    ConfigurationDocument(String),

    /// JWT decode failed for a reason other than the value not being a JWT.
    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    /// Strict-mode storage failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Unparseable URL.
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    /// `login()` called while another login is in flight.
    #[error("a login is already in progress")]
    LoginInProgress,

    /// Response arrived after the strategy was switched away.
    #[error("strategy {0} is no longer active")]
    StrategySuperseded(String),

    /// Outcome of a shared refresh, seen by every waiter.
    #[error("token refresh failed: {0}")]
    Refresh(Arc<AuthError>),
}

impl AuthError {
    /// Whether this is the session-expired error, directly or as a refresh outcome.
    pub fn is_expired_session(&self) -> bool {
        match self {
            Self::ExpiredSession => true,
            Self::Refresh(inner) => inner.is_expired_session(),
            _ => false,
        }
    }

    /// HTTP status, if the error came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Refresh(inner) => inner.status(),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(error: reqwest::Error) -> Self {
        Self::Transport(error.to_string())
    }
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, AuthError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
