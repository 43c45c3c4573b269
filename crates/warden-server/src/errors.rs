//! Server error types and their HTTP mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use warden_settings::SettingsError;

/// Errors raised while serving auth endpoints.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Strategy options could not be resolved.
    #[error(transparent)]
    Settings(#[from] SettingsError),

    /// No grant of the requested kind is registered under this strategy.
    #[error("no server grant for strategy {0}")]
    UnknownGrant(String),

    /// The request body is missing a required field or cannot be decoded.
    #[error("{0}")]
    BadRequest(String),

    /// The provider could not be reached.
    #[error("provider request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    /// The server is configured in a way that cannot serve this request.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl ServerError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::UnknownGrant(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Settings(_) | Self::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "auth endpoint failed");
        } else {
            tracing::debug!(error = %self, "auth endpoint rejected request");
        }
        (status, Json(json!({ "message": self.to_string() }))).into_response()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
