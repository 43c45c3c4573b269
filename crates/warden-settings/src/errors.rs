//! Settings error types.

use thiserror::Error;

/// Errors that can occur when loading or resolving auth configuration.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Failed to read the config file from disk.
    #[error("failed to read auth config file: {0}")]
    Io(#[from] std::io::Error),
    /// Failed to parse or type the config JSON.
    #[error("failed to parse auth config JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// A config value was invalid.
    #[error("invalid auth config value: {0}")]
    InvalidValue(String),
    /// A strategy names a scheme that does not exist.
    #[error("strategy '{strategy}' uses unknown scheme '{scheme}'")]
    UnknownScheme {
        /// Strategy name.
        strategy: String,
        /// Scheme name as configured.
        scheme: String,
    },
    /// A strategy names a provider preset that does not exist.
    #[error("strategy '{strategy}' uses unknown provider '{provider}'")]
    UnknownProvider {
        /// Strategy name.
        strategy: String,
        /// Provider name as configured.
        provider: String,
    },
    /// A field a provider or grant needs is unset.
    #[error("strategy '{strategy}' requires '{field}'")]
    MissingField {
        /// Strategy name.
        strategy: String,
        /// Missing field (camelCase).
        field: &'static str,
    },
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_field_display() {
        let err = SettingsError::MissingField {
            strategy: "laravelJWT".into(),
            field: "url",
        };
        assert_eq!(err.to_string(), "strategy 'laravelJWT' requires 'url'");
    }

    #[test]
    fn unknown_scheme_display() {
        let err = SettingsError::UnknownScheme {
            strategy: "corp".into(),
            scheme: "saml".into(),
        };
        assert!(err.to_string().contains("unknown scheme 'saml'"));
    }

    #[test]
    fn malformed_json_mentions_config() {
        let err = SettingsError::from(serde_json::from_str::<serde_json::Value>("{bad}").unwrap_err());
        assert!(err.to_string().starts_with("failed to parse auth config JSON"));
    }
}
