use serde::{Deserialize, Serialize};

use crate::falsy;

/// Storage backend configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreOptions {
    /// In-memory reactive state.
    pub state: StateStoreOptions,
    /// Cookie backend.
    pub cookie: CookieStoreOptions,
    /// `localStorage` backend.
    pub local: WebStoreOptions,
    /// `sessionStorage` backend.
    pub session: WebStoreOptions,
    /// Propagate quota and disabled-storage failures instead of warning.
    pub strict_exceptions: bool,
}

/// In-memory state options.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StateStoreOptions {
    /// Namespace of the reactive store.
    pub namespace: String,
}

impl Default for StateStoreOptions {
    fn default() -> Self {
        Self {
            namespace: "auth".to_string(),
        }
    }
}

/// Cookie backend options.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CookieStoreOptions {
    /// Whether cookies are written and read at all.
    pub enabled: bool,
    /// Prefix for every cookie name.
    pub prefix: String,
    /// Attributes applied to every write.
    pub options: CookieOptions,
}

impl Default for CookieStoreOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            prefix: "auth.".to_string(),
            options: CookieOptions::default(),
        }
    }
}

/// `localStorage` / `sessionStorage` options. Disabled by default.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WebStoreOptions {
    /// Whether the backend participates in reads and writes.
    pub enabled: bool,
    /// Prefix for every key.
    pub prefix: String,
}

impl Default for WebStoreOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            prefix: "auth.".to_string(),
        }
    }
}

/// Cookie attributes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CookieOptions {
    /// `Path` attribute.
    #[serde(deserialize_with = "falsy::option")]
    pub path: Option<String>,
    /// `Domain` attribute.
    #[serde(deserialize_with = "falsy::option")]
    pub domain: Option<String>,
    /// `Max-Age` in seconds. Negative values expire the cookie immediately.
    #[serde(deserialize_with = "falsy::option")]
    pub max_age: Option<i64>,
    /// Lifetime in days, converted to `Expires` at write time.
    #[serde(deserialize_with = "falsy::option")]
    pub expires: Option<i64>,
    /// `SameSite` attribute.
    #[serde(deserialize_with = "falsy::option")]
    pub same_site: Option<SameSite>,
    /// `Secure` attribute.
    pub secure: bool,
    /// `HttpOnly` attribute.
    pub http_only: bool,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            path: Some("/".to_string()),
            domain: None,
            max_age: None,
            expires: None,
            same_site: None,
            secure: false,
            http_only: false,
        }
    }
}

/// `SameSite` cookie attribute values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    /// `SameSite=Lax`
    Lax,
    /// `SameSite=Strict`
    Strict,
    /// `SameSite=None`
    None,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cookie_enabled_web_storage_disabled() {
        let s = StoreOptions::default();
        assert!(s.cookie.enabled);
        assert_eq!(s.cookie.prefix, "auth.");
        assert_eq!(s.cookie.options.path.as_deref(), Some("/"));
        assert!(!s.local.enabled);
        assert!(!s.session.enabled);
        assert!(!s.strict_exceptions);
    }

    #[test]
    fn cookie_options_from_json() {
        let s: StoreOptions = serde_json::from_value(json!({
            "cookie": {"options": {"sameSite": "strict", "secure": true, "maxAge": 60}},
            "local": {"enabled": true}
        }))
        .unwrap();
        assert_eq!(s.cookie.options.same_site, Some(SameSite::Strict));
        assert!(s.cookie.options.secure);
        assert_eq!(s.cookie.options.max_age, Some(60));
        // nested defaults survive partial objects
        assert_eq!(s.cookie.options.path.as_deref(), Some("/"));
        assert!(s.local.enabled);
        assert_eq!(s.local.prefix, "auth.");
    }
}
