use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::StoreOptions;
use crate::falsy;

/// Root auth configuration.
///
/// `strategies` is kept as raw JSON so that scheme defaults and provider
/// presets can be deep-merged underneath before typing; see
/// [`crate::resolve_strategies`].
///
/// ```json
/// {
///   "redirect": { "login": "/signin" },
///   "strategies": { "local": { "endpoints": { "user": false } } }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthOptions {
    /// Origin of the app (`https://app.example.com`). Used to build OAuth
    /// `redirect_uri` values and to resolve requests sent with an empty base.
    #[serde(deserialize_with = "falsy::option")]
    pub base_url: Option<String>,
    /// Reset the session whenever an operation funnels an error.
    pub reset_on_error: bool,
    /// Reset the session and raise an expired-session error on 401 responses.
    pub reset_on_response_error: bool,
    /// Property of the user object holding scopes.
    pub scope_key: String,
    /// Send users back to where they were after logging in.
    pub rewrite_redirects: bool,
    /// Remember the full path (with query) instead of just the path.
    pub full_path_redirect: bool,
    /// Where the return-to path lives between login and callback.
    pub redirect_strategy: RedirectStrategy,
    /// Redirect on `loggedIn` flips while on a guest page.
    pub watch_logged_in: bool,
    /// Proactive token validation period in milliseconds.
    #[serde(deserialize_with = "falsy::interval")]
    pub token_validation_interval: Option<u64>,
    /// Named redirect targets.
    pub redirect: RedirectOptions,
    /// Storage backend configuration.
    pub stores: StoreOptions,
    /// Strategy activated when none is persisted. Falls back to the first
    /// configured strategy.
    #[serde(deserialize_with = "falsy::option")]
    pub default_strategy: Option<String>,
    /// Raw per-strategy configuration, in declaration order.
    pub strategies: Map<String, Value>,
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            base_url: None,
            reset_on_error: false,
            reset_on_response_error: false,
            scope_key: "scope".to_string(),
            rewrite_redirects: true,
            full_path_redirect: false,
            redirect_strategy: RedirectStrategy::Storage,
            watch_logged_in: true,
            token_validation_interval: None,
            redirect: RedirectOptions::default(),
            stores: StoreOptions::default(),
            default_strategy: None,
            strategies: Map::new(),
        }
    }
}

/// Where the return-to path is kept across the login round trip.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedirectStrategy {
    /// `?to=/path` on the login URL.
    Query,
    /// Universal storage key `redirect`.
    #[default]
    Storage,
}

/// Named redirect targets. `false` disables a target.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RedirectOptions {
    /// Where unauthenticated users are sent.
    #[serde(deserialize_with = "falsy::option")]
    pub login: Option<String>,
    /// Where users land after logout.
    #[serde(deserialize_with = "falsy::option")]
    pub logout: Option<String>,
    /// Where users land after login.
    #[serde(deserialize_with = "falsy::option")]
    pub home: Option<String>,
    /// OAuth callback route.
    #[serde(deserialize_with = "falsy::option")]
    pub callback: Option<String>,
}

impl Default for RedirectOptions {
    fn default() -> Self {
        Self {
            login: Some("/login".to_string()),
            logout: Some("/".to_string()),
            home: Some("/".to_string()),
            callback: Some("/login".to_string()),
        }
    }
}

/// Which redirect target to compute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RedirectName {
    /// `redirect.login`
    Login,
    /// `redirect.logout`
    Logout,
    /// `redirect.home`
    Home,
    /// `redirect.callback`
    Callback,
}

impl RedirectName {
    /// Lowercase name as used in config.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Logout => "logout",
            Self::Home => "home",
            Self::Callback => "callback",
        }
    }
}

impl RedirectOptions {
    /// Look up a target by name.
    pub fn get(&self, name: RedirectName) -> Option<&str> {
        match name {
            RedirectName::Login => self.login.as_deref(),
            RedirectName::Logout => self.logout.as_deref(),
            RedirectName::Home => self.home.as_deref(),
            RedirectName::Callback => self.callback.as_deref(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults() {
        let o = AuthOptions::default();
        assert_eq!(o.scope_key, "scope");
        assert!(o.rewrite_redirects);
        assert!(!o.full_path_redirect);
        assert_eq!(o.redirect_strategy, RedirectStrategy::Storage);
        assert!(o.watch_logged_in);
        assert!(!o.reset_on_error);
        assert_eq!(o.redirect.get(RedirectName::Login), Some("/login"));
        assert_eq!(o.redirect.get(RedirectName::Callback), Some("/login"));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let o: AuthOptions = serde_json::from_value(json!({
            "redirect": {"login": "/signin", "callback": false},
            "redirectStrategy": "query",
            "tokenValidationInterval": true
        }))
        .unwrap();
        assert_eq!(o.redirect.get(RedirectName::Login), Some("/signin"));
        assert_eq!(o.redirect.get(RedirectName::Callback), None);
        assert_eq!(o.redirect.get(RedirectName::Home), Some("/"));
        assert_eq!(o.redirect_strategy, RedirectStrategy::Query);
        assert_eq!(o.token_validation_interval, Some(1000));
    }

    #[test]
    fn strategies_preserve_order() {
        let o: AuthOptions = serde_json::from_value(json!({
            "strategies": {"zeta": {}, "alpha": {}}
        }))
        .unwrap();
        let names: Vec<_> = o.strategies.keys().cloned().collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
    }
}
