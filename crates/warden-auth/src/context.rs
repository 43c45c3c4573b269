//! State and services shared by the façade and every scheme.

use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, error, warn};
use warden_core::Clock;
use warden_settings::{AuthOptions, Endpoint, RedirectName, RedirectStrategy};
use warden_storage::{BackendSet, Storage};

use crate::errors::{AuthError, Result};
use crate::http::{HttpClient, HttpRequest, HttpResponse};
use crate::request_handler::ResetOnResponseError;
use crate::router::{Route, Router};
use crate::token::{CredentialValue, Token};
use crate::utils::{get_prop, is_relative_url, is_same_path, is_truthy, with_query};

/// Session state keys.
pub mod keys {
    /// Opaque user profile.
    pub const USER: &str = "user";
    /// Whether the active scheme considers the session valid.
    pub const LOGGED_IN: &str = "loggedIn";
    /// Active strategy name.
    pub const STRATEGY: &str = "strategy";
    /// A login is in flight.
    pub const BUSY: &str = "busy";
    /// Return-to path for the storage redirect strategy.
    pub const REDIRECT: &str = "redirect";
}

/// Called with every funneled error and the operation it came from.
pub type ErrorListener = Arc<dyn Fn(&AuthError, &str) + Send + Sync>;

/// Called with `(to, from)` before a redirect; may return a replacement target.
pub type RedirectListener = Arc<dyn Fn(&str, &str) -> Option<String> + Send + Sync>;

/// Everything a scheme needs from its environment.
pub struct AuthContext {
    options: AuthOptions,
    storage: Arc<Storage>,
    http: Arc<HttpClient>,
    router: Arc<dyn Router>,
    clock: Arc<dyn Clock>,
    reset_on_response_error: ResetOnResponseError,
    error_listeners: RwLock<Vec<ErrorListener>>,
    redirect_listeners: RwLock<Vec<RedirectListener>>,
}

impl AuthContext {
    /// Build the context and seed session state.
    pub fn new(
        options: AuthOptions,
        storage: Arc<Storage>,
        http: Arc<HttpClient>,
        router: Arc<dyn Router>,
        clock: Arc<dyn Clock>,
        reset_on_response_error: ResetOnResponseError,
    ) -> Self {
        storage.set_state(keys::LOGGED_IN, Some(Value::Bool(false)));
        storage.set_state(keys::BUSY, Some(Value::Bool(false)));
        Self {
            options,
            storage,
            http,
            router,
            clock,
            reset_on_response_error,
            error_listeners: RwLock::new(Vec::new()),
            redirect_listeners: RwLock::new(Vec::new()),
        }
    }

    /// Resolved options.
    pub fn options(&self) -> &AuthOptions {
        &self.options
    }

    /// Session storage.
    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    /// HTTP client.
    pub fn http(&self) -> &Arc<HttpClient> {
        &self.http
    }

    /// Router.
    pub fn router(&self) -> &Arc<dyn Router> {
        &self.router
    }

    /// Clock.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Response-error reset policy.
    pub fn reset_on_response_error(&self) -> &ResetOnResponseError {
        &self.reset_on_response_error
    }

    // ── Session state ───────────────────────────────────────────────

    /// Current user, if any.
    pub fn user(&self) -> Option<Value> {
        self.storage.get_state(keys::USER).filter(|u| !matches!(u, Value::Bool(false)))
    }

    /// Store `user` and the resulting `loggedIn` flag.
    pub fn set_user(&self, user: Option<Value>, logged_in: bool) {
        self.storage.set_state(keys::USER, user);
        self.storage.set_state(keys::LOGGED_IN, Some(Value::Bool(logged_in)));
    }

    /// Whether the session is considered valid.
    pub fn logged_in(&self) -> bool {
        self.storage
            .get_state(keys::LOGGED_IN)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Whether a login is in flight.
    pub fn busy(&self) -> bool {
        self.storage.get_state(keys::BUSY).and_then(|v| v.as_bool()).unwrap_or(false)
    }

    pub(crate) fn set_busy(&self, busy: bool) {
        self.storage.set_state(keys::BUSY, Some(Value::Bool(busy)));
    }

    /// Name of the active strategy.
    pub fn strategy_name(&self) -> Option<String> {
        self.storage
            .get_state(keys::STRATEGY)
            .and_then(|v| v.as_str().map(ToString::to_string))
    }

    /// Error unless `name` is still the active strategy. Passes when no
    /// strategy has been selected yet.
    pub fn ensure_active(&self, name: &str) -> Result<()> {
        match self.strategy_name() {
            Some(active) if active != name => Err(AuthError::StrategySuperseded(name.to_string())),
            _ => Ok(()),
        }
    }

    // ── Requests ────────────────────────────────────────────────────

    /// Send `request` (unset fields taken from `defaults`).
    ///
    /// Failures are returned, not reported: the outermost caller hands them
    /// to [`call_on_error`](Self::call_on_error) once.
    pub async fn request(&self, request: HttpRequest, defaults: Option<&Endpoint>) -> Result<HttpResponse> {
        let request = match defaults {
            Some(endpoint) => request.merged_with(endpoint),
            None => request,
        };
        self.http.raw(request).await
    }

    /// Like [`request`](Self::request), attaching the current `token` unless
    /// the caller already set that header.
    pub async fn request_with(
        &self,
        request: HttpRequest,
        defaults: Option<&Endpoint>,
        token: Option<&Token>,
    ) -> Result<HttpResponse> {
        let mut request = match defaults {
            Some(endpoint) => request.merged_with(endpoint),
            None => request,
        };
        if let Some(token) = token {
            let name = &token.options().name;
            if let Some(CredentialValue::Value(value)) = token.get() {
                if !request.has_header(name) {
                    request.set_header(name, value);
                }
            }
        }
        self.request(request, None).await
    }

    // ── Hooks ───────────────────────────────────────────────────────

    /// Register an error listener.
    pub fn on_error(&self, listener: ErrorListener) {
        self.error_listeners.write().push(listener);
    }

    /// Register a redirect listener.
    pub fn on_redirect(&self, listener: RedirectListener) {
        self.redirect_listeners.write().push(listener);
    }

    /// Log `error` and hand it to every error listener.
    pub fn call_on_error(&self, err: &AuthError, method: &str) {
        if err.is_expired_session() {
            debug!(method, error = %err, "session expired");
        } else {
            error!(method, error = %err, "auth operation failed");
        }
        let listeners = self.error_listeners.read().clone();
        for listener in listeners {
            listener(err, method);
        }
    }

    /// Run the redirect listener chain; each listener sees the previous target.
    pub fn call_on_redirect(&self, to: &str, from: &str) -> String {
        let listeners = self.redirect_listeners.read().clone();
        let mut to = to.to_string();
        for listener in listeners {
            if let Some(next) = listener(&to, from) {
                to = next;
            }
        }
        to
    }

    // ── Redirects ───────────────────────────────────────────────────

    fn store_redirect(&self, value: Option<String>) {
        if let Err(e) = self
            .storage
            .set_universal(keys::REDIRECT, value.map(Value::String), BackendSet::ALL)
        {
            warn!(error = %e, "could not store redirect target");
        }
    }

    /// Redirect to the configured `name` page.
    ///
    /// `route` is the page being left (the current route when `None`). With
    /// `use_router` false, or for targets outside the app, the location is
    /// replaced instead of navigating in-app.
    pub fn redirect(&self, name: RedirectName, route: Option<&Route>, use_router: bool) {
        let Some(target) = self.options.redirect.get(name) else {
            return;
        };
        let current = self.router.current_route();
        let source = route.unwrap_or(&current);
        let from = if self.options.full_path_redirect {
            source.full_path.clone()
        } else {
            source.path.clone()
        };
        let storage_strategy = self.options.redirect_strategy == RedirectStrategy::Storage;
        let mut to = target.to_string();

        if self.options.rewrite_redirects {
            if matches!(name, RedirectName::Login | RedirectName::Logout)
                && is_relative_url(&from)
                && !is_same_path(&to, &from)
            {
                if storage_strategy {
                    self.store_redirect(Some(from.clone()));
                } else {
                    let return_to = current.query.get("to").map_or(from.as_str(), String::as_str);
                    to = with_query(&to, [("to", return_to)]);
                }
            }

            if name == RedirectName::Home {
                let mut redirect = current.query.get("to").cloned();
                if storage_strategy {
                    redirect = self
                        .storage
                        .get_universal(keys::REDIRECT)
                        .and_then(|v| v.as_str().map(ToString::to_string));
                    self.store_redirect(None);
                }
                if let Some(redirect) = redirect {
                    to = redirect;
                }
            }
        }

        to = self.call_on_redirect(&to, &from);

        if is_same_path(&to, &from) {
            return;
        }
        if storage_strategy && self.options.full_path_redirect {
            to = with_query(&to, &current.query);
        }

        debug!(target = name.as_str(), to = %to, "redirecting");
        if !use_router || !is_relative_url(&to) {
            self.router.replace_location(&to);
        } else {
            self.router.navigate(&to);
        }
    }

    /// Whether the user holds `scope`. The scope property may be an array of
    /// names, a space-separated string, or an object of flags.
    pub fn has_scope(&self, scope: &str) -> bool {
        let Some(user) = self.user() else {
            return false;
        };
        let Some(scopes) = get_prop(&user, Some(&self.options.scope_key)) else {
            return false;
        };
        match scopes {
            Value::Array(items) => items.iter().any(|s| s.as_str() == Some(scope)),
            Value::String(s) => s.split_whitespace().any(|s| s == scope),
            Value::Object(flags) => flags.get(scope).is_some_and(is_truthy),
            _ => false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::{MemoryRouter, Navigation};
    use crate::testing::context_with;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ctx(options: AuthOptions, path: &str) -> (Arc<AuthContext>, Arc<MemoryRouter>) {
        let router = Arc::new(MemoryRouter::new(path));
        (context_with(options, router.clone()), router)
    }

    #[test]
    fn login_redirect_remembers_page_in_storage() {
        let (ctx, router) = ctx(AuthOptions::default(), "/profile");
        ctx.redirect(RedirectName::Login, None, true);
        assert_eq!(router.navigations(), vec![Navigation::Push("/login".to_string())]);
        assert_eq!(ctx.storage().get_universal("redirect"), Some(json!("/profile")));

        ctx.redirect(RedirectName::Home, None, true);
        assert_eq!(router.last_target().as_deref(), Some("/profile"));
        assert_eq!(ctx.storage().get_universal("redirect"), None);
    }

    #[test]
    fn login_redirect_uses_query_strategy() {
        let options = AuthOptions {
            redirect_strategy: RedirectStrategy::Query,
            ..AuthOptions::default()
        };
        let (ctx, router) = ctx(options, "/profile");
        ctx.redirect(RedirectName::Login, None, true);
        assert_eq!(router.last_target().as_deref(), Some("/login?to=%2Fprofile"));

        ctx.redirect(RedirectName::Home, None, true);
        assert_eq!(router.last_target().as_deref(), Some("/profile"));
    }

    #[test]
    fn self_redirect_is_skipped() {
        let (ctx, router) = ctx(AuthOptions::default(), "/login");
        ctx.redirect(RedirectName::Login, None, true);
        assert!(router.navigations().is_empty());
    }

    #[test]
    fn listeners_chain() {
        let mut options = AuthOptions::default();
        options.redirect.logout = Some("/bye".to_string());
        let (ctx, router) = ctx(options, "/profile");
        ctx.on_redirect(Arc::new(|to: &str, _from: &str| Some(format!("{to}/step1"))));
        ctx.on_redirect(Arc::new(|to: &str, from: &str| (from == "/profile").then(|| format!("{to}/step2"))));
        ctx.redirect(RedirectName::Logout, None, true);
        assert_eq!(router.last_target().as_deref(), Some("/bye/step1/step2"));
    }

    #[test]
    fn absolute_target_replaces_location() {
        let mut options = AuthOptions::default();
        options.redirect.logout = Some("https://idp.test/bye".to_string());
        let (ctx, router) = ctx(options, "/profile");
        ctx.redirect(RedirectName::Logout, None, true);
        assert_eq!(
            router.navigations(),
            vec![Navigation::Replace("https://idp.test/bye".to_string())]
        );
    }

    #[test]
    fn error_listeners_see_method() {
        let (ctx, _) = ctx(AuthOptions::default(), "/");
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        ctx.on_error(Arc::new(move |err: &AuthError, method: &str| {
            assert_eq!(method, "fetchUser");
            assert!(err.is_expired_session());
            let _ = seen.fetch_add(1, Ordering::SeqCst);
        }));
        ctx.call_on_error(&AuthError::ExpiredSession, "fetchUser");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn scopes_from_array_string_or_flags() {
        let (ctx, _) = ctx(AuthOptions::default(), "/");
        assert!(!ctx.has_scope("admin"));

        ctx.set_user(Some(json!({"scope": ["admin", "read"]})), true);
        assert!(ctx.has_scope("admin"));
        assert!(!ctx.has_scope("write"));

        ctx.set_user(Some(json!({"scope": "read write"})), true);
        assert!(ctx.has_scope("write"));

        ctx.set_user(Some(json!({"scope": {"admin": true, "write": false}})), true);
        assert!(ctx.has_scope("admin"));
        assert!(!ctx.has_scope("write"));
    }

    #[test]
    fn user_and_logged_in_state() {
        let (ctx, _) = ctx(AuthOptions::default(), "/");
        assert!(!ctx.logged_in());
        ctx.set_user(Some(json!({"id": 1})), true);
        assert!(ctx.logged_in());
        assert_eq!(ctx.user(), Some(json!({"id": 1})));
        ctx.set_user(None, false);
        assert_eq!(ctx.user(), None);
        assert!(!ctx.logged_in());
    }

    #[test]
    fn ensure_active_detects_switch() {
        let (ctx, _) = ctx(AuthOptions::default(), "/");
        assert!(ctx.ensure_active("local").is_ok());
        ctx.storage().set_state(keys::STRATEGY, Some(json!("github")));
        assert!(ctx.ensure_active("github").is_ok());
        assert_matches::assert_matches!(ctx.ensure_active("local"), Err(AuthError::StrategySuperseded(_)));
    }
}
