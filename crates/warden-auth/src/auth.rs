//! The session façade: owns the strategies, tracks the active one, and funnels
//! every operation's errors through one hook chain.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;
use warden_core::{Clock, RenderContext, SystemClock};
use warden_settings::{AuthOptions, Endpoint, RedirectName, resolve_strategies};
use warden_storage::{BackendSet, Platform, Storage};

use crate::background;
use crate::context::{AuthContext, ErrorListener, RedirectListener, keys};
use crate::errors::{AuthError, Result};
use crate::http::{HttpClient, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
use crate::refresh_controller::handle_refresh;
use crate::request_handler::ResetOnResponseError;
use crate::router::{MemoryRouter, Route, Router};
use crate::schemes::{self, LoginRequest, ResetOptions, Scheme, SchemeCheck, fetch_user_once};
use crate::token::CredentialValue;

/// Assembles an [`Auth`] from options and platform services.
///
/// Every service has an in-process default, so `AuthBuilder::new(options).build()`
/// is enough for tests and server-side use.
pub struct AuthBuilder {
    options: AuthOptions,
    context: RenderContext,
    platform: Option<Platform>,
    transport: Option<Arc<dyn HttpTransport>>,
    router: Option<Arc<dyn Router>>,
    clock: Option<Arc<dyn Clock>>,
    reset_on_response_error: Option<ResetOnResponseError>,
}

impl AuthBuilder {
    /// Builder over `options`, running client-side.
    pub fn new(options: AuthOptions) -> Self {
        Self {
            options,
            context: RenderContext::Client,
            platform: None,
            transport: None,
            router: None,
            clock: None,
            reset_on_response_error: None,
        }
    }

    /// Render context.
    #[must_use]
    pub fn context(mut self, context: RenderContext) -> Self {
        self.context = context;
        self
    }

    /// Cookie jar and web storage areas.
    #[must_use]
    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    /// HTTP transport. Defaults to `reqwest`.
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Router. Defaults to a [`MemoryRouter`] at `/`.
    #[must_use]
    pub fn router(mut self, router: Arc<dyn Router>) -> Self {
        self.router = Some(router);
        self
    }

    /// Clock. Defaults to the system clock.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Replace the `resetOnResponseError` flag with a custom policy.
    #[must_use]
    pub fn reset_on_response_error(mut self, policy: ResetOnResponseError) -> Self {
        self.reset_on_response_error = Some(policy);
        self
    }

    /// Resolve strategies and assemble the façade.
    pub fn build(self) -> Result<Arc<Auth>> {
        let resolved = resolve_strategies(&self.options)?;
        let base_url = self.options.base_url.as_deref().map(Url::parse).transpose()?;
        let storage = Storage::new(&self.options.stores, self.context, self.platform.unwrap_or_default())?;
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(ReqwestTransport::new()));
        let router = self
            .router
            .unwrap_or_else(|| Arc::new(MemoryRouter::new("/")));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let policy = self
            .reset_on_response_error
            .unwrap_or_else(|| ResetOnResponseError::from_flag(self.options.reset_on_response_error));

        let ctx = Arc::new(AuthContext::new(
            self.options,
            Arc::new(storage),
            Arc::new(HttpClient::new(transport, base_url)),
            router,
            clock,
            policy,
        ));

        let mut strategies = HashMap::new();
        for options in resolved.strategies {
            debug!(strategy = %options.name, scheme = ?options.scheme, "registering strategy");
            let _ = strategies.insert(options.name.clone(), schemes::build(&ctx, options));
        }

        Ok(Arc::new(Auth {
            ctx,
            strategies,
            default_strategy: resolved.default_strategy,
            login_lock: tokio::sync::Mutex::new(()),
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }))
    }
}

/// Authentication session of one app instance.
pub struct Auth {
    ctx: Arc<AuthContext>,
    strategies: HashMap<String, Arc<dyn Scheme>>,
    default_strategy: Option<String>,
    login_lock: tokio::sync::Mutex<()>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Auth {
    /// Shared context.
    pub fn context(&self) -> &Arc<AuthContext> {
        &self.ctx
    }

    /// Options.
    pub fn options(&self) -> &AuthOptions {
        self.ctx.options()
    }

    /// Session storage.
    pub fn storage(&self) -> &Arc<Storage> {
        self.ctx.storage()
    }

    /// HTTP client the schemes intercept.
    pub fn http(&self) -> &Arc<HttpClient> {
        self.ctx.http()
    }

    // ── Strategies ──────────────────────────────────────────────────

    /// Registered strategy `name`.
    pub fn get_strategy(&self, name: &str) -> Option<Arc<dyn Scheme>> {
        self.strategies.get(name).cloned()
    }

    /// Active strategy.
    pub fn strategy(&self) -> Result<Arc<dyn Scheme>> {
        let name = self.ctx.strategy_name().ok_or(AuthError::NoStrategy)?;
        self.get_strategy(&name).ok_or(AuthError::StrategyNotFound(name))
    }

    /// Name of the active strategy.
    pub fn strategy_name(&self) -> Option<String> {
        self.ctx.strategy_name()
    }

    fn persist_strategy(&self, name: Option<&str>) -> Result<()> {
        let value = name.map(|n| Value::String(n.to_string()));
        Ok(self.storage().set_universal(keys::STRATEGY, value, BackendSet::ALL)?)
    }

    /// Restore the persisted strategy (falling back to the default), mount
    /// it, and start the background watchers.
    #[instrument(skip_all)]
    pub async fn init(self: &Arc<Self>) -> Result<()> {
        let default = self.default_strategy.clone().map(Value::String);
        let _ = self.storage().sync_universal(keys::STRATEGY, default, BackendSet::ALL)?;

        if self.strategy().is_err() {
            self.persist_strategy(self.default_strategy.as_deref())?;
            if self.strategy().is_err() {
                info!("no usable strategy configured");
                return Ok(());
            }
        }

        // already funneled as "mounted"
        if let Err(e) = self.mounted().await {
            debug!(error = %e, "initial mount failed");
        }

        if self.storage().context().is_client() {
            let mut tasks = self.tasks.lock();
            if self.options().watch_logged_in {
                tasks.push(background::spawn_logged_in_watcher(self, self.cancel.clone()));
            }
            if let Some(period) = self.options().token_validation_interval {
                tasks.push(background::spawn_token_validator(
                    self,
                    std::time::Duration::from_millis(period),
                    self.cancel.clone(),
                ));
            }
        }
        Ok(())
    }

    /// Make `name` the active strategy. Resets the previous one first.
    #[instrument(skip(self))]
    pub async fn set_strategy(&self, name: &str) -> Result<()> {
        if self.strategy_name().as_deref() == Some(name) {
            return Ok(());
        }
        if !self.strategies.contains_key(name) {
            return Err(AuthError::StrategyNotFound(name.to_string()));
        }
        if let Ok(previous) = self.strategy() {
            previous.reset(ResetOptions::default()).await?;
        }
        self.persist_strategy(Some(name))?;
        info!(strategy = name, "strategy activated");
        self.mounted().await
    }

    // ── Delegated operations ────────────────────────────────────────

    async fn funnel<T>(&self, method: &str, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.ctx.call_on_error(e, method);
            if self.options().reset_on_error {
                if let Err(reset_error) = self.reset().await {
                    warn!(error = %reset_error, "reset after error failed");
                }
            }
        }
        result
    }

    /// Run the active scheme's startup.
    pub async fn mounted(&self) -> Result<()> {
        let result = match self.strategy() {
            Ok(scheme) => scheme.mounted().await,
            Err(e) => Err(e),
        };
        self.funnel("mounted", result).await
    }

    /// Activate `name`, then log in with it.
    pub async fn login_with(&self, name: &str, login: LoginRequest) -> Result<Option<HttpResponse>> {
        self.set_strategy(name).await?;
        self.login(login).await
    }

    /// Log in with the active strategy. A second call while one is in flight
    /// fails with [`AuthError::LoginInProgress`].
    pub async fn login(&self, login: LoginRequest) -> Result<Option<HttpResponse>> {
        let Ok(_guard) = self.login_lock.try_lock() else {
            return Err(AuthError::LoginInProgress);
        };
        let scheme = self.strategy()?;
        self.ctx.set_busy(true);
        let result = scheme.login(login).await;
        self.ctx.set_busy(false);
        self.funnel("login", result).await
    }

    /// Log out of the active strategy.
    pub async fn logout(&self, request: Option<HttpRequest>) -> Result<()> {
        let result = match self.strategy() {
            Ok(scheme) => scheme.logout(request).await,
            Err(e) => Err(e),
        };
        self.funnel("logout", result).await
    }

    /// Reload the user.
    pub async fn fetch_user(&self, request: Option<HttpRequest>) -> Result<()> {
        let result = match self.strategy() {
            Ok(scheme) => scheme.fetch_user(request).await,
            Err(e) => Err(e),
        };
        self.funnel("fetchUser", result).await
    }

    /// Load the user unless one is already loaded.
    pub async fn fetch_user_once(&self) -> Result<()> {
        let result = match self.strategy() {
            Ok(scheme) => fetch_user_once(scheme.as_ref()).await,
            Err(e) => Err(e),
        };
        self.funnel("fetchUser", result).await
    }

    /// Adopt externally obtained credentials and fetch the user.
    pub async fn set_user_token(&self, token: CredentialValue, refresh: Option<CredentialValue>) -> Result<()> {
        let result = match self.strategy() {
            Ok(scheme) => scheme.set_user_token(token, refresh).await,
            Err(e) => Err(e),
        };
        self.funnel("setUserToken", result).await
    }

    /// Renew tokens through the active scheme's single-flight slot.
    pub async fn refresh_tokens(&self) -> Result<()> {
        let result = match self.strategy() {
            Ok(scheme) => handle_refresh(scheme).await,
            Err(e) => Err(e),
        };
        self.funnel("refreshTokens", result).await
    }

    /// Clear credentials and user of the active strategy.
    pub async fn reset(&self) -> Result<()> {
        match self.strategy() {
            Ok(scheme) => scheme.reset(ResetOptions::default()).await,
            Err(AuthError::NoStrategy) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Classify the active session. Valid when no strategy is active.
    pub fn check(&self, check_status: bool) -> Result<SchemeCheck> {
        match self.strategy() {
            Ok(scheme) => scheme.check(check_status),
            Err(_) => Ok(SchemeCheck {
                valid: true,
                ..SchemeCheck::default()
            }),
        }
    }

    // ── Requests ────────────────────────────────────────────────────

    /// Send `request` through the intercepted client.
    pub async fn request(&self, request: HttpRequest, defaults: Option<&Endpoint>) -> Result<HttpResponse> {
        let result = self.ctx.request(request, defaults).await;
        self.funnel("request", result).await
    }

    /// Send `request` carrying the active token.
    pub async fn request_with(&self, request: HttpRequest, defaults: Option<&Endpoint>) -> Result<HttpResponse> {
        let scheme = self.strategy().ok();
        let token = scheme
            .as_deref()
            .and_then(|s| s.as_token_bearing())
            .map(|t| t.token());
        let result = self.ctx.request_with(request, defaults, token).await;
        self.funnel("request", result).await
    }

    // ── State and hooks ─────────────────────────────────────────────

    /// Current user.
    pub fn user(&self) -> Option<Value> {
        self.ctx.user()
    }

    /// Whether the session is valid.
    pub fn logged_in(&self) -> bool {
        self.ctx.logged_in()
    }

    /// Whether a login is in flight.
    pub fn busy(&self) -> bool {
        self.ctx.busy()
    }

    /// Whether the user holds `scope`.
    pub fn has_scope(&self, scope: &str) -> bool {
        self.ctx.has_scope(scope)
    }

    /// Redirect to the configured `name` page.
    pub fn redirect(&self, name: RedirectName, route: Option<&Route>, use_router: bool) {
        self.ctx.redirect(name, route, use_router);
    }

    /// Register an error listener.
    pub fn on_error(&self, listener: ErrorListener) {
        self.ctx.on_error(listener);
    }

    /// Register a redirect listener.
    pub fn on_redirect(&self, listener: RedirectListener) {
        self.ctx.on_redirect(listener);
    }

    /// Stop the background watchers.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

impl Drop for Auth {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::Navigation;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use warden_settings::HttpMethod;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn options(base: &str) -> AuthOptions {
        let mut options = AuthOptions {
            base_url: Some(base.to_string()),
            ..AuthOptions::default()
        };
        let _ = options
            .strategies
            .insert("local".into(), json!({"endpoints": {"user": false}}));
        let _ = options.strategies.insert(
            "refresh".into(),
            json!({"endpoints": {"user": false}, "token": {"property": "token"}}),
        );
        options
    }

    async fn login_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"token": "t1"}))
                    .set_delay(Duration::from_millis(100)),
            )
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn init_falls_back_to_default_strategy() {
        let router = Arc::new(MemoryRouter::new("/"));
        let auth = AuthBuilder::new(options("http://127.0.0.1:9"))
            .router(router)
            .build()
            .unwrap();
        auth.storage()
            .set_universal(keys::STRATEGY, Some(json!("gone")), BackendSet::ALL)
            .unwrap();

        auth.init().await.unwrap();
        assert_eq!(auth.strategy_name().as_deref(), Some("local"));
        assert!(!auth.logged_in());
        auth.shutdown();
    }

    #[tokio::test]
    async fn overlapping_login_is_rejected() {
        let server = login_server().await;
        let auth = AuthBuilder::new(options(&server.uri())).build().unwrap();
        auth.set_strategy("local").await.unwrap();

        let first = {
            let auth = Arc::clone(&auth);
            tokio::spawn(async move { auth.login(LoginRequest::default()).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(auth.busy());
        let second = auth.login(LoginRequest::default()).await;
        assert!(matches!(second, Err(AuthError::LoginInProgress)));

        let _ = first.await.unwrap().unwrap();
        assert!(!auth.busy());
        assert!(auth.logged_in());
    }

    #[tokio::test]
    async fn switching_strategy_resets_previous_session() {
        let server = login_server().await;
        let auth = AuthBuilder::new(options(&server.uri())).build().unwrap();
        let _ = auth.login_with("local", LoginRequest::default()).await.unwrap();
        assert!(auth.logged_in());

        auth.set_strategy("refresh").await.unwrap();
        assert_eq!(auth.strategy_name().as_deref(), Some("refresh"));
        assert!(!auth.logged_in());
        let local = auth.get_strategy("local").unwrap();
        assert_eq!(local.as_token_bearing().unwrap().token().get(), None);

        let err = auth.set_strategy("nope").await.unwrap_err();
        assert!(matches!(err, AuthError::StrategyNotFound(name) if name == "nope"));
    }

    #[tokio::test]
    async fn errors_are_funneled_with_method_name() {
        let auth = AuthBuilder::new(options("http://127.0.0.1:9")).build().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        auth.on_error(Arc::new(move |_: &AuthError, method: &str| sink.lock().push(method.to_string())));

        let err = auth.fetch_user(None).await.unwrap_err();
        assert!(matches!(err, AuthError::NoStrategy));
        assert_eq!(seen.lock().as_slice(), ["fetchUser".to_string()]);
    }

    #[tokio::test]
    async fn reset_on_error_clears_session() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/auth/user"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let mut options = options(&server.uri());
        options.reset_on_error = true;
        let _ = options.strategies.insert("local".into(), json!({}));
        let auth = AuthBuilder::new(options).build().unwrap();
        auth.set_strategy("local").await.unwrap();

        let errors = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&errors);
        auth.on_error(Arc::new(move |_: &AuthError, _: &str| {
            let _ = counter.fetch_add(1, Ordering::SeqCst);
        }));
        let scheme = auth.strategy().unwrap();
        let token = scheme.as_token_bearing().unwrap().token();
        let _ = token.set("abc".into(), None).unwrap();

        assert!(auth.fetch_user(None).await.is_err());
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert_eq!(token.get(), None);
    }

    #[tokio::test]
    async fn failed_user_fetch_reports_once_under_outer_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/auth/user"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let mut options = options(&server.uri());
        let _ = options.strategies.insert("local".into(), json!({}));
        let auth = AuthBuilder::new(options).build().unwrap();
        auth.set_strategy("local").await.unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        auth.on_error(Arc::new(move |_: &AuthError, method: &str| sink.lock().push(method.to_string())));
        let scheme = auth.strategy().unwrap();
        let _ = scheme.as_token_bearing().unwrap().token().set("abc".into(), None).unwrap();

        assert!(auth.fetch_user(None).await.is_err());
        assert!(auth.request(HttpRequest::new(HttpMethod::Get, "/api/auth/user"), None).await.is_err());
        assert_eq!(seen.lock().as_slice(), ["fetchUser".to_string(), "request".to_string()]);
    }

    #[tokio::test]
    async fn check_without_strategy_is_valid() {
        let auth = AuthBuilder::new(AuthOptions::default()).build().unwrap();
        assert!(auth.check(true).unwrap().valid);
        auth.init().await.unwrap();
        assert_eq!(auth.strategy_name(), None);
        auth.reset().await.unwrap();
    }

    #[tokio::test]
    async fn redirect_goes_through_router() {
        let router = Arc::new(MemoryRouter::new("/secret"));
        let auth = AuthBuilder::new(options("http://127.0.0.1:9"))
            .router(router.clone())
            .build()
            .unwrap();
        auth.redirect(RedirectName::Login, None, true);
        assert_eq!(router.navigations(), vec![Navigation::Push("/login".to_string())]);
    }
}
