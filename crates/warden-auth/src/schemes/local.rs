//! Username/password against the app's own API.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, instrument, warn};
use warden_settings::{Endpoints, RedirectName, SchemeKind, StrategyOptions};

use super::{
    Checkable, LoginRequest, ResetOptions, Scheme, SchemeCheck, TokenBearing, fetch_user_from, fetch_user_once,
    set_user, update_tokens,
};
use crate::context::AuthContext;
use crate::errors::Result;
use crate::http::{HttpRequest, HttpResponse};
use crate::request_handler::RequestHandler;
use crate::token::{CredentialValue, Token};

/// Token login: credentials are posted to `endpoints.login`, the response
/// carries the access token.
pub struct LocalScheme {
    ctx: Arc<AuthContext>,
    options: StrategyOptions,
    token: Token,
    request_handler: RequestHandler,
}

impl LocalScheme {
    /// Build the scheme for `options`.
    pub fn new(ctx: Arc<AuthContext>, options: StrategyOptions) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let weak: Weak<dyn Scheme> = weak.clone();
            Self {
                token: Token::new(&options.name, options.token.clone(), &ctx),
                request_handler: RequestHandler::new(weak, &ctx),
                ctx,
                options,
            }
        })
    }
}

/// Login body additions shared by the token schemes.
pub(super) fn login_request(options: &StrategyOptions, login: LoginRequest) -> HttpRequest {
    let mut request = login.request;
    let has_extras = options.client_id.is_some() || options.grant_type.is_some() || !options.scope.is_empty();
    if has_extras {
        let body = request.json_body_mut();
        if let Some(client_id) = &options.client_id {
            let _ = body.insert("client_id".into(), Value::String(client_id.clone()));
        }
        if let Some(grant_type) = &options.grant_type {
            let _ = body.insert("grant_type".into(), Value::String(grant_type.clone()));
        }
        if !options.scope.is_empty() {
            let _ = body.insert("scope".into(), Value::String(options.scope.join(" ")));
        }
    }
    if options.ssr {
        request.base_url = Some(String::new());
    }
    request
}

impl Checkable for LocalScheme {
    fn check(&self, check_status: bool) -> Result<SchemeCheck> {
        let mut response = SchemeCheck::default();
        if self.token.sync()?.is_none() {
            return Ok(response);
        }
        if check_status && self.token.status().expired() {
            response.token_expired = true;
            return Ok(response);
        }
        response.valid = true;
        Ok(response)
    }
}

impl TokenBearing for LocalScheme {
    fn token(&self) -> &Token {
        &self.token
    }
}

#[async_trait]
impl Scheme for LocalScheme {
    fn name(&self) -> &str {
        &self.options.name
    }

    fn kind(&self) -> SchemeKind {
        SchemeKind::Local
    }

    fn options(&self) -> &StrategyOptions {
        &self.options
    }

    fn endpoints(&self) -> Endpoints {
        self.options.endpoints.clone()
    }

    fn context(&self) -> &Arc<AuthContext> {
        &self.ctx
    }

    #[instrument(skip_all, fields(strategy = %self.options.name))]
    async fn mounted(&self) -> Result<()> {
        if self.check(true)?.token_expired {
            debug!("stored token expired, resetting");
            self.reset(ResetOptions::default()).await?;
        }
        self.request_handler.initialize(None);
        fetch_user_once(self).await
    }

    #[instrument(skip_all, fields(strategy = %self.options.name))]
    async fn login(&self, login: LoginRequest) -> Result<Option<HttpResponse>> {
        let Some(endpoint) = self.options.endpoints.login.clone() else {
            return Ok(None);
        };
        if login.reset {
            self.reset(ResetOptions {
                reset_interceptor: false,
            })
            .await?;
        }

        let request = login_request(&self.options, login);
        let response = self.ctx.request(request, Some(&endpoint)).await?;
        self.ctx.ensure_active(&self.options.name)?;
        update_tokens(&self.token, None, &response)?;

        if !self.request_handler.is_initialized() {
            self.request_handler.initialize(None);
        }
        if self.options.user.auto_fetch {
            self.fetch_user(None).await?;
        }
        Ok(Some(response))
    }

    #[instrument(skip_all, fields(strategy = %self.options.name))]
    async fn logout(&self, request: Option<HttpRequest>) -> Result<()> {
        if let Some(endpoint) = &self.options.endpoints.logout {
            if let Err(e) = self
                .ctx
                .request_with(request.unwrap_or_default(), Some(endpoint), Some(&self.token))
                .await
            {
                warn!(error = %e, "logout request failed");
            }
        }
        self.reset(ResetOptions::default()).await?;
        self.ctx.redirect(RedirectName::Logout, None, true);
        Ok(())
    }

    async fn fetch_user(&self, request: Option<HttpRequest>) -> Result<()> {
        if !self.check(false)?.valid {
            return Ok(());
        }
        fetch_user_from(
            self,
            self.options.endpoints.user.as_ref(),
            request,
            Some(&self.token),
            self.options.user.property.as_deref(),
        )
        .await
    }

    async fn reset(&self, options: ResetOptions) -> Result<()> {
        set_user(self, None);
        self.token.reset().await?;
        if options.reset_interceptor {
            self.request_handler.reset();
        }
        Ok(())
    }

    async fn set_user_token(&self, token: CredentialValue, _refresh: Option<CredentialValue>) -> Result<()> {
        let _ = self.token.set(token, None)?;
        self.fetch_user(None).await
    }

    fn as_token_bearing(&self) -> Option<&dyn TokenBearing> {
        Some(self)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestEnv;
    use serde_json::json;
    use std::time::Duration;
    use warden_settings::{AuthOptions, HttpMethod, resolve_strategies};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn scheme(env: &TestEnv, strategy: Value) -> Arc<LocalScheme> {
        let mut options = AuthOptions::default();
        let _ = options.strategies.insert("local".into(), strategy);
        let resolved = resolve_strategies(&options).unwrap();
        let strategy = resolved.get("local").cloned().unwrap();
        LocalScheme::new(Arc::clone(&env.ctx), strategy)
    }

    #[tokio::test]
    async fn login_stores_token_and_fetches_user() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .and(body_partial_json(json!({"username": "ada"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "t1", "expires_in": 600})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/auth/user"))
            .and(header("Authorization", "Bearer t1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"user": {"name": "Ada"}})))
            .expect(1)
            .mount(&server)
            .await;

        let env = TestEnv::with_base(AuthOptions::default(), &server.uri());
        let local = scheme(&env, json!({}));
        let _ = local.login(LoginRequest::with_body(json!({"username": "ada"}))).await.unwrap();

        assert_eq!(local.token().get(), Some(CredentialValue::Value("Bearer t1".to_string())));
        assert_eq!(env.ctx.user(), Some(json!({"name": "Ada"})));
        assert!(env.ctx.logged_in());
    }

    #[tokio::test]
    async fn missing_user_property_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/auth/user"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"profile": {}})))
            .mount(&server)
            .await;

        let env = TestEnv::with_base(AuthOptions::default(), &server.uri());
        let local = scheme(&env, json!({}));
        let _ = local.token().set("abc".into(), None).unwrap();
        let err = local.fetch_user(None).await.unwrap_err();
        assert_eq!(err.to_string(), "User Data response does not contain field user");
        assert!(!env.ctx.logged_in());
    }

    #[tokio::test]
    async fn disabled_user_endpoint_sets_empty_user() {
        let env = TestEnv::new(AuthOptions::default());
        let local = scheme(&env, json!({"endpoints": {"user": false}}));
        let _ = local.token().set("abc".into(), None).unwrap();
        local.fetch_user(None).await.unwrap();
        assert_eq!(env.ctx.user(), Some(json!({})));
        assert!(env.ctx.logged_in());
    }

    #[test]
    fn check_reports_expiry_only_with_status() {
        let env = TestEnv::new(AuthOptions::default());
        let local = scheme(&env, json!({"token": {"maxAge": 60}}));
        assert!(!local.check(true).unwrap().valid);

        let _ = local.token().set("abc".into(), None).unwrap();
        assert!(local.check(true).unwrap().valid);

        env.clock.advance(Duration::from_secs(120));
        let check = local.check(true).unwrap();
        assert!(!check.valid && check.token_expired && !check.is_refreshable);
        assert!(local.check(false).unwrap().valid);
    }

    #[tokio::test]
    async fn mounted_resets_expired_token() {
        let env = TestEnv::new(AuthOptions::default());
        let local = scheme(&env, json!({"token": {"maxAge": 60}, "endpoints": {"user": false}}));
        let _ = local.token().set("abc".into(), None).unwrap();
        env.clock.advance(Duration::from_secs(120));

        local.mounted().await.unwrap();
        assert_eq!(local.token().get(), None);
        assert!(!env.ctx.logged_in());
        assert!(local.request_handler.is_initialized());
    }

    #[tokio::test]
    async fn anonymous_request_keeps_caller_authorization() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/auth/user"))
            .and(header("Authorization", "Basic YXBwOnMzY3JldA=="))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"user": {"name": "svc"}})))
            .expect(1)
            .mount(&server)
            .await;

        let env = TestEnv::with_base(AuthOptions::default(), &server.uri());
        let local = scheme(&env, json!({}));
        local.mounted().await.unwrap();
        assert_eq!(local.token().get(), None);

        let mut request = HttpRequest::new(HttpMethod::Get, "/api/auth/user");
        request.set_header("Authorization", "Basic YXBwOnMzY3JldA==");
        let response = env.ctx.request(request, None).await.unwrap();
        assert_eq!(response.data["user"]["name"], "svc");
    }

    #[tokio::test]
    async fn logout_resets_even_when_request_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/logout"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let env = TestEnv::with_base(AuthOptions::default(), &server.uri());
        env.router.visit("/profile");
        let local = scheme(&env, json!({"endpoints": {"user": false}}));
        local.set_user_token("abc".into(), None).await.unwrap();
        assert!(env.ctx.logged_in());

        local.logout(None).await.unwrap();
        assert_eq!(local.token().get(), None);
        assert!(!env.ctx.logged_in());
        assert_eq!(env.router.last_target().as_deref(), Some("/"));
    }
}
