//! OAuth 2.0 authorization flows: implicit and authorization code, with
//! optional PKCE and refresh tokens.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::{debug, instrument};
use warden_core::random::{STATE_LENGTH, random_string};
use warden_settings::{CodeChallengeMethod, Endpoint, Endpoints, HttpMethod, RedirectName, SchemeKind, StrategyOptions};
use warden_storage::BackendSet;

use super::pkce;
use super::{
    Checkable, LoginRequest, RefreshCapable, ResetOptions, Scheme, SchemeCheck, TokenBearing, fetch_user_from,
    fetch_user_once, json_seconds, set_user,
};
use crate::context::AuthContext;
use crate::errors::{AuthError, Result};
use crate::http::{HttpRequest, HttpResponse, RequestBody};
use crate::refresh_controller::RefreshController;
use crate::request_handler::RequestHandler;
use crate::token::{CredentialValue, IdToken, RefreshToken, Token};
use crate::utils::{get_prop, normalize_path, parse_query, remove_token_prefix, with_query};

/// Ordered query parameters where a later `set` replaces the earlier value.
#[derive(Default)]
struct Params(Vec<(String, String)>);

impl Params {
    fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key.to_string(), value)),
        }
    }

    fn set_opt(&mut self, key: &str, value: Option<&String>) {
        if let Some(value) = value {
            self.set(key, value.clone());
        }
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }
}

fn string_prop(data: &Value, prop: Option<&str>) -> Option<String> {
    let prop = prop?;
    get_prop(data, Some(prop))
        .and_then(|v| v.as_str().map(ToString::to_string))
        .filter(|s| !s.is_empty())
}

/// State and behaviour shared by the OAuth 2.0 and OpenID Connect schemes.
pub(super) struct OauthCore {
    pub(super) ctx: Arc<AuthContext>,
    pub(super) options: StrategyOptions,
    pub(super) endpoints: RwLock<Endpoints>,
    pub(super) token: Token,
    pub(super) refresh_token: RefreshToken,
    pub(super) id_token: Option<IdToken>,
    pub(super) request_handler: RequestHandler,
    pub(super) refresh_controller: RefreshController,
}

impl OauthCore {
    pub(super) fn new(ctx: Arc<AuthContext>, options: StrategyOptions, scheme: Weak<dyn Scheme>, with_id_token: bool) -> Self {
        let name = options.name.clone();
        Self {
            token: Token::new(&name, options.token.clone(), &ctx),
            refresh_token: RefreshToken::new(&name, options.refresh_token.clone(), &ctx),
            id_token: with_id_token.then(|| IdToken::new(&name, options.id_token.clone(), &ctx)),
            request_handler: RequestHandler::new(scheme, &ctx),
            refresh_controller: RefreshController::new(),
            endpoints: RwLock::new(options.endpoints.clone()),
            ctx,
            options,
        }
    }

    fn name(&self) -> &str {
        &self.options.name
    }

    fn state_key(&self) -> String {
        format!("{}.state", self.name())
    }

    fn verifier_key(&self) -> String {
        format!("{}.pkce_code_verifier", self.name())
    }

    /// `path` on the app origin.
    fn app_url(&self, path: &str) -> String {
        let base = self.ctx.options().base_url.as_deref().unwrap_or_default();
        format!("{}{}", base.trim_end_matches('/'), normalize_path(&format!("/{path}")))
    }

    pub(super) fn redirect_uri(&self) -> String {
        if let Some(uri) = &self.options.redirect_uri {
            return uri.clone();
        }
        let callback = self.ctx.options().redirect.callback.as_deref().unwrap_or("/");
        self.app_url(callback)
    }

    pub(super) fn logout_redirect_uri(&self) -> String {
        if let Some(uri) = &self.options.logout_redirect_uri {
            return uri.clone();
        }
        let logout = self.ctx.options().redirect.logout.as_deref().unwrap_or("/");
        self.app_url(logout)
    }

    fn scope(&self) -> String {
        self.options.scope.join(" ")
    }

    fn token_endpoint(&self) -> Result<Endpoint> {
        self.endpoints
            .read()
            .token
            .clone()
            .ok_or_else(|| AuthError::Configuration(format!("strategy {} has no token endpoint", self.name())))
    }

    fn take_universal(&self, key: &str) -> Result<Option<String>> {
        let storage = self.ctx.storage();
        let value = storage
            .get_universal(key)
            .and_then(|v| v.as_str().map(ToString::to_string));
        storage.remove_universal(key)?;
        Ok(value)
    }

    pub(super) fn check(&self, check_status: bool) -> Result<SchemeCheck> {
        let token = self.token.sync()?;
        let refresh = self.refresh_token.sync()?;
        if let Some(id_token) = &self.id_token {
            let _ = id_token.sync()?;
        }
        let mut response = SchemeCheck {
            is_refreshable: refresh.is_some(),
            ..SchemeCheck::default()
        };
        if token.is_none() {
            return Ok(response);
        }
        if !check_status {
            response.valid = true;
            return Ok(response);
        }
        if self.refresh_token.status().expired() {
            response.refresh_token_expired = true;
        } else if self.token.status().expired() {
            response.token_expired = true;
        } else if self.id_token.as_ref().is_some_and(|t| t.status().expired()) {
            response.id_token_expired = true;
        } else {
            response.valid = true;
        }
        Ok(response)
    }

    /// Build the authorization URL, remember `state` (and the PKCE verifier),
    /// and send the browser there.
    pub(super) fn login(&self, login: LoginRequest) -> Result<String> {
        let authorization = self
            .endpoints
            .read()
            .authorization
            .clone()
            .ok_or_else(|| AuthError::Configuration(format!("strategy {} has no authorization endpoint", self.name())))?;

        let options = &self.options;
        let method = options.code_challenge_method.filter(|m| *m != CodeChallengeMethod::Implicit);
        let mut params = Params::default();
        params.set("protocol", "oauth2");
        params.set("response_type", options.response_type.clone());
        params.set_opt("access_type", options.access_type.as_ref());
        params.set_opt("client_id", options.client_id.as_ref());
        params.set("redirect_uri", self.redirect_uri());
        params.set("scope", self.scope());
        params.set("state", login.state.unwrap_or_else(|| random_string(STATE_LENGTH)));
        if let Some(method) = method {
            params.set("code_challenge_method", pkce::method_name(method));
        }
        for (key, value) in login.params {
            params.set(&key, value);
        }
        params.set_opt("organization", options.organization.as_ref());
        params.set_opt("audience", options.audience.as_ref());

        if params.get("response_type").is_some_and(|t| t.contains("token")) {
            params.set("nonce", login.nonce.unwrap_or_else(|| random_string(STATE_LENGTH)));
        }

        let storage = self.ctx.storage();
        if let Some(method) = method {
            let verifier = pkce::code_verifier();
            if let Some(challenge) = pkce::code_challenge(&verifier, method) {
                params.set("code_challenge", challenge);
            }
            storage.set_universal(&self.verifier_key(), Some(Value::String(verifier)), BackendSet::ALL)?;
        }
        params.set_opt("response_mode", options.response_mode.as_ref());
        params.set_opt("acr_values", options.acr_values.as_ref());

        let state = params.get("state").map(ToString::to_string);
        storage.set_universal(&self.state_key(), state.map(Value::String), BackendSet::ALL)?;

        let url = with_query(&authorization.url, params.0);
        debug!(strategy = self.name(), "redirecting to authorization endpoint");
        self.ctx.router().replace_location(&url);
        Ok(url)
    }

    /// Store the credentials of a token response.
    fn update_tokens(&self, data: &Value) -> Result<()> {
        let property = self.options.token.property.as_deref();
        let token = string_prop(data, property)
            .ok_or_else(|| AuthError::MissingProperty(property.unwrap_or_default().to_string()))?;
        let expires_in = self.expires_in(data);
        let _ = self.token.set(CredentialValue::Value(token), expires_in)?;
        if let Some(refresh) = string_prop(data, self.options.refresh_token.property.as_deref()) {
            let _ = self.refresh_token.set(CredentialValue::Value(refresh))?;
        }
        if let Some(id_token) = &self.id_token {
            if let Some(value) = string_prop(data, self.options.id_token.property.as_deref()) {
                let _ = id_token.set(CredentialValue::Value(value))?;
            }
        }
        Ok(())
    }

    fn expires_in(&self, data: &Value) -> Option<u64> {
        self.options
            .token
            .expires_property
            .as_deref()
            .and_then(|p| data.get(p))
            .and_then(json_seconds)
    }

    /// Complete a login on the callback route. Returns whether a session was
    /// established and the user sent home.
    pub(super) async fn handle_callback(&self, scheme: &dyn Scheme) -> Result<bool> {
        let Some(callback) = self.ctx.options().redirect.callback.as_deref() else {
            return Ok(false);
        };
        let route = self.ctx.router().current_route();
        if normalize_path(&route.path) != normalize_path(callback) || self.ctx.storage().context().is_server() {
            return Ok(false);
        }

        let mut query: Map<String, Value> = route
            .query
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        query.extend(
            parse_query(&route.hash)
                .into_iter()
                .map(|(k, v)| (k, Value::String(v))),
        );
        let mut data = Value::Object(query);

        let expected_state = self.take_universal(&self.state_key())?;
        if let Some(expected) = expected_state {
            if data.get("state").and_then(Value::as_str) != Some(expected.as_str()) {
                debug!(strategy = self.name(), "callback state mismatch, ignoring");
                return Ok(false);
            }
        }

        let code = data.get("code").and_then(Value::as_str).map(ToString::to_string);
        if let (true, Some(code)) = (self.options.response_type == "code", code) {
            let verifier = match self.options.code_challenge_method {
                Some(CodeChallengeMethod::Plain | CodeChallengeMethod::S256) => {
                    self.take_universal(&self.verifier_key())?
                }
                _ => None,
            };
            let endpoint = self.token_endpoint()?;
            let mut params = Params::default();
            params.set("code", code);
            params.set("client_id", self.options.client_id.clone().unwrap_or_default());
            params.set("redirect_uri", self.redirect_uri());
            params.set("response_type", self.options.response_type.clone());
            params.set_opt("audience", self.options.audience.as_ref());
            params.set_opt("grant_type", self.options.grant_type.as_ref());
            params.set_opt("code_verifier", verifier.as_ref());

            let mut request = HttpRequest::new(HttpMethod::Post, endpoint.url.clone()).merged_with(&endpoint);
            request.base_url = Some(String::new());
            request.body = Some(RequestBody::Form(params.0));
            let response = self.ctx.request(request, None).await?;
            self.ctx.ensure_active(self.name())?;

            // Exchange results win over fragment values.
            if let (Value::Object(fields), Value::Object(exchanged)) = (&mut data, response.data) {
                fields.extend(exchanged);
            }
        }

        if string_prop(&data, self.options.token.property.as_deref()).is_none() {
            return Ok(false);
        }
        self.update_tokens(&data)?;

        fetch_user_once(scheme).await?;
        if self.ctx.options().watch_logged_in {
            self.ctx.redirect(RedirectName::Home, None, false);
            return Ok(true);
        }
        Ok(false)
    }

    pub(super) async fn mounted(&self, scheme: &dyn Scheme) -> Result<()> {
        let check = self.check(true)?;
        if check.refresh_token_expired || (check.token_expired && self.options.auto_logout) {
            debug!(strategy = self.name(), ?check, "stored session expired, resetting");
            scheme.reset(ResetOptions::default()).await?;
        }
        let token_url = self.endpoints.read().token.as_ref().map(|e| e.url.clone());
        self.request_handler.initialize(token_url);

        if !self.handle_callback(scheme).await? {
            fetch_user_once(scheme).await?;
        }
        Ok(())
    }

    pub(super) async fn refresh_tokens(&self, scheme: &dyn Scheme) -> Result<Option<HttpResponse>> {
        let Some(refresh) = self.refresh_token.get() else {
            return Ok(None);
        };
        if self.refresh_token.status().expired() {
            scheme.reset(ResetOptions::default()).await?;
            return Err(AuthError::ExpiredSession);
        }
        let endpoint = self.token_endpoint()?;
        self.token.clear_header();

        let mut params = Params::default();
        // httpOnly refresh tokens travel as a cookie the server reads
        if let CredentialValue::Value(value) = &refresh {
            params.set("refresh_token", remove_token_prefix(value, self.options.token.kind.as_deref()));
        }
        params.set("scopes", self.scope());
        params.set("client_id", self.options.client_id.clone().unwrap_or_default());
        params.set("grant_type", "refresh_token");

        let mut request = HttpRequest::new(HttpMethod::Post, endpoint.url.clone()).merged_with(&endpoint);
        request.base_url = Some(String::new());
        request.body = Some(RequestBody::Form(params.0));

        let response = self.ctx.request(request, None).await?;
        self.ctx.ensure_active(self.name())?;
        self.update_tokens(&response.data)?;
        debug!(strategy = self.name(), "tokens refreshed");
        Ok(Some(response))
    }

    pub(super) async fn fetch_user(&self, scheme: &dyn Scheme, request: Option<HttpRequest>) -> Result<()> {
        if !self.check(false)?.valid {
            return Ok(());
        }
        let user_info = self.endpoints.read().user_info.clone();
        fetch_user_from(
            scheme,
            user_info.as_ref(),
            request,
            Some(&self.token),
            self.options.user.property.as_deref(),
        )
        .await
    }

    pub(super) async fn reset(&self, scheme: &dyn Scheme, options: ResetOptions) -> Result<()> {
        set_user(scheme, None);
        self.token.reset().await?;
        self.refresh_token.reset().await?;
        if let Some(id_token) = &self.id_token {
            id_token.reset().await?;
        }
        if options.reset_interceptor {
            self.request_handler.reset();
        }
        Ok(())
    }

    /// Leave for the provider's logout page when one is configured.
    pub(super) fn replace_with_logout(&self, params: Vec<(String, String)>) {
        if let Some(endpoint) = &self.endpoints.read().logout {
            let url = with_query(&endpoint.url, params);
            self.ctx.router().replace_location(&url);
        }
    }
}

/// OAuth 2.0 scheme.
pub struct Oauth2Scheme {
    core: OauthCore,
}

impl Oauth2Scheme {
    /// Build the scheme for `options`.
    pub fn new(ctx: Arc<AuthContext>, options: StrategyOptions) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let weak: Weak<dyn Scheme> = weak.clone();
            Self {
                core: OauthCore::new(ctx, options, weak, false),
            }
        })
    }

    /// `redirect_uri` sent to the provider.
    pub fn redirect_uri(&self) -> String {
        self.core.redirect_uri()
    }
}

impl Checkable for Oauth2Scheme {
    fn check(&self, check_status: bool) -> Result<SchemeCheck> {
        self.core.check(check_status)
    }
}

impl TokenBearing for Oauth2Scheme {
    fn token(&self) -> &Token {
        &self.core.token
    }

    fn refresh_token(&self) -> Option<&RefreshToken> {
        Some(&self.core.refresh_token)
    }
}

#[async_trait]
impl RefreshCapable for Oauth2Scheme {
    fn refresh_controller(&self) -> &RefreshController {
        &self.core.refresh_controller
    }

    #[instrument(skip_all, fields(strategy = %self.core.options.name))]
    async fn refresh_tokens(&self) -> Result<Option<HttpResponse>> {
        self.core.refresh_tokens(self).await
    }
}

#[async_trait]
impl Scheme for Oauth2Scheme {
    fn name(&self) -> &str {
        &self.core.options.name
    }

    fn kind(&self) -> SchemeKind {
        SchemeKind::Oauth2
    }

    fn options(&self) -> &StrategyOptions {
        &self.core.options
    }

    fn endpoints(&self) -> Endpoints {
        self.core.endpoints.read().clone()
    }

    fn context(&self) -> &Arc<AuthContext> {
        &self.core.ctx
    }

    #[instrument(skip_all, fields(strategy = %self.core.options.name))]
    async fn mounted(&self) -> Result<()> {
        self.core.mounted(self).await
    }

    #[instrument(skip_all, fields(strategy = %self.core.options.name))]
    async fn login(&self, login: LoginRequest) -> Result<Option<HttpResponse>> {
        let _ = self.core.login(login)?;
        Ok(None)
    }

    #[instrument(skip_all, fields(strategy = %self.core.options.name))]
    async fn logout(&self, _request: Option<HttpRequest>) -> Result<()> {
        self.core.replace_with_logout(vec![
            (
                "client_id".to_string(),
                self.core.options.client_id.clone().unwrap_or_default(),
            ),
            ("logout_uri".to_string(), self.core.logout_redirect_uri()),
        ]);
        self.reset(ResetOptions::default()).await
    }

    async fn fetch_user(&self, request: Option<HttpRequest>) -> Result<()> {
        self.core.fetch_user(self, request).await
    }

    async fn reset(&self, options: ResetOptions) -> Result<()> {
        self.core.reset(self, options).await
    }

    async fn set_user_token(&self, token: CredentialValue, refresh: Option<CredentialValue>) -> Result<()> {
        let _ = self.core.token.set(token, None)?;
        if let Some(refresh) = refresh {
            let _ = self.core.refresh_token.set(refresh)?;
        }
        self.fetch_user(None).await
    }

    fn as_token_bearing(&self) -> Option<&dyn TokenBearing> {
        Some(self)
    }

    fn as_refresh_capable(&self) -> Option<&dyn RefreshCapable> {
        Some(self)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
