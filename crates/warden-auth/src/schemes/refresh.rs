//! Token login with a refresh token. Also drives LaravelJWT backends.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, instrument, warn};
use warden_settings::{Endpoints, RedirectName, SchemeKind, StrategyOptions};

use super::local::login_request;
use super::{
    Checkable, LoginRequest, RefreshCapable, ResetOptions, Scheme, SchemeCheck, TokenBearing, fetch_user_from,
    fetch_user_once, set_user, update_tokens,
};
use crate::context::AuthContext;
use crate::errors::{AuthError, Result};
use crate::http::{HttpRequest, HttpResponse};
use crate::refresh_controller::RefreshController;
use crate::request_handler::RequestHandler;
use crate::token::{CredentialValue, RefreshToken, Token};

/// Local login plus `endpoints.refresh` renewal.
pub struct RefreshScheme {
    ctx: Arc<AuthContext>,
    options: StrategyOptions,
    token: Token,
    refresh_token: RefreshToken,
    request_handler: RequestHandler,
    refresh_controller: RefreshController,
}

impl RefreshScheme {
    /// Build the scheme for `options`.
    pub fn new(ctx: Arc<AuthContext>, options: StrategyOptions) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let weak: Weak<dyn Scheme> = weak.clone();
            Self {
                token: Token::new(&options.name, options.token.clone(), &ctx),
                refresh_token: RefreshToken::new(&options.name, options.refresh_token.clone(), &ctx),
                request_handler: RequestHandler::new(weak, &ctx),
                refresh_controller: RefreshController::new(),
                ctx,
                options,
            }
        })
    }

    fn initialize_interceptor(&self) {
        let refresh_url = self.options.endpoints.refresh.as_ref().map(|e| e.url.clone());
        self.request_handler.initialize(refresh_url);
    }
}

impl Checkable for RefreshScheme {
    fn check(&self, check_status: bool) -> Result<SchemeCheck> {
        let mut response = SchemeCheck {
            is_refreshable: true,
            ..SchemeCheck::default()
        };
        let token = self.token.sync()?;
        let refresh = self.refresh_token.sync()?;
        if token.is_none() || refresh.is_none() {
            return Ok(response);
        }
        if !check_status {
            response.valid = true;
            return Ok(response);
        }
        if self.refresh_token.status().expired() {
            response.refresh_token_expired = true;
            return Ok(response);
        }
        if self.token.status().expired() {
            response.token_expired = true;
            return Ok(response);
        }
        response.valid = true;
        Ok(response)
    }
}

impl TokenBearing for RefreshScheme {
    fn token(&self) -> &Token {
        &self.token
    }

    fn refresh_token(&self) -> Option<&RefreshToken> {
        Some(&self.refresh_token)
    }
}

#[async_trait]
impl RefreshCapable for RefreshScheme {
    fn refresh_controller(&self) -> &RefreshController {
        &self.refresh_controller
    }

    #[instrument(skip_all, fields(strategy = %self.options.name))]
    async fn refresh_tokens(&self) -> Result<Option<HttpResponse>> {
        let Some(endpoint) = self.options.endpoints.refresh.clone() else {
            return Ok(None);
        };
        if !self.check(false)?.valid {
            return Ok(None);
        }
        if self.refresh_token.status().expired() {
            self.reset(ResetOptions::default()).await?;
            return Err(AuthError::ExpiredSession);
        }

        let options = &self.options.refresh_token;
        if !options.token_required {
            self.token.clear_header();
        }

        let mut request = HttpRequest::default();
        {
            let body = request.json_body_mut();
            if let (true, Some(field)) = (options.required && !options.http_only, &options.data) {
                if let Some(CredentialValue::Value(value)) = self.refresh_token.get() {
                    let _ = body.insert(field.clone(), Value::String(value));
                }
            }
            if let Some(client_id) = &self.options.client_id {
                let _ = body.insert("client_id".into(), Value::String(client_id.clone()));
            }
            let _ = body.insert("grant_type".into(), Value::String("refresh_token".into()));
        }
        if self.options.ssr {
            request.base_url = Some(String::new());
        }

        let response = self.ctx.request(request, Some(&endpoint)).await?;
        self.ctx.ensure_active(&self.options.name)?;
        update_tokens(&self.token, Some(&self.refresh_token), &response)?;
        debug!("tokens refreshed");
        Ok(Some(response))
    }
}

#[async_trait]
impl Scheme for RefreshScheme {
    fn name(&self) -> &str {
        &self.options.name
    }

    fn kind(&self) -> SchemeKind {
        self.options.scheme
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
        let check = self.check(true)?;
        if check.refresh_token_expired || (check.token_expired && self.options.auto_logout) {
            debug!(?check, "stored session expired, resetting");
            self.reset(ResetOptions::default()).await?;
        }
        self.initialize_interceptor();
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
        update_tokens(&self.token, Some(&self.refresh_token), &response)?;

        if !self.request_handler.is_initialized() {
            self.initialize_interceptor();
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
        self.refresh_token.reset().await?;
        if options.reset_interceptor {
            self.request_handler.reset();
        }
        Ok(())
    }

    async fn set_user_token(&self, token: CredentialValue, refresh: Option<CredentialValue>) -> Result<()> {
        let _ = self.token.set(token, None)?;
        if let Some(refresh) = refresh {
            let _ = self.refresh_token.set(refresh)?;
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
