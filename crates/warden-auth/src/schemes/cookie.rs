//! Session-cookie login: the backend sets a cookie, the client never sees a
//! token.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tracing::{debug, instrument, warn};
use warden_settings::{Endpoints, RedirectName, SchemeKind, StrategyOptions};

use super::{Checkable, LoginRequest, ResetOptions, Scheme, SchemeCheck, fetch_user_from, fetch_user_once, set_user};
use crate::context::AuthContext;
use crate::errors::Result;
use crate::http::{HttpRequest, HttpResponse};
use crate::request_handler::RequestHandler;

/// Cookie-backed session. With `cookie.name` set, the session is valid
/// exactly while that cookie exists.
pub struct CookieScheme {
    ctx: Arc<AuthContext>,
    options: StrategyOptions,
    request_handler: RequestHandler,
    check_status: AtomicBool,
}

impl CookieScheme {
    /// Build the scheme for `options`.
    pub fn new(ctx: Arc<AuthContext>, options: StrategyOptions) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let weak: Weak<dyn Scheme> = weak.clone();
            Self {
                request_handler: RequestHandler::new(weak, &ctx),
                ctx,
                options,
                check_status: AtomicBool::new(false),
            }
        })
    }

    /// Forward the incoming request's cookies on server-side calls.
    fn forward_cookies(&self) {
        if !(self.options.cookie.server && self.ctx.storage().context().is_server()) {
            return;
        }
        let header = self
            .ctx
            .storage()
            .cookies()
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ");
        if !header.is_empty() {
            self.ctx.http().set_header("Cookie", header);
        }
    }
}

impl Checkable for CookieScheme {
    fn check(&self, check_status: bool) -> Result<SchemeCheck> {
        let valid = match (&self.options.cookie.name, check_status) {
            (_, false) | (None, true) => true,
            (Some(name), true) => self.ctx.storage().raw_cookie(name).is_some(),
        };
        Ok(SchemeCheck {
            valid,
            ..SchemeCheck::default()
        })
    }
}

#[async_trait]
impl Scheme for CookieScheme {
    fn name(&self) -> &str {
        &self.options.name
    }

    fn kind(&self) -> SchemeKind {
        SchemeKind::Cookie
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
        self.forward_cookies();
        self.check_status.store(true, Ordering::SeqCst);
        self.request_handler.initialize(None);
        fetch_user_once(self).await
    }

    #[instrument(skip_all, fields(strategy = %self.options.name))]
    async fn login(&self, login: LoginRequest) -> Result<Option<HttpResponse>> {
        self.reset(ResetOptions::default()).await?;

        if let Some(csrf) = &self.options.endpoints.csrf {
            debug!("priming csrf cookie");
            let _ = self.ctx.request(HttpRequest::default(), Some(csrf)).await?;
        }
        let Some(endpoint) = self.options.endpoints.login.clone() else {
            return Ok(None);
        };

        let response = self.ctx.request(login.request, Some(&endpoint)).await?;
        self.ctx.ensure_active(&self.options.name)?;

        if !self.request_handler.is_initialized() {
            self.request_handler.initialize(None);
        }
        if self.options.user.auto_fetch {
            self.check_status.store(false, Ordering::SeqCst);
            self.fetch_user(None).await?;
        }
        Ok(Some(response))
    }

    #[instrument(skip_all, fields(strategy = %self.options.name))]
    async fn logout(&self, request: Option<HttpRequest>) -> Result<()> {
        if let Some(endpoint) = &self.options.endpoints.logout {
            if let Err(e) = self.ctx.request(request.unwrap_or_default(), Some(endpoint)).await {
                warn!(error = %e, "logout request failed");
            }
        }
        self.ctx.redirect(RedirectName::Logout, None, true);
        self.reset(ResetOptions::default()).await
    }

    async fn fetch_user(&self, request: Option<HttpRequest>) -> Result<()> {
        if !self.check(self.check_status.load(Ordering::SeqCst))?.valid {
            return Ok(());
        }
        if self.options.endpoints.user.is_some() {
            self.check_status.store(false, Ordering::SeqCst);
        }
        fetch_user_from(
            self,
            self.options.endpoints.user.as_ref(),
            request,
            None,
            self.options.user.property.as_deref(),
        )
        .await
    }

    async fn reset(&self, options: ResetOptions) -> Result<()> {
        if let Some(name) = &self.options.cookie.name {
            self.ctx.storage().remove_raw_cookie(name)?;
        }
        set_user(self, None);
        if options.reset_interceptor {
            self.request_handler.reset();
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
