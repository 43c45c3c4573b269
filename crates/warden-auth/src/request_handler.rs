//! Request / response-error interceptors that keep outgoing calls authenticated.

use std::fmt;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::context::AuthContext;
use crate::errors::{AuthError, Result};
use crate::http::{HttpClient, HttpRequest, InterceptorId, RequestInterceptor, ResponseErrorInterceptor};
use crate::refresh_controller::handle_refresh;
use crate::schemes::{ResetOptions, Scheme};
use crate::token::CredentialValue;

/// When a failed response should end the session.
#[derive(Clone, Default)]
pub enum ResetOnResponseError {
    /// Never; failed responses pass through untouched.
    #[default]
    Disabled,
    /// On 401 responses.
    Unauthorized,
    /// When the predicate returns true.
    Custom(Arc<dyn Fn(&AuthError) -> bool + Send + Sync>),
}

impl ResetOnResponseError {
    /// `Unauthorized` when `enabled`, otherwise `Disabled`.
    pub fn from_flag(enabled: bool) -> Self {
        if enabled { Self::Unauthorized } else { Self::Disabled }
    }

    fn triggers(&self, error: &AuthError) -> bool {
        match self {
            Self::Disabled => false,
            Self::Unauthorized => error.status() == Some(401),
            Self::Custom(predicate) => predicate(error),
        }
    }
}

impl fmt::Debug for ResetOnResponseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => f.write_str("Disabled"),
            Self::Unauthorized => f.write_str("Unauthorized"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Installs and removes a scheme's interceptors on the shared client.
pub struct RequestHandler {
    scheme: Weak<dyn Scheme>,
    http: Arc<HttpClient>,
    policy: ResetOnResponseError,
    installed: Mutex<Option<(InterceptorId, Option<InterceptorId>)>>,
}

impl RequestHandler {
    /// Handler for `scheme`. Nothing is installed until
    /// [`initialize`](Self::initialize).
    pub fn new(scheme: Weak<dyn Scheme>, ctx: &AuthContext) -> Self {
        Self {
            scheme,
            http: Arc::clone(ctx.http()),
            policy: ctx.reset_on_response_error().clone(),
            installed: Mutex::new(None),
        }
    }

    /// Install the interceptors. Requests to `refresh_endpoint` are never
    /// intercepted. Calling this again replaces the previous pair.
    pub fn initialize(&self, refresh_endpoint: Option<String>) {
        self.reset();
        let request = self.http.add_request_interceptor(Arc::new(TokenInterceptor {
            scheme: self.scheme.clone(),
            refresh_endpoint,
        }));
        let error = match self.policy {
            ResetOnResponseError::Disabled => None,
            _ => Some(self.http.add_error_interceptor(Arc::new(ExpiryInterceptor {
                scheme: self.scheme.clone(),
                policy: self.policy.clone(),
            }))),
        };
        *self.installed.lock() = Some((request, error));
    }

    /// Whether interceptors are installed.
    pub fn is_initialized(&self) -> bool {
        self.installed.lock().is_some()
    }

    /// Eject both interceptors. Safe to call repeatedly.
    pub fn reset(&self) {
        if let Some((request, error)) = self.installed.lock().take() {
            self.http.eject_request_interceptor(request);
            if let Some(error) = error {
                self.http.eject_error_interceptor(error);
            }
        }
    }
}

fn needs_token(scheme: &dyn Scheme, url: &str) -> bool {
    let global = scheme.as_token_bearing().is_none_or(|t| t.token().options().global);
    global || scheme.endpoints().urls().any(|u| u == url)
}

struct TokenInterceptor {
    scheme: Weak<dyn Scheme>,
    refresh_endpoint: Option<String>,
}

impl TokenInterceptor {
    async fn expire(scheme: &dyn Scheme) -> AuthError {
        if let Err(e) = scheme.reset(ResetOptions::default()).await {
            warn!(strategy = scheme.name(), error = %e, "reset after expiry failed");
        }
        AuthError::ExpiredSession
    }
}

#[async_trait]
impl RequestInterceptor for TokenInterceptor {
    async fn intercept(&self, mut request: HttpRequest) -> Result<HttpRequest> {
        let Some(scheme) = self.scheme.upgrade() else {
            return Ok(request);
        };
        let url = request.url.clone().unwrap_or_default();
        if !needs_token(scheme.as_ref(), &url) || self.refresh_endpoint.as_deref() == Some(url.as_str()) {
            return Ok(request);
        }

        let check = scheme.check(true)?;
        let mut valid = check.valid;
        let stale = scheme
            .as_token_bearing()
            .and_then(|t| t.token().get())
            .and_then(|v| v.as_str().map(ToString::to_string));

        if check.refresh_token_expired {
            return Err(Self::expire(scheme.as_ref()).await);
        }

        if check.token_expired {
            if !check.is_refreshable {
                return Err(Self::expire(scheme.as_ref()).await);
            }
            debug!(strategy = scheme.name(), url = %url, "token expired, refreshing before request");
            match handle_refresh(Arc::clone(&scheme)).await {
                Ok(()) => valid = true,
                Err(e) => {
                    debug!(strategy = scheme.name(), error = %e, "refresh before request failed");
                    return Err(Self::expire(scheme.as_ref()).await);
                }
            }
        }

        // Anonymous: caller-supplied credentials go out as they are.
        if !valid {
            return Ok(request);
        }
        let Some(bearing) = scheme.as_token_bearing() else {
            return Ok(request);
        };
        let token = bearing.token();
        let name = token.options().name.clone();

        // A header carrying the pre-refresh token is ours to replace.
        let replaceable = match request.header(&name) {
            None => true,
            Some(current) => stale.as_deref() == Some(current),
        };
        if let Some(CredentialValue::Value(value)) = token.get() {
            if replaceable {
                request.set_header(&name, value);
            }
        }
        Ok(request)
    }
}

struct ExpiryInterceptor {
    scheme: Weak<dyn Scheme>,
    policy: ResetOnResponseError,
}

#[async_trait]
impl ResponseErrorInterceptor for ExpiryInterceptor {
    async fn intercept(&self, error: AuthError) -> AuthError {
        if !self.policy.triggers(&error) {
            return error;
        }
        match self.scheme.upgrade() {
            Some(scheme) => TokenInterceptor::expire(scheme.as_ref()).await,
            None => AuthError::ExpiredSession,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
