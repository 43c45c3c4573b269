//! Auth schemes.
//!
//! A scheme is a struct implementing [`Scheme`] plus whichever capability
//! traits its protocol needs:
//!
//! | Scheme                  | TokenBearing | RefreshCapable | IdTokenCapable |
//! |-------------------------|:------------:|:--------------:|:--------------:|
//! | [`LocalScheme`]         | ✓            |                |                |
//! | [`CookieScheme`]        |              |                |                |
//! | [`RefreshScheme`]       | ✓            | ✓              |                |
//! | [`Oauth2Scheme`]        | ✓            | ✓              |                |
//! | [`OpenIdConnectScheme`] | ✓            | ✓              | ✓              |
//!
//! LaravelJWT is a [`RefreshScheme`] whose refresh credential is the opaque
//! sentinel and whose refresh call carries the access token.

mod configuration_document;
mod cookie;
mod local;
mod oauth2;
mod openid_connect;
pub mod pkce;
mod refresh;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use warden_settings::{Endpoint, Endpoints, SchemeKind, StrategyOptions};

use crate::context::AuthContext;
use crate::errors::{AuthError, Result};
use crate::http::{HttpRequest, HttpResponse};
use crate::refresh_controller::RefreshController;
use crate::token::{CredentialValue, IdToken, RefreshToken, Token};
use crate::utils::{get_prop, is_truthy};

pub use configuration_document::ConfigurationDocument;
pub use cookie::CookieScheme;
pub use local::LocalScheme;
pub use oauth2::Oauth2Scheme;
pub use openid_connect::OpenIdConnectScheme;
pub use refresh::RefreshScheme;

/// Outcome of [`Checkable::check`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SchemeCheck {
    /// The session can be used as is.
    pub valid: bool,
    /// The access token is past its expiry.
    pub token_expired: bool,
    /// The refresh token is past its expiry. Terminal.
    pub refresh_token_expired: bool,
    /// The id token is past its expiry.
    pub id_token_expired: bool,
    /// An expired access token can be renewed.
    pub is_refreshable: bool,
}

/// Options of [`Scheme::reset`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResetOptions {
    /// Also eject the request interceptors.
    pub reset_interceptor: bool,
}

impl Default for ResetOptions {
    fn default() -> Self {
        Self {
            reset_interceptor: true,
        }
    }
}

/// Input of [`Scheme::login`].
#[derive(Clone, Debug)]
pub struct LoginRequest {
    /// Request overriding the login endpoint (credentials go in the body).
    pub request: HttpRequest,
    /// Extra authorization-URL parameters (OAuth).
    pub params: Vec<(String, String)>,
    /// Explicit OAuth `state`; random when unset.
    pub state: Option<String>,
    /// Explicit OIDC `nonce`; random when unset.
    pub nonce: Option<String>,
    /// Reset the session before logging in.
    pub reset: bool,
}

impl Default for LoginRequest {
    fn default() -> Self {
        Self {
            request: HttpRequest::default(),
            params: Vec::new(),
            state: None,
            nonce: None,
            reset: true,
        }
    }
}

impl LoginRequest {
    /// Login with `body` as the JSON payload.
    pub fn with_body(body: Value) -> Self {
        Self {
            request: HttpRequest::default().with_json(body),
            ..Self::default()
        }
    }
}

/// Session validity from stored credentials.
pub trait Checkable {
    /// Classify the session. With `check_status` false only presence counts.
    fn check(&self, check_status: bool) -> Result<SchemeCheck>;
}

/// Schemes holding an access token.
pub trait TokenBearing: Send + Sync {
    /// Access token.
    fn token(&self) -> &Token;
    /// Refresh token, when the scheme has one.
    fn refresh_token(&self) -> Option<&RefreshToken> {
        None
    }
}

/// Schemes that can renew an expired access token.
#[async_trait]
pub trait RefreshCapable: Send + Sync {
    /// Single-flight slot shared by every refresh trigger.
    fn refresh_controller(&self) -> &RefreshController;
    /// Exchange the refresh token. `None` when there was nothing to do.
    async fn refresh_tokens(&self) -> Result<Option<HttpResponse>>;
}

/// Schemes holding an OpenID Connect id token.
pub trait IdTokenCapable: Send + Sync {
    /// Id token.
    fn id_token(&self) -> &IdToken;
}

/// A configured authentication protocol.
#[async_trait]
pub trait Scheme: Checkable + Send + Sync {
    /// Strategy name.
    fn name(&self) -> &str;
    /// Protocol.
    fn kind(&self) -> SchemeKind;
    /// Resolved strategy options.
    fn options(&self) -> &StrategyOptions;
    /// Current endpoints (discovery may fill them in after construction).
    fn endpoints(&self) -> Endpoints;
    /// Shared context.
    fn context(&self) -> &Arc<AuthContext>;

    /// Restore the session on startup.
    async fn mounted(&self) -> Result<()>;
    /// Start a session.
    async fn login(&self, login: LoginRequest) -> Result<Option<HttpResponse>>;
    /// End the session.
    async fn logout(&self, request: Option<HttpRequest>) -> Result<()>;
    /// Load the user into session state.
    async fn fetch_user(&self, request: Option<HttpRequest>) -> Result<()>;
    /// Clear credentials and user. Idempotent.
    async fn reset(&self, options: ResetOptions) -> Result<()>;

    /// Adopt credentials obtained elsewhere, then fetch the user.
    async fn set_user_token(&self, _token: CredentialValue, _refresh: Option<CredentialValue>) -> Result<()> {
        Err(AuthError::Configuration(format!(
            "strategy {} does not accept external tokens",
            self.name()
        )))
    }

    /// Token capability.
    fn as_token_bearing(&self) -> Option<&dyn TokenBearing> {
        None
    }
    /// Refresh capability.
    fn as_refresh_capable(&self) -> Option<&dyn RefreshCapable> {
        None
    }
    /// Id token capability.
    fn as_id_token_capable(&self) -> Option<&dyn IdTokenCapable> {
        None
    }
}

/// Instantiate the scheme of `options`.
pub fn build(ctx: &Arc<AuthContext>, options: StrategyOptions) -> Arc<dyn Scheme> {
    match options.scheme {
        SchemeKind::Local => LocalScheme::new(Arc::clone(ctx), options),
        SchemeKind::Cookie => CookieScheme::new(Arc::clone(ctx), options),
        SchemeKind::Refresh | SchemeKind::LaravelJwt => RefreshScheme::new(Arc::clone(ctx), options),
        SchemeKind::Oauth2 => Oauth2Scheme::new(Arc::clone(ctx), options),
        SchemeKind::OpenIdConnect => OpenIdConnectScheme::new(Arc::clone(ctx), options),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared behaviour
// ─────────────────────────────────────────────────────────────────────────────

/// Store `user`; `loggedIn` follows from the user and the scheme's check.
pub fn set_user(scheme: &dyn Scheme, user: Option<Value>) {
    let user = user.filter(is_truthy);
    let valid = user.is_some() && scheme.check(false).is_ok_and(|c| c.valid);
    scheme.context().set_user(user, valid);
}

/// Fetch the user unless one is already loaded.
pub async fn fetch_user_once(scheme: &dyn Scheme) -> Result<()> {
    if scheme.context().user().is_none() {
        scheme.fetch_user(None).await?;
    }
    Ok(())
}

/// Load the user from `endpoint`, reading `property` of the response. An
/// unset endpoint yields an empty user.
pub(crate) async fn fetch_user_from(
    scheme: &dyn Scheme,
    endpoint: Option<&Endpoint>,
    request: Option<HttpRequest>,
    token: Option<&Token>,
    property: Option<&str>,
) -> Result<()> {
    let Some(endpoint) = endpoint else {
        set_user(scheme, Some(Value::Object(Map::new())));
        return Ok(());
    };
    let response = scheme
        .context()
        .request_with(request.unwrap_or_default(), Some(endpoint), token)
        .await?;
    let user = get_prop(&response.data, property)
        .filter(is_truthy)
        .ok_or_else(|| AuthError::MissingUserData(property.unwrap_or_default().to_string()))?;
    set_user(scheme, Some(user));
    Ok(())
}

/// Persist the credentials of a login or refresh response.
///
/// The configured max age wins over the response's `expiresProperty`; a JWT
/// `exp` wins over both (see [`Token::set`]).
pub(crate) fn update_tokens(token: &Token, refresh: Option<&RefreshToken>, response: &HttpResponse) -> Result<()> {
    let options = token.options();
    let value = if options.required {
        get_prop(&response.data, options.property.as_deref())
            .as_ref()
            .and_then(CredentialValue::from_json)
            .ok_or_else(|| AuthError::MissingProperty(options.property.clone().unwrap_or_default()))?
    } else {
        CredentialValue::Present
    };
    let expires_in = options.max_age.or_else(|| {
        options
            .expires_property
            .as_deref()
            .and_then(|p| response.data.get(p))
            .and_then(json_seconds)
    });
    let _ = token.set(value, expires_in)?;

    if let Some(refresh) = refresh {
        let options = refresh.options();
        let value = if options.required {
            get_prop(&response.data, options.property.as_deref())
                .as_ref()
                .and_then(CredentialValue::from_json)
        } else {
            Some(CredentialValue::Present)
        };
        if let Some(value) = value {
            let _ = refresh.set(value)?;
        }
    }
    Ok(())
}

/// Seconds from a JSON number or numeric string.
pub(crate) fn json_seconds(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
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
    use warden_core::Clock;
    use warden_settings::{AuthOptions, CredentialOptions};

    fn token_options(required: bool) -> CredentialOptions {
        CredentialOptions {
            property: Some("token".to_string()),
            expires_property: Some("expires_in".to_string()),
            kind: Some("Bearer".to_string()),
            global: true,
            required,
            ..CredentialOptions::default()
        }
    }

    fn response(data: Value) -> HttpResponse {
        HttpResponse {
            status: 200,
            data,
            ..HttpResponse::default()
        }
    }

    #[test]
    fn update_tokens_reads_value_and_expiry() {
        let env = TestEnv::new(AuthOptions::default());
        let token = Token::new("local", token_options(true), &env.ctx);
        update_tokens(&token, None, &response(json!({"token": "abc", "expires_in": "60"}))).unwrap();
        assert_eq!(token.get(), Some(CredentialValue::Value("Bearer abc".to_string())));
        assert_eq!(token.expiration(), Some(env.clock.now_millis() + 60_000));
    }

    #[test]
    fn missing_required_token_is_an_error() {
        let env = TestEnv::new(AuthOptions::default());
        let token = Token::new("local", token_options(true), &env.ctx);
        let err = update_tokens(&token, None, &response(json!({"other": 1}))).unwrap_err();
        assert_matches::assert_matches!(err, AuthError::MissingProperty(p) if p == "token");
    }

    #[test]
    fn optional_credentials_store_sentinel() {
        let env = TestEnv::new(AuthOptions::default());
        let token = Token::new("cookie", token_options(false), &env.ctx);
        let refresh_options = CredentialOptions {
            prefix: "_refresh_token.".to_string(),
            expiration_prefix: "_refresh_token_expiration.".to_string(),
            ..CredentialOptions::default()
        };
        let refresh = RefreshToken::new("cookie", refresh_options, &env.ctx);
        update_tokens(&token, Some(&refresh), &response(json!({}))).unwrap();
        assert_eq!(token.get(), Some(CredentialValue::Present));
        assert_eq!(refresh.get(), Some(CredentialValue::Present));
    }

    #[test]
    fn required_refresh_token_skipped_when_absent() {
        let env = TestEnv::new(AuthOptions::default());
        let token = Token::new("refresh", token_options(true), &env.ctx);
        let refresh_options = CredentialOptions {
            property: Some("refresh_token".to_string()),
            required: true,
            prefix: "_refresh_token.".to_string(),
            expiration_prefix: "_refresh_token_expiration.".to_string(),
            ..CredentialOptions::default()
        };
        let refresh = RefreshToken::new("refresh", refresh_options, &env.ctx);
        update_tokens(&token, Some(&refresh), &response(json!({"token": "abc"}))).unwrap();
        assert_eq!(refresh.get(), None);
    }

    #[test]
    fn login_request_defaults_to_reset() {
        let login = LoginRequest::with_body(json!({"username": "u"}));
        assert!(login.reset);
        assert!(login.request.body.is_some());
        assert!(ResetOptions::default().reset_interceptor);
    }
}
