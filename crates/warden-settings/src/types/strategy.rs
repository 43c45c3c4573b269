use serde::{Deserialize, Serialize};

use super::Endpoints;
use crate::falsy;

/// Protocol implemented by a strategy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchemeKind {
    /// Username/password against the app's own API.
    #[default]
    #[serde(rename = "local")]
    Local,
    /// Session cookie set by the backend.
    #[serde(rename = "cookie")]
    Cookie,
    /// Local plus a refresh token.
    #[serde(rename = "refresh")]
    Refresh,
    /// OAuth 2.0 authorization flows.
    #[serde(rename = "oauth2")]
    Oauth2,
    /// OAuth 2.0 plus OpenID Connect id tokens and discovery.
    #[serde(rename = "openIDConnect")]
    OpenIdConnect,
    /// Refresh flavor used by `tymon/jwt-auth` backends.
    #[serde(rename = "laravelJWT")]
    LaravelJwt,
}

impl SchemeKind {
    /// Parse a config name.
    pub fn from_name(name: &str) -> Option<Self> {
        serde_json::from_value(serde_json::Value::String(name.to_string())).ok()
    }
}

/// Where the OAuth `client_secret` goes during server-side exchange.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientSecretTransport {
    /// Form/JSON body field.
    #[default]
    Body,
    /// `Authorization: Basic base64(id:secret)`.
    AuthorizationHeader,
}

/// PKCE challenge method.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodeChallengeMethod {
    /// Verifier sent as-is.
    #[serde(rename = "plain")]
    Plain,
    /// `base64url(sha256(verifier))`.
    S256,
    /// No PKCE.
    #[serde(rename = "implicit")]
    Implicit,
}

/// Options for one credential kind (access, refresh or id token).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CredentialOptions {
    /// Response property holding the credential. `None` means the credential
    /// is not read from responses.
    #[serde(deserialize_with = "falsy::option")]
    pub property: Option<String>,
    /// Response property holding the lifetime in seconds.
    #[serde(deserialize_with = "falsy::option")]
    pub expires_property: Option<String>,
    /// Request body field the refresh token is sent in.
    #[serde(deserialize_with = "falsy::option")]
    pub data: Option<String>,
    /// Type label prefixed to the value (`Bearer`).
    #[serde(rename = "type", deserialize_with = "falsy::option")]
    pub kind: Option<String>,
    /// Header the access token is sent in.
    pub name: String,
    /// Fallback lifetime in seconds when neither the response nor a JWT
    /// `exp` says otherwise.
    #[serde(deserialize_with = "falsy::option")]
    pub max_age: Option<u64>,
    /// Attach to every request rather than only to scheme endpoints.
    pub global: bool,
    /// Must be present in login/refresh responses.
    pub required: bool,
    /// Refresh calls must carry the access token header.
    pub token_required: bool,
    /// Storage key prefix for the value.
    pub prefix: String,
    /// Storage key prefix for the expiration.
    pub expiration_prefix: String,
    /// Durable copy lives in an httpOnly cookie the client cannot clear.
    pub http_only: bool,
}

impl Default for CredentialOptions {
    fn default() -> Self {
        Self {
            property: None,
            expires_property: None,
            data: None,
            kind: None,
            name: "Authorization".to_string(),
            max_age: None,
            global: false,
            required: false,
            token_required: false,
            prefix: "_token.".to_string(),
            expiration_prefix: "_token_expiration.".to_string(),
            http_only: false,
        }
    }
}

/// How the user object is read.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserOptions {
    /// Response property holding the user. `None` uses the whole body.
    #[serde(deserialize_with = "falsy::option")]
    pub property: Option<String>,
    /// Fetch the user right after login.
    pub auto_fetch: bool,
}

impl Default for UserOptions {
    fn default() -> Self {
        Self {
            property: None,
            auto_fetch: true,
        }
    }
}

/// Session cookie options of the cookie scheme.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchemeCookieOptions {
    /// Cookie whose presence means "logged in".
    #[serde(deserialize_with = "falsy::option")]
    pub name: Option<String>,
    /// Forward the incoming cookie header during server rendering.
    pub server: bool,
}

/// Fully resolved options of one strategy.
///
/// A flat union over every scheme; each scheme reads the fields it needs.
/// Produced by [`crate::resolve_strategies`] after defaults and provider
/// presets are merged in.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StrategyOptions {
    /// Strategy name (registry key).
    pub name: String,
    /// Scheme implementing the strategy.
    pub scheme: SchemeKind,
    /// Provider preset applied underneath.
    #[serde(deserialize_with = "falsy::option", skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Base URL of a provider API (laravel presets).
    #[serde(deserialize_with = "falsy::option", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Tenant domain (auth0 preset).
    #[serde(deserialize_with = "falsy::option", skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Endpoints.
    pub endpoints: Endpoints,
    /// Access token.
    pub token: CredentialOptions,
    /// Refresh token.
    pub refresh_token: CredentialOptions,
    /// OIDC id token.
    pub id_token: CredentialOptions,
    /// User fetching.
    pub user: UserOptions,
    /// Cookie scheme session cookie.
    pub cookie: SchemeCookieOptions,
    /// OAuth / password-grant client id.
    #[serde(deserialize_with = "falsy::option", skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Server-only secret. Never serialized.
    #[serde(deserialize_with = "falsy::option", skip_serializing)]
    pub client_secret: Option<String>,
    /// How the secret is sent during server-side exchange.
    pub client_secret_transport: ClientSecretTransport,
    /// `grant_type` added to login bodies / code exchange.
    #[serde(deserialize_with = "falsy::option", skip_serializing_if = "Option::is_none")]
    pub grant_type: Option<String>,
    /// Requested scopes.
    #[serde(deserialize_with = "falsy::scope")]
    pub scope: Vec<String>,
    /// Reset the session when the access token expires instead of waiting for a refresh.
    pub auto_logout: bool,
    /// OAuth `response_type`.
    pub response_type: String,
    /// OAuth `access_type`.
    #[serde(deserialize_with = "falsy::option", skip_serializing_if = "Option::is_none")]
    pub access_type: Option<String>,
    /// PKCE method. `None` disables PKCE.
    #[serde(deserialize_with = "falsy::option", skip_serializing_if = "Option::is_none")]
    pub code_challenge_method: Option<CodeChallengeMethod>,
    /// Explicit OAuth `redirect_uri`; defaults to base URL + callback route.
    #[serde(deserialize_with = "falsy::option", skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    /// Explicit post-logout redirect; defaults to base URL + logout route.
    #[serde(deserialize_with = "falsy::option", skip_serializing_if = "Option::is_none")]
    pub logout_redirect_uri: Option<String>,
    /// OAuth `audience`.
    #[serde(deserialize_with = "falsy::option", skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,
    /// OAuth `organization`.
    #[serde(deserialize_with = "falsy::option", skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    /// OAuth `response_mode`.
    #[serde(deserialize_with = "falsy::option", skip_serializing_if = "Option::is_none")]
    pub response_mode: Option<String>,
    /// OIDC `acr_values`.
    #[serde(deserialize_with = "falsy::option", skip_serializing_if = "Option::is_none")]
    pub acr_values: Option<String>,
    /// OIDC: read the user from the user-info endpoint instead of id token claims.
    pub fetch_remote: bool,
    /// Credentials are managed across server rendering (enables httpOnly clears).
    pub ssr: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
