//! `AuthServer`: the endpoints that need server-held state.
//!
//! - `POST /_auth/reset` clears an httpOnly credential cookie
//! - `POST /_auth/oauth/{name}/authorize` runs code and refresh-token exchanges
//!   with the strategy's client secret
//! - `POST /_auth/{name}/token` proxies resource-owner password grants

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use serde_json::{Map, Value};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, instrument};
use url::Url;
use warden_settings::{AuthOptions, ClientSecretTransport, CookieOptions, GrantKind, ServerGrant, resolve_strategies};
use warden_storage::{build_cookie, decode_value, encode_value};

use crate::errors::ServerError;
use crate::payload::Payload;

/// Route clearing httpOnly credentials.
pub const RESET_ROUTE: &str = "/_auth/reset";

/// Shared state of the auth endpoints.
pub struct AuthServer {
    options: AuthOptions,
    grants: HashMap<String, ServerGrant>,
    http: reqwest::Client,
}

impl AuthServer {
    /// Resolve `options` and collect every server grant.
    pub fn new(options: AuthOptions) -> Result<Self, ServerError> {
        Self::with_client(options, reqwest::Client::new())
    }

    /// Like [`new`](Self::new) with a preconfigured provider client.
    pub fn with_client(options: AuthOptions, http: reqwest::Client) -> Result<Self, ServerError> {
        let resolved = resolve_strategies(&options)?;
        let grants: HashMap<_, _> = resolved
            .grants
            .into_iter()
            .map(|grant| (grant.strategy.clone(), grant))
            .collect();
        info!(grants = grants.len(), "auth server configured");
        Ok(Self { options, grants, http })
    }

    /// Options the server was built from.
    pub fn options(&self) -> &AuthOptions {
        &self.options
    }

    /// Grant of `strategy`, when it has one of `kind`.
    pub fn grant(&self, strategy: &str, kind: GrantKind) -> Option<&ServerGrant> {
        self.grants.get(strategy).filter(|g| g.kind == kind)
    }

    /// Axum router serving every auth endpoint.
    pub fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route(RESET_ROUTE, post(reset_handler))
            .route("/_auth/oauth/{name}/authorize", post(authorize_handler))
            .route("/_auth/{name}/token", post(password_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(Arc::clone(self))
    }

    fn lookup(&self, strategy: &str, kind: GrantKind) -> Result<&ServerGrant, ServerError> {
        self.grant(strategy, kind)
            .ok_or_else(|| ServerError::UnknownGrant(strategy.to_string()))
    }

    fn refresh_cookie_name(&self, grant: &ServerGrant) -> String {
        format!(
            "{}{}{}",
            self.options.stores.cookie.prefix, grant.refresh_token.prefix, grant.strategy
        )
    }

    fn token_url(&self, grant: &ServerGrant) -> Result<Url, ServerError> {
        if let Ok(url) = Url::parse(&grant.token_endpoint) {
            return Ok(url);
        }
        let base = self.options.base_url.as_deref().ok_or_else(|| {
            ServerError::Configuration(format!(
                "relative token endpoint of {} needs baseUrl",
                grant.strategy
            ))
        })?;
        Url::parse(base)
            .and_then(|base| base.join(&grant.token_endpoint))
            .map_err(|e| ServerError::Configuration(e.to_string()))
    }

    async fn exchange(&self, grant: &ServerGrant, mut body: Map<String, Value>) -> Result<Upstream, ServerError> {
        let url = self.token_url(grant)?;
        let mut request = self.http.post(url).header(ACCEPT, "application/json");
        match grant.client_secret_transport {
            ClientSecretTransport::Body => {
                let _ = body.insert("client_secret".into(), Value::String(grant.client_secret.clone()));
            }
            ClientSecretTransport::AuthorizationHeader => {
                let id = grant.client_id.clone().unwrap_or_default();
                request = request.basic_auth(id, Some(&grant.client_secret));
            }
        }
        let response = request.json(&body).send().await?;
        let status = StatusCode::from_u16(response.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
        let bytes = response.bytes().await?.to_vec();
        debug!(strategy = %grant.strategy, status = status.as_u16(), "provider answered");
        Ok(Upstream { status, bytes })
    }
}

/// Provider response relayed verbatim.
struct Upstream {
    status: StatusCode,
    bytes: Vec<u8>,
}

impl Upstream {
    fn json(&self) -> Option<Value> {
        serde_json::from_slice(&self.bytes).ok()
    }

    fn into_response_with(self, jar: CookieJar) -> Response {
        let content_type = [(CONTENT_TYPE, HeaderValue::from_static("application/json"))];
        (self.status, jar, content_type, self.bytes).into_response()
    }
}

fn insert_opt(body: &mut Map<String, Value>, key: &str, value: Option<String>) {
    if let Some(value) = value {
        let _ = body.insert(key.to_string(), Value::String(value));
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ResetBody {
    token: Option<String>,
}

/// POST /_auth/reset
async fn reset_handler(
    State(server): State<Arc<AuthServer>>,
    jar: CookieJar,
    Payload(body): Payload<ResetBody>,
) -> Result<(StatusCode, CookieJar), ServerError> {
    let key = body
        .token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ServerError::BadRequest("Missing token".to_string()))?;
    let store = &server.options.stores.cookie;
    let name = format!("{}{key}", store.prefix);
    debug!(cookie = %name, "clearing httpOnly credential");
    let options = CookieOptions {
        max_age: Some(-1),
        expires: None,
        ..store.options.clone()
    };
    Ok((StatusCode::NO_CONTENT, jar.add(build_cookie(name, String::new(), &options))))
}

/// Fields a browser posts to the code exchange.
#[derive(Debug, Default, Deserialize)]
struct AuthorizeBody {
    /// Authorization code.
    code: Option<String>,
    /// PKCE verifier.
    code_verifier: Option<String>,
    /// Callback URI the code was issued for.
    redirect_uri: Option<String>,
    /// OAuth `response_type`.
    response_type: Option<String>,
    /// `authorization_code` or `refresh_token`.
    grant_type: Option<String>,
    /// Refresh token, unless it lives in an httpOnly cookie.
    refresh_token: Option<String>,
}

/// POST /_auth/oauth/{name}/authorize
#[instrument(skip_all, fields(strategy = %name))]
async fn authorize_handler(
    State(server): State<Arc<AuthServer>>,
    Path(name): Path<String>,
    jar: CookieJar,
    Payload(body): Payload<AuthorizeBody>,
) -> Result<Response, ServerError> {
    let grant = server.lookup(&name, GrantKind::AuthorizationCode)?;
    let grant_type = body.grant_type.or_else(|| grant.grant_type.clone());
    let cookie_name = server.refresh_cookie_name(grant);
    let refresh_token = if grant.refresh_token.http_only {
        jar.get(&cookie_name).and_then(|c| match decode_value(c.value()) {
            Value::String(s) => Some(s),
            Value::Null => None,
            other => Some(other.to_string()),
        })
    } else {
        body.refresh_token
    };

    let is_refresh = grant_type.as_deref() == Some("refresh_token");
    if grant_type.as_deref() == Some("authorization_code") && body.code.is_none() {
        return Err(ServerError::BadRequest("Missing authorization code".to_string()));
    }
    if is_refresh && refresh_token.is_none() {
        return Err(ServerError::BadRequest("Missing refresh token".to_string()));
    }

    let mut payload = Map::new();
    insert_opt(&mut payload, "client_id", grant.client_id.clone());
    if is_refresh {
        insert_opt(&mut payload, "refresh_token", refresh_token);
    }
    insert_opt(&mut payload, "grant_type", grant_type);
    insert_opt(
        &mut payload,
        "response_type",
        Some(body.response_type.unwrap_or_else(|| grant.response_type.clone())),
    );
    insert_opt(&mut payload, "redirect_uri", body.redirect_uri.or_else(|| grant.redirect_uri.clone()));
    insert_opt(&mut payload, "audience", grant.audience.clone());
    insert_opt(&mut payload, "code_verifier", body.code_verifier);
    insert_opt(&mut payload, "code", body.code);

    let upstream = server.exchange(grant, payload).await?;

    let mut jar = jar;
    if upstream.status.is_success() && grant.refresh_token.http_only && server.options.stores.cookie.enabled {
        let property = grant.refresh_token.property.as_deref().unwrap_or("refresh_token");
        if let Some(value) = upstream.json().as_ref().and_then(|data| data.get(property)) {
            let options = CookieOptions {
                http_only: true,
                ..server.options.stores.cookie.options.clone()
            };
            jar = jar.add(build_cookie(cookie_name, encode_value(value), &options));
            debug!("refresh token stored in httpOnly cookie");
        }
    }
    Ok(upstream.into_response_with(jar))
}

/// POST /_auth/{name}/token
#[instrument(skip_all, fields(strategy = %name))]
async fn password_handler(
    State(server): State<Arc<AuthServer>>,
    Path(name): Path<String>,
    jar: CookieJar,
    Payload(mut body): Payload<Map<String, Value>>,
) -> Result<Response, ServerError> {
    let grant = server.lookup(&name, GrantKind::Password)?;
    if !body.contains_key("grant_type") {
        insert_opt(&mut body, "grant_type", grant.grant_type.clone());
    }
    if !body.contains_key("client_id") {
        insert_opt(&mut body, "client_id", grant.client_id.clone());
    }
    if !body.contains_key("scope") && !grant.scope.is_empty() {
        insert_opt(&mut body, "scope", Some(grant.scope.join(" ")));
    }

    let present = |key: &str| body.get(key).is_some_and(|v| !v.is_null() && v != "");
    match body.get("grant_type").and_then(Value::as_str) {
        Some("password") if !present("username") || !present("password") => {
            return Err(ServerError::BadRequest("Invalid username or password".to_string()));
        }
        Some("refresh_token") if !present("refresh_token") => {
            return Err(ServerError::BadRequest("Refresh token not provided".to_string()));
        }
        _ => {}
    }

    let upstream = server.exchange(grant, body).await?;
    Ok(upstream.into_response_with(jar))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
