//! Strategy resolution: defaults + provider preset + user config → typed
//! [`StrategyOptions`], plus the server-side grant records that keep
//! `client_secret` off the client.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::defaults::scheme_defaults;
use crate::errors::{Result, SettingsError};
use crate::loader::deep_merge;
use crate::providers::{assign_absolute_endpoints, provider_preset};
use crate::types::{
    AuthOptions, ClientSecretTransport, CredentialOptions, Endpoint, HttpMethod, SchemeKind,
    StrategyOptions,
};

/// Which server-side exchange a grant proxies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GrantKind {
    /// `POST /_auth/oauth/{name}/authorize`: code and refresh-token exchange.
    AuthorizationCode,
    /// `POST /_auth/{name}/token`: resource-owner password grant.
    Password,
}

/// Server-held half of a strategy whose provider needs a client secret.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerGrant {
    /// Strategy name.
    pub strategy: String,
    /// Exchange kind.
    pub kind: GrantKind,
    /// Provider token endpoint the server forwards to.
    pub token_endpoint: String,
    /// OAuth client id.
    pub client_id: Option<String>,
    /// OAuth client secret.
    pub client_secret: String,
    /// Where the secret goes.
    pub client_secret_transport: ClientSecretTransport,
    /// Default `redirect_uri` when the client omits it.
    pub redirect_uri: Option<String>,
    /// Default `response_type`.
    pub response_type: String,
    /// Default `grant_type`.
    pub grant_type: Option<String>,
    /// `audience` forwarded to the provider.
    pub audience: Option<String>,
    /// Scopes forwarded on password grants.
    pub scope: Vec<String>,
    /// Refresh token handling (httpOnly cookie issuance).
    pub refresh_token: CredentialOptions,
}

/// Output of [`resolve_strategies`].
#[derive(Clone, Debug, Default)]
pub struct ResolvedStrategies {
    /// Typed strategies in declaration order.
    pub strategies: Vec<StrategyOptions>,
    /// Server-side grants, one per proxied strategy.
    pub grants: Vec<ServerGrant>,
    /// Effective default strategy.
    pub default_strategy: Option<String>,
}

impl ResolvedStrategies {
    /// Find a strategy by name.
    pub fn get(&self, name: &str) -> Option<&StrategyOptions> {
        self.strategies.iter().find(|s| s.name == name)
    }

    /// Find the grant of a strategy.
    pub fn grant(&self, name: &str) -> Option<&ServerGrant> {
        self.grants.iter().find(|g| g.strategy == name)
    }
}

/// Resolve every configured strategy.
pub fn resolve_strategies(options: &AuthOptions) -> Result<ResolvedStrategies> {
    let mut resolved = ResolvedStrategies::default();
    for (name, raw) in &options.strategies {
        let mut strategy = resolve_one(name, raw)?;
        if let Some(grant) = extract_grant(&mut strategy)? {
            debug!(strategy = %name, kind = ?grant.kind, "server grant registered");
            resolved.grants.push(grant);
        }
        resolved.strategies.push(strategy);
    }

    resolved.default_strategy = match &options.default_strategy {
        Some(name) if resolved.get(name).is_none() => {
            return Err(SettingsError::InvalidValue(format!(
                "defaultStrategy '{name}' is not a configured strategy"
            )));
        }
        Some(name) => Some(name.clone()),
        None => resolved.strategies.first().map(|s| s.name.clone()),
    };
    Ok(resolved)
}

fn resolve_one(name: &str, raw: &Value) -> Result<StrategyOptions> {
    let raw = match raw {
        Value::Object(_) => raw.clone(),
        Value::Null | Value::Bool(true) => Value::Object(serde_json::Map::new()),
        other => {
            return Err(SettingsError::InvalidValue(format!(
                "strategy '{name}' must be an object, got {other}"
            )));
        }
    };

    let provider = raw.get("provider").and_then(Value::as_str);
    let preset = provider
        .map(|p| provider_preset(name, p, &raw))
        .transpose()?
        .unwrap_or_else(|| Value::Object(serde_json::Map::new()));

    let scheme_name = raw
        .get("scheme")
        .or_else(|| preset.get("scheme"))
        .and_then(Value::as_str)
        .unwrap_or(name)
        .to_string();
    let scheme = SchemeKind::from_name(&scheme_name).ok_or_else(|| SettingsError::UnknownScheme {
        strategy: name.to_string(),
        scheme: scheme_name.clone(),
    })?;

    let mut merged = deep_merge(deep_merge(scheme_defaults(scheme), preset), raw);
    if let Value::Object(map) = &mut merged {
        let _ = map.insert("name".into(), Value::String(name.to_string()));
        let _ = map.insert("scheme".into(), serde_json::to_value(scheme)?);
    }
    assign_absolute_endpoints(&mut merged);

    Ok(serde_json::from_value(merged)?)
}

fn extract_grant(strategy: &mut StrategyOptions) -> Result<Option<ServerGrant>> {
    let is_oauth = matches!(strategy.scheme, SchemeKind::Oauth2 | SchemeKind::OpenIdConnect);
    let needs_proxy = strategy.provider.as_deref() == Some("github") || strategy.client_secret.is_some();
    if !needs_proxy {
        return Ok(None);
    }

    let name = strategy.name.clone();
    let missing = |field: &'static str| SettingsError::MissingField {
        strategy: name.clone(),
        field,
    };

    if is_oauth {
        let client_secret = strategy.client_secret.take().ok_or_else(|| missing("clientSecret"))?;
        let token_endpoint = strategy
            .endpoints
            .token
            .as_ref()
            .map(|e| e.url.clone())
            .ok_or_else(|| missing("endpoints.token"))?;
        strategy.endpoints.token = Some(Endpoint::new(
            HttpMethod::Post,
            format!("/_auth/oauth/{}/authorize", strategy.name),
        ));
        strategy.response_type = "code".to_string();
        return Ok(Some(ServerGrant {
            strategy: strategy.name.clone(),
            kind: GrantKind::AuthorizationCode,
            token_endpoint,
            client_id: strategy.client_id.clone(),
            client_secret,
            client_secret_transport: strategy.client_secret_transport,
            redirect_uri: strategy.redirect_uri.clone(),
            response_type: strategy.response_type.clone(),
            grant_type: strategy.grant_type.clone(),
            audience: strategy.audience.clone(),
            scope: strategy.scope.clone(),
            refresh_token: strategy.refresh_token.clone(),
        }));
    }

    if strategy.grant_type.as_deref() != Some("password") {
        // a secret on a non-password local strategy would leak to the client
        strategy.client_secret = None;
        return Ok(None);
    }
    let client_secret = strategy.client_secret.take().ok_or_else(|| missing("clientSecret"))?;
    let token_endpoint = strategy
        .endpoints
        .login
        .as_ref()
        .map(|e| e.url.clone())
        .ok_or_else(|| missing("endpoints.login"))?;
    let proxy = format!("/_auth/{}/token", strategy.name);
    strategy.endpoints.login = Some(Endpoint::new(HttpMethod::Post, proxy.clone()));
    if strategy.endpoints.refresh.is_some() {
        strategy.endpoints.refresh = Some(Endpoint::new(HttpMethod::Post, proxy));
    }
    Ok(Some(ServerGrant {
        strategy: strategy.name.clone(),
        kind: GrantKind::Password,
        token_endpoint,
        client_id: strategy.client_id.clone(),
        client_secret,
        client_secret_transport: strategy.client_secret_transport,
        redirect_uri: None,
        response_type: strategy.response_type.clone(),
        grant_type: strategy.grant_type.clone(),
        audience: strategy.audience.clone(),
        scope: strategy.scope.clone(),
        refresh_token: strategy.refresh_token.clone(),
    }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn options(strategies: Value) -> AuthOptions {
        serde_json::from_value(json!({ "strategies": strategies })).unwrap()
    }

    #[test]
    fn scheme_defaults_to_strategy_name() {
        let r = resolve_strategies(&options(json!({"local": {}, "refresh": {}}))).unwrap();
        assert_eq!(r.get("local").unwrap().scheme, SchemeKind::Local);
        assert_eq!(r.get("refresh").unwrap().scheme, SchemeKind::Refresh);
    }

    #[test]
    fn first_strategy_is_default() {
        let r = resolve_strategies(&options(json!({"refresh": {}, "local": {}}))).unwrap();
        assert_eq!(r.default_strategy.as_deref(), Some("refresh"));
    }

    #[test]
    fn explicit_default_must_exist() {
        let mut o = options(json!({"local": {}}));
        o.default_strategy = Some("google".into());
        assert_matches!(resolve_strategies(&o), Err(SettingsError::InvalidValue(_)));
    }

    #[test]
    fn unknown_scheme_rejected() {
        let err = resolve_strategies(&options(json!({"corp": {}}))).unwrap_err();
        assert_matches!(err, SettingsError::UnknownScheme { .. });
    }

    #[test]
    fn user_config_overrides_defaults() {
        let r = resolve_strategies(&options(json!({
            "local": {
                "token": {"property": "access_token", "maxAge": 1800},
                "endpoints": {"user": false}
            }
        })))
        .unwrap();
        let local = r.get("local").unwrap();
        assert_eq!(local.token.property.as_deref(), Some("access_token"));
        assert_eq!(local.token.max_age, Some(1800));
        assert_eq!(local.token.kind.as_deref(), Some("Bearer"));
        assert!(local.endpoints.user.is_none());
        assert!(local.endpoints.login.is_some());
    }

    #[test]
    fn laravel_jwt_endpoints_become_absolute() {
        let r = resolve_strategies(&options(json!({
            "laravelJWT": {"provider": "laravelJWT", "url": "https://api.example.com"}
        })))
        .unwrap();
        let s = r.get("laravelJWT").unwrap();
        assert_eq!(s.scheme, SchemeKind::LaravelJwt);
        assert_eq!(s.endpoints.refresh.as_ref().unwrap().url, "https://api.example.com/api/auth/refresh");
        assert!(s.refresh_token.token_required);
        assert!(!s.refresh_token.required);
        assert_eq!(s.refresh_token.property, None);
        assert_eq!(s.token.max_age, Some(3600));
    }

    #[test]
    fn laravel_jwt_without_url_fails() {
        let err = resolve_strategies(&options(json!({"laravelJWT": {"provider": "laravelJWT"}}))).unwrap_err();
        assert_matches!(err, SettingsError::MissingField { field: "url", .. });
    }

    #[test]
    fn github_gets_authorize_proxy() {
        let r = resolve_strategies(&options(json!({
            "github": {"provider": "github", "clientId": "id", "clientSecret": "secret"}
        })))
        .unwrap();
        let s = r.get("github").unwrap();
        assert_eq!(s.client_secret, None);
        assert_eq!(s.response_type, "code");
        assert_eq!(s.endpoints.token.as_ref().unwrap().url, "/_auth/oauth/github/authorize");

        let grant = r.grant("github").unwrap();
        assert_eq!(grant.kind, GrantKind::AuthorizationCode);
        assert_eq!(grant.client_secret, "secret");
        assert_eq!(grant.token_endpoint, "https://github.com/login/oauth/access_token");
    }

    #[test]
    fn github_without_secret_fails() {
        let err = resolve_strategies(&options(json!({"github": {"provider": "github"}}))).unwrap_err();
        assert_matches!(err, SettingsError::MissingField { field: "clientSecret", .. });
    }

    #[test]
    fn password_grant_proxy() {
        let r = resolve_strategies(&options(json!({
            "passport": {
                "scheme": "refresh",
                "grantType": "password",
                "clientId": "2",
                "clientSecret": "s3cret",
                "endpoints": {"login": {"url": "https://api.example.com/oauth/token", "method": "post"}}
            }
        })))
        .unwrap();
        let s = r.get("passport").unwrap();
        assert_eq!(s.endpoints.login.as_ref().unwrap().url, "/_auth/passport/token");
        assert_eq!(s.endpoints.refresh.as_ref().unwrap().url, "/_auth/passport/token");
        let grant = r.grant("passport").unwrap();
        assert_eq!(grant.kind, GrantKind::Password);
        assert_eq!(grant.token_endpoint, "https://api.example.com/oauth/token");
    }

    #[test]
    fn google_scopes_from_preset() {
        let r = resolve_strategies(&options(json!({"google": {"provider": "google", "clientId": "x"}}))).unwrap();
        let s = r.get("google").unwrap();
        assert_eq!(s.scheme, SchemeKind::Oauth2);
        assert_eq!(s.scope, vec!["openid", "profile", "email"]);
        assert!(r.grants.is_empty());
    }
}
