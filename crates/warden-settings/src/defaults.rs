//! Per-scheme default option tables.
//!
//! Defaults are JSON so they can sit under user config in a
//! [`deep_merge`](crate::deep_merge). Later tables build on earlier ones the
//! same way user config does.

use serde_json::{Value, json};

use crate::loader::deep_merge;
use crate::types::SchemeKind;

/// Default options for `scheme`.
pub fn scheme_defaults(scheme: SchemeKind) -> Value {
    match scheme {
        SchemeKind::Local => local(),
        SchemeKind::Cookie => deep_merge(local(), cookie_overrides()),
        SchemeKind::Refresh => deep_merge(local(), refresh_overrides()),
        SchemeKind::LaravelJwt => deep_merge(
            deep_merge(local(), refresh_overrides()),
            json!({ "scheme": "laravelJWT" }),
        ),
        SchemeKind::Oauth2 => oauth2(),
        SchemeKind::OpenIdConnect => deep_merge(oauth2(), openid_connect_overrides()),
    }
}

fn local() -> Value {
    json!({
        "scheme": "local",
        "endpoints": {
            "login": { "url": "/api/auth/login", "method": "post" },
            "logout": { "url": "/api/auth/logout", "method": "post" },
            "user": { "url": "/api/auth/user", "method": "get" }
        },
        "token": {
            "property": "token",
            "expiresProperty": "expires_in",
            "type": "Bearer",
            "name": "Authorization",
            "maxAge": false,
            "global": true,
            "required": true,
            "prefix": "_token.",
            "expirationPrefix": "_token_expiration."
        },
        "user": { "property": "user", "autoFetch": true },
        "clientId": false,
        "grantType": false,
        "scope": false
    })
}

fn cookie_overrides() -> Value {
    json!({
        "scheme": "cookie",
        "cookie": { "name": null, "server": false },
        "token": {
            "type": false,
            "property": "",
            "maxAge": false,
            "global": false,
            "required": false
        },
        "endpoints": { "csrf": false },
        "user": { "property": false, "autoFetch": true }
    })
}

fn refresh_overrides() -> Value {
    json!({
        "scheme": "refresh",
        "endpoints": {
            "refresh": { "url": "/api/auth/refresh", "method": "post" }
        },
        "refreshToken": {
            "property": "refresh_token",
            "data": "refresh_token",
            "maxAge": 2_592_000,
            "required": true,
            "tokenRequired": false,
            "prefix": "_refresh_token.",
            "expirationPrefix": "_refresh_token_expiration.",
            "httpOnly": false
        },
        "autoLogout": false
    })
}

fn oauth2() -> Value {
    json!({
        "scheme": "oauth2",
        "accessType": null,
        "redirectUri": null,
        "logoutRedirectUri": null,
        "clientId": null,
        "clientSecretTransport": "body",
        "audience": null,
        "grantType": null,
        "responseMode": null,
        "acrValues": null,
        "autoLogout": false,
        "endpoints": {
            "logout": null,
            "authorization": null,
            "token": null,
            "userInfo": null
        },
        "scope": [],
        "token": {
            "property": "access_token",
            "expiresProperty": "expires_in",
            "type": "Bearer",
            "name": "Authorization",
            "maxAge": false,
            "global": true,
            "prefix": "_token.",
            "expirationPrefix": "_token_expiration."
        },
        "idToken": {
            "property": "id_token",
            "maxAge": 1800,
            "prefix": "_id_token.",
            "expirationPrefix": "_id_token_expiration."
        },
        "refreshToken": {
            "property": "refresh_token",
            "maxAge": 2_592_000,
            "prefix": "_refresh_token.",
            "expirationPrefix": "_refresh_token_expiration."
        },
        "user": { "property": false },
        "responseType": "token",
        "codeChallengeMethod": false
    })
}

fn openid_connect_overrides() -> Value {
    json!({
        "scheme": "openIDConnect",
        "responseType": "code",
        "grantType": "authorization_code",
        "scope": ["openid", "profile", "offline_access"],
        "logoutRedirectUri": null,
        "fetchRemote": false,
        "codeChallengeMethod": "S256"
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
