//! Provider presets.
//!
//! A preset is a JSON table merged between the scheme defaults and the user's
//! strategy config. Presets that talk to a self-hosted API (`laravelJWT`,
//! `laravelSanctum`) need `url`; `auth0` needs `domain`.

use serde_json::{Value, json};

use crate::errors::{Result, SettingsError};

/// Known provider names.
pub const PROVIDERS: &[&str] = &[
    "google",
    "github",
    "facebook",
    "auth0",
    "laravelJWT",
    "laravelSanctum",
];

/// Preset table for `provider`, given the user's raw strategy config.
pub fn provider_preset(strategy: &str, provider: &str, raw: &Value) -> Result<Value> {
    let preset = match provider {
        "google" => json!({
            "scheme": "oauth2",
            "endpoints": {
                "authorization": "https://accounts.google.com/o/oauth2/auth",
                "userInfo": "https://www.googleapis.com/oauth2/v3/userinfo"
            },
            "scope": ["openid", "profile", "email"]
        }),
        "github" => json!({
            "scheme": "oauth2",
            "endpoints": {
                "authorization": "https://github.com/login/oauth/authorize",
                "token": { "url": "https://github.com/login/oauth/access_token", "method": "post" },
                "userInfo": "https://api.github.com/user"
            },
            "scope": ["user", "email"]
        }),
        "facebook" => json!({
            "scheme": "oauth2",
            "endpoints": {
                "authorization": "https://facebook.com/v2.12/dialog/oauth",
                "userInfo": "https://graph.facebook.com/v2.12/me?fields=about,name,picture{url},email"
            },
            "scope": ["public_profile", "email"]
        }),
        "auth0" => {
            let domain = required_str(strategy, raw, "domain")?;
            json!({
                "scheme": "oauth2",
                "endpoints": {
                    "authorization": format!("https://{domain}/authorize"),
                    "userInfo": format!("https://{domain}/userinfo"),
                    "token": { "url": format!("https://{domain}/oauth/token"), "method": "post" },
                    "logout": format!("https://{domain}/v2/logout")
                },
                "scope": ["openid", "profile", "email"]
            })
        }
        "laravelJWT" => {
            let _ = required_str(strategy, raw, "url")?;
            json!({
                "scheme": "laravelJWT",
                "endpoints": {
                    "login": { "url": "/api/auth/login", "method": "post" },
                    "refresh": { "url": "/api/auth/refresh", "method": "post" },
                    "logout": { "url": "/api/auth/logout", "method": "post" },
                    "user": { "url": "/api/auth/user", "method": "get" }
                },
                "token": { "property": "access_token", "maxAge": 3600 },
                "refreshToken": {
                    "property": false,
                    "data": false,
                    "maxAge": 1_209_600,
                    "required": false,
                    "tokenRequired": true
                },
                "user": { "property": false },
                "clientId": false,
                "grantType": false
            })
        }
        "laravelSanctum" => {
            let _ = required_str(strategy, raw, "url")?;
            json!({
                "scheme": "cookie",
                "cookie": { "name": "XSRF-TOKEN" },
                "endpoints": {
                    "csrf": { "url": "/sanctum/csrf-cookie", "method": "get", "withCredentials": true },
                    "login": { "url": "/login", "method": "post", "withCredentials": true },
                    "logout": { "url": "/logout", "method": "post", "withCredentials": true },
                    "user": { "url": "/api/user", "method": "get", "withCredentials": true }
                },
                "user": { "property": false }
            })
        }
        other => {
            return Err(SettingsError::UnknownProvider {
                strategy: strategy.to_string(),
                provider: other.to_string(),
            });
        }
    };
    Ok(preset)
}

/// Prefix every relative endpoint url with the strategy's `url`.
pub fn assign_absolute_endpoints(strategy: &mut Value) {
    let Some(base) = strategy.get("url").and_then(Value::as_str).map(|u| u.trim_end_matches('/').to_string()) else {
        return;
    };
    let Some(endpoints) = strategy.get_mut("endpoints").and_then(Value::as_object_mut) else {
        return;
    };
    for endpoint in endpoints.values_mut() {
        match endpoint {
            Value::String(url) if url.starts_with('/') => *url = format!("{base}{url}"),
            Value::Object(fields) => {
                if let Some(Value::String(url)) = fields.get_mut("url") {
                    if url.starts_with('/') {
                        *url = format!("{base}{url}");
                    }
                }
            }
            _ => {}
        }
    }
}

fn required_str<'a>(strategy: &str, raw: &'a Value, field: &'static str) -> Result<&'a str> {
    raw.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| SettingsError::MissingField {
            strategy: strategy.to_string(),
            field,
        })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
