use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::falsy;

/// HTTP verb of an endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    /// GET
    #[default]
    #[serde(alias = "GET")]
    Get,
    /// POST
    #[serde(alias = "POST")]
    Post,
    /// PUT
    #[serde(alias = "PUT")]
    Put,
    /// PATCH
    #[serde(alias = "PATCH")]
    Patch,
    /// DELETE
    #[serde(alias = "DELETE")]
    Delete,
}

impl HttpMethod {
    /// Uppercase verb.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

/// One configured endpoint. A bare string in config is shorthand for
/// `{ "url": "..." }`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "EndpointRepr")]
pub struct Endpoint {
    /// Path or absolute URL.
    pub url: String,
    /// Verb.
    pub method: HttpMethod,
    /// Extra headers sent with every call.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// Send cookies cross-origin.
    pub with_credentials: bool,
    /// Overrides the client base URL. An empty string means the app origin.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl Endpoint {
    /// An endpoint with the given verb and url.
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            headers: BTreeMap::new(),
            with_credentials: false,
            base_url: None,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EndpointRepr {
    Url(String),
    Full(EndpointFields),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EndpointFields {
    url: String,
    #[serde(default)]
    method: HttpMethod,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    #[serde(default)]
    with_credentials: bool,
    #[serde(default)]
    base_url: Option<String>,
}

impl From<EndpointRepr> for Endpoint {
    fn from(repr: EndpointRepr) -> Self {
        match repr {
            EndpointRepr::Url(url) => Self::new(HttpMethod::Get, url),
            EndpointRepr::Full(f) => Self {
                url: f.url,
                method: f.method,
                headers: f.headers,
                with_credentials: f.with_credentials,
                base_url: f.base_url,
            },
        }
    }
}

/// Every endpoint a scheme may use. Which ones matter depends on the scheme.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Endpoints {
    /// Credential login.
    #[serde(deserialize_with = "falsy::option", skip_serializing_if = "Option::is_none")]
    pub login: Option<Endpoint>,
    /// Server-side logout.
    #[serde(deserialize_with = "falsy::option", skip_serializing_if = "Option::is_none")]
    pub logout: Option<Endpoint>,
    /// Current user.
    #[serde(deserialize_with = "falsy::option", skip_serializing_if = "Option::is_none")]
    pub user: Option<Endpoint>,
    /// Refresh-token exchange.
    #[serde(deserialize_with = "falsy::option", skip_serializing_if = "Option::is_none")]
    pub refresh: Option<Endpoint>,
    /// CSRF cookie priming (cookie scheme).
    #[serde(deserialize_with = "falsy::option", skip_serializing_if = "Option::is_none")]
    pub csrf: Option<Endpoint>,
    /// OAuth token endpoint.
    #[serde(deserialize_with = "falsy::option", skip_serializing_if = "Option::is_none")]
    pub token: Option<Endpoint>,
    /// OAuth authorization endpoint.
    #[serde(deserialize_with = "falsy::option", skip_serializing_if = "Option::is_none")]
    pub authorization: Option<Endpoint>,
    /// OAuth / OIDC user-info endpoint.
    #[serde(deserialize_with = "falsy::option", skip_serializing_if = "Option::is_none")]
    pub user_info: Option<Endpoint>,
    /// OIDC discovery document.
    #[serde(deserialize_with = "falsy::option", skip_serializing_if = "Option::is_none")]
    pub configuration: Option<Endpoint>,
}

impl Endpoints {
    /// Urls of all configured endpoints.
    pub fn urls(&self) -> impl Iterator<Item = &str> {
        [
            &self.login,
            &self.logout,
            &self.user,
            &self.refresh,
            &self.csrf,
            &self.token,
            &self.authorization,
            &self.user_info,
            &self.configuration,
        ]
        .into_iter()
        .filter_map(|e| e.as_ref().map(|e| e.url.as_str()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
