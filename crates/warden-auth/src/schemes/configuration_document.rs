//! OpenID Connect discovery (`.well-known/openid-configuration`).

use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::{debug, warn};
use warden_settings::{Endpoint, Endpoints, HttpMethod};

use crate::context::AuthContext;
use crate::errors::{AuthError, Result};
use crate::http::HttpRequest;

/// Keys every discovery document must carry.
pub const REQUIRED_KEYS: &[&str] = &[
    "issuer",
    "authorization_endpoint",
    "token_endpoint",
    "jwks_uri",
    "response_types_supported",
    "subject_types_supported",
    "id_token_signing_alg_values_supported",
];

/// Provider metadata of one strategy, cached in private session state.
pub struct ConfigurationDocument {
    strategy: String,
    endpoint: Option<Endpoint>,
}

impl ConfigurationDocument {
    /// Document of `strategy`, fetched from `endpoint`.
    pub fn new(strategy: &str, endpoint: Option<Endpoint>) -> Self {
        Self {
            strategy: strategy.to_string(),
            endpoint,
        }
    }

    fn key(&self) -> String {
        format!("_configuration_document.{}", self.strategy)
    }

    /// Cached document.
    pub fn get(&self, ctx: &AuthContext) -> Option<Map<String, Value>> {
        match ctx.storage().get_state(&self.key()) {
            Some(Value::Object(document)) => Some(document),
            _ => None,
        }
    }

    fn set(&self, ctx: &AuthContext, document: Option<Map<String, Value>>) {
        ctx.storage().set_state(&self.key(), document.map(Value::Object));
    }

    async fn fetch(&self, ctx: &AuthContext) -> Result<Map<String, Value>> {
        let endpoint = self.endpoint.as_ref().ok_or_else(|| {
            AuthError::ConfigurationDocument(format!("strategy {} has no configuration endpoint", self.strategy))
        })?;
        let request = HttpRequest::new(HttpMethod::Get, endpoint.url.clone()).merged_with(endpoint);
        let response = ctx.http().raw(request).await?;
        match response.data {
            Value::Object(document) => Ok(document),
            _ => Err(AuthError::ConfigurationDocument("response is not a JSON object".to_string())),
        }
    }

    /// Fail on the first missing required key.
    pub fn validate(document: &Map<String, Value>) -> Result<()> {
        match REQUIRED_KEYS.iter().find(|key| !document.contains_key(**key)) {
            Some(key) => Err(AuthError::ConfigurationDocument(format!("missing required key {key}"))),
            None => Ok(()),
        }
    }

    /// Load the document (cached or fetched) and fill every endpoint the
    /// strategy left unset. An invalid document still fills endpoints; the
    /// validation error is returned afterwards.
    pub async fn init(&self, ctx: &AuthContext, endpoints: &RwLock<Endpoints>) -> Result<()> {
        let document = match self.get(ctx) {
            Some(document) => document,
            None => {
                let document = self.fetch(ctx).await?;
                debug!(strategy = %self.strategy, "configuration document fetched");
                document
            }
        };
        self.set(ctx, Some(document.clone()));

        let validation = Self::validate(&document);
        if let Err(e) = &validation {
            warn!(strategy = %self.strategy, error = %e, "configuration document is incomplete");
        }

        let url = |key: &str| document.get(key).and_then(Value::as_str).map(ToString::to_string);
        let mut endpoints = endpoints.write();
        fill(&mut endpoints.authorization, url("authorization_endpoint"), HttpMethod::Get);
        fill(&mut endpoints.token, url("token_endpoint"), HttpMethod::Post);
        fill(&mut endpoints.user_info, url("userinfo_endpoint"), HttpMethod::Get);
        fill(&mut endpoints.logout, url("end_session_endpoint"), HttpMethod::Get);
        validation
    }

    /// Forget the cached document.
    pub fn reset(&self, ctx: &AuthContext) {
        self.set(ctx, None);
    }
}

fn fill(slot: &mut Option<Endpoint>, url: Option<String>, method: HttpMethod) {
    if slot.is_none() {
        *slot = url.map(|url| Endpoint::new(method, url));
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
