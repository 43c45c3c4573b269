//! Credential records: access token, refresh token, id token.
//!
//! Each credential is persisted through [`Storage`] under two keys, one for
//! the value and one for its expiry. Status is always derived from that pair
//! via [`TokenStatus`], never stored.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, warn};
use warden_core::Clock;
use warden_settings::{CredentialOptions, HttpMethod};
use warden_storage::{BackendKind, BackendSet, Storage};

use crate::context::AuthContext;
use crate::errors::Result;
use crate::http::{HttpClient, HttpRequest, RequestBody};
use crate::jwt;
use crate::token_status::TokenStatus;
use crate::utils::{add_token_prefix, remove_token_prefix};

/// Server route that clears an httpOnly credential cookie.
pub const RESET_ROUTE: &str = "/_auth/reset";

/// A stored credential.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CredentialValue {
    /// Present but opaque to the client (httpOnly, or not returned).
    Present,
    /// The credential itself.
    Value(String),
}

impl CredentialValue {
    /// Read a stored JSON value. `true` is the opaque sentinel; `false`, null
    /// and empty strings are absent.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(true) => Some(Self::Present),
            Value::String(s) if !s.is_empty() => Some(Self::Value(s.clone())),
            Value::Number(n) => Some(Self::Value(n.to_string())),
            _ => None,
        }
    }

    /// JSON form for storage.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Present => Value::Bool(true),
            Self::Value(s) => Value::String(s.clone()),
        }
    }

    /// The string, unless opaque.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Present => None,
            Self::Value(s) => Some(s),
        }
    }
}

impl From<&str> for CredentialValue {
    fn from(value: &str) -> Self {
        Self::Value(value.to_string())
    }
}

/// Storage plumbing shared by the three credential kinds.
struct CredentialStore {
    strategy: String,
    options: CredentialOptions,
    storage: Arc<Storage>,
    http: Arc<HttpClient>,
    clock: Arc<dyn Clock>,
    include: BackendSet,
}

impl CredentialStore {
    fn new(strategy: &str, options: CredentialOptions, ctx: &AuthContext) -> Self {
        // Client code cannot write an httpOnly cookie; the server owns it.
        let include = if options.http_only && ctx.storage().context().is_client() {
            BackendSet::ALL.without(BackendKind::Cookie)
        } else {
            BackendSet::ALL
        };
        Self {
            strategy: strategy.to_string(),
            options,
            storage: Arc::clone(ctx.storage()),
            http: Arc::clone(ctx.http()),
            clock: Arc::clone(ctx.clock()),
            include,
        }
    }

    fn value_key(&self) -> String {
        format!("{}{}", self.options.prefix, self.strategy)
    }

    fn expiration_key(&self) -> String {
        format!("{}{}", self.options.expiration_prefix, self.strategy)
    }

    fn get(&self) -> Option<CredentialValue> {
        self.storage
            .get_universal(&self.value_key())
            .as_ref()
            .and_then(CredentialValue::from_json)
    }

    fn expiration(&self) -> Option<i64> {
        self.storage
            .get_universal(&self.expiration_key())
            .and_then(|v| v.as_i64())
            .filter(|at| *at != 0)
    }

    fn store(&self, value: &CredentialValue, expires_at: Option<i64>) -> Result<()> {
        self.storage
            .set_universal(&self.value_key(), Some(value.to_json()), self.include)?;
        self.storage
            .set_universal(&self.expiration_key(), expires_at.map(Value::from), self.include)?;
        Ok(())
    }

    fn sync(&self) -> Result<Option<CredentialValue>> {
        let value = self.storage.sync_universal(&self.value_key(), None, self.include)?;
        let _ = self
            .storage
            .sync_universal(&self.expiration_key(), None, self.include)?;
        Ok(value.as_ref().and_then(CredentialValue::from_json))
    }

    fn status(&self) -> TokenStatus {
        TokenStatus::calculate(self.get().is_some(), self.expiration(), self.clock.now_millis())
    }

    /// Prefix `value` and work out its expiry. A decodable JWT `exp` wins
    /// over `expires_in` and the configured max age.
    fn prepare(&self, value: CredentialValue, expires_in: Option<u64>) -> Result<(CredentialValue, Option<i64>)> {
        let value = match value {
            CredentialValue::Value(raw) => CredentialValue::Value(add_token_prefix(&raw, self.options.kind.as_deref())),
            CredentialValue::Present => CredentialValue::Present,
        };

        let ttl_secs = expires_in.filter(|s| *s > 0).or(self.options.max_age).unwrap_or(0);
        let fallback = (ttl_secs > 0).then(|| {
            let ttl = i64::try_from(ttl_secs.saturating_mul(1000)).unwrap_or(i64::MAX);
            self.clock.now_millis().saturating_add(ttl)
        });

        let from_jwt = match &value {
            CredentialValue::Value(v) => {
                jwt::expiration_millis(&remove_token_prefix(v, self.options.kind.as_deref()))?
            }
            CredentialValue::Present => None,
        };
        Ok((value, from_jwt.or(fallback)))
    }

    fn set(&self, value: CredentialValue, expires_in: Option<u64>) -> Result<CredentialValue> {
        let (value, expires_at) = self.prepare(value, expires_in)?;
        self.store(&value, expires_at)?;
        Ok(value)
    }

    async fn clear(&self) -> Result<()> {
        let was_present = self.get().is_some();
        self.storage.remove_universal(&self.value_key())?;
        self.storage.remove_universal(&self.expiration_key())?;

        if self.options.http_only && was_present {
            let mut request = HttpRequest::new(HttpMethod::Post, RESET_ROUTE);
            request.base_url = Some(String::new());
            request.body = Some(RequestBody::Form(vec![("token".to_string(), self.value_key())]));
            match self.http.raw_direct(request).await {
                Ok(_) => debug!(key = %self.value_key(), "server cleared httpOnly credential"),
                Err(e) => warn!(key = %self.value_key(), error = %e, "httpOnly credential clear failed"),
            }
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Token
// ─────────────────────────────────────────────────────────────────────────────

/// Access token. When `global`, its value is also the client's default
/// header.
pub struct Token {
    store: CredentialStore,
}

impl Token {
    /// Access token of `strategy`.
    pub fn new(strategy: &str, options: CredentialOptions, ctx: &AuthContext) -> Self {
        Self {
            store: CredentialStore::new(strategy, options, ctx),
        }
    }

    /// Token options.
    pub fn options(&self) -> &CredentialOptions {
        &self.store.options
    }

    /// Stored value, without side effects.
    pub fn get(&self) -> Option<CredentialValue> {
        self.store.get()
    }

    /// Stored expiry in epoch millis.
    pub fn expiration(&self) -> Option<i64> {
        self.store.expiration()
    }

    /// Store `value` (prefixed with the token type) and its expiry, and push
    /// it into the default header.
    pub fn set(&self, value: CredentialValue, expires_in: Option<u64>) -> Result<CredentialValue> {
        let value = self.store.set(value, expires_in)?;
        self.apply_header(&value);
        Ok(value)
    }

    /// Reconcile memory and header with durable storage.
    pub fn sync(&self) -> Result<Option<CredentialValue>> {
        let value = self.store.sync()?;
        if let Some(value) = &value {
            self.apply_header(value);
        }
        Ok(value)
    }

    /// Clear header, value and expiry.
    pub async fn reset(&self) -> Result<()> {
        self.clear_header();
        self.store.clear().await
    }

    /// Current status.
    pub fn status(&self) -> TokenStatus {
        self.store.status()
    }

    /// Drop the default header (global tokens only).
    pub fn clear_header(&self) {
        if self.store.options.global {
            self.store.http.remove_header(&self.store.options.name);
        }
    }

    fn apply_header(&self, value: &CredentialValue) {
        if let (true, Some(value)) = (self.store.options.global, value.as_str()) {
            self.store.http.set_header(&self.store.options.name, value);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RefreshToken
// ─────────────────────────────────────────────────────────────────────────────

/// Refresh token. Its lifetime is the configured max age unless it is a JWT.
pub struct RefreshToken {
    store: CredentialStore,
}

impl RefreshToken {
    /// Refresh token of `strategy`.
    pub fn new(strategy: &str, options: CredentialOptions, ctx: &AuthContext) -> Self {
        Self {
            store: CredentialStore::new(strategy, options, ctx),
        }
    }

    /// Refresh token options.
    pub fn options(&self) -> &CredentialOptions {
        &self.store.options
    }

    /// Stored value.
    pub fn get(&self) -> Option<CredentialValue> {
        self.store.get()
    }

    /// Stored expiry in epoch millis.
    pub fn expiration(&self) -> Option<i64> {
        self.store.expiration()
    }

    /// Store `value` with the configured max age.
    pub fn set(&self, value: CredentialValue) -> Result<CredentialValue> {
        self.store.set(value, None)
    }

    /// Reconcile memory with durable storage.
    pub fn sync(&self) -> Result<Option<CredentialValue>> {
        self.store.sync()
    }

    /// Clear value and expiry.
    pub async fn reset(&self) -> Result<()> {
        self.store.clear().await
    }

    /// Current status.
    pub fn status(&self) -> TokenStatus {
        self.store.status()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// IdToken
// ─────────────────────────────────────────────────────────────────────────────

/// OpenID Connect id token.
pub struct IdToken {
    store: CredentialStore,
}

impl IdToken {
    /// Id token of `strategy`.
    pub fn new(strategy: &str, options: CredentialOptions, ctx: &AuthContext) -> Self {
        Self {
            store: CredentialStore::new(strategy, options, ctx),
        }
    }

    /// Id token options.
    pub fn options(&self) -> &CredentialOptions {
        &self.store.options
    }

    /// Stored value.
    pub fn get(&self) -> Option<CredentialValue> {
        self.store.get()
    }

    /// Store `value` and its expiry.
    pub fn set(&self, value: CredentialValue) -> Result<CredentialValue> {
        self.store.set(value, None)
    }

    /// Reconcile memory with durable storage.
    pub fn sync(&self) -> Result<Option<CredentialValue>> {
        self.store.sync()
    }

    /// Clear value and expiry.
    pub async fn reset(&self) -> Result<()> {
        self.store.clear().await
    }

    /// Current status.
    pub fn status(&self) -> TokenStatus {
        self.store.status()
    }

    /// Claims of the stored id token.
    pub fn user_info(&self) -> Result<Option<Map<String, Value>>> {
        match self.get() {
            Some(CredentialValue::Value(raw)) => jwt::decode_claims(&raw),
            _ => Ok(None),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
