//! HTTP capability used by schemes: requests, responses, interceptors.
//!
//! The transport is injected through [`HttpTransport`]; [`HttpClient`] layers
//! default headers and interceptor chains on top of it.

mod client;
mod transport;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::{Map, Value};
use url::Url;
pub use warden_settings::HttpMethod;
use warden_settings::Endpoint;

pub use client::{HttpClient, InterceptorId};
pub use transport::ReqwestTransport;

use crate::errors::{AuthError, Result};

/// Request body.
#[derive(Clone, Debug, PartialEq)]
pub enum RequestBody {
    /// `application/json`.
    Json(Value),
    /// `application/x-www-form-urlencoded`.
    Form(Vec<(String, String)>),
}

/// A request as callers and interceptors see it. Unset fields are filled
/// from an [`Endpoint`] by [`HttpRequest::merged_with`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HttpRequest {
    /// Verb; `GET` when still unset at send time.
    pub method: Option<HttpMethod>,
    /// Path or absolute URL.
    pub url: Option<String>,
    /// Base URL override. An empty string means the app origin.
    pub base_url: Option<String>,
    /// Headers. Lookups are case-insensitive.
    pub headers: BTreeMap<String, String>,
    /// Extra query pairs.
    pub query: Vec<(String, String)>,
    /// Body.
    pub body: Option<RequestBody>,
    /// Send cookies cross-origin.
    pub with_credentials: bool,
}

impl HttpRequest {
    /// A request for `url` with the given verb.
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method: Some(method),
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Fill unset fields from `endpoint`. Caller headers win.
    pub fn merged_with(mut self, endpoint: &Endpoint) -> Self {
        if self.method.is_none() {
            self.method = Some(endpoint.method);
        }
        if self.url.is_none() {
            self.url = Some(endpoint.url.clone());
        }
        if self.base_url.is_none() {
            self.base_url.clone_from(&endpoint.base_url);
        }
        for (name, value) in &endpoint.headers {
            if !self.has_header(name) {
                let _ = self.headers.insert(name.clone(), value.clone());
            }
        }
        self.with_credentials |= endpoint.with_credentials;
        self
    }

    /// Header value, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether a header is present.
    pub fn has_header(&self, name: &str) -> bool {
        self.header(name).is_some()
    }

    /// Set a header, replacing any case variant.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.retain(|k, _| !k.eq_ignore_ascii_case(name));
        let _ = self.headers.insert(name.to_string(), value.into());
    }

    /// The JSON body object, created (replacing a non-object body) if needed.
    pub fn json_body_mut(&mut self) -> &mut Map<String, Value> {
        if !matches!(self.body, Some(RequestBody::Json(Value::Object(_)))) {
            self.body = Some(RequestBody::Json(Value::Object(Map::new())));
        }
        match &mut self.body {
            Some(RequestBody::Json(Value::Object(map))) => map,
            _ => unreachable!("body was just set to an object"),
        }
    }

    /// Builder-style JSON body.
    #[must_use]
    pub fn with_json(mut self, body: Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }
}

/// A request with every field resolved, as handed to the transport.
#[derive(Clone, Debug, PartialEq)]
pub struct OutgoingRequest {
    /// Verb.
    pub method: HttpMethod,
    /// Absolute URL including query.
    pub url: Url,
    /// Final headers.
    pub headers: BTreeMap<String, String>,
    /// Body.
    pub body: Option<RequestBody>,
    /// Send cookies cross-origin.
    pub with_credentials: bool,
}

/// A response with the body decoded as JSON (or a JSON string when it is not
/// JSON, or null when empty).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response headers, lower-cased names.
    pub headers: BTreeMap<String, String>,
    /// Decoded body.
    pub data: Value,
}

impl HttpResponse {
    /// 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// `Ok(self)` for 2xx, otherwise [`AuthError::Http`].
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(AuthError::Http {
                status: self.status,
                body: self.data,
            })
        }
    }
}

/// Sends fully resolved requests. Returns a response for every status.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send one request.
    async fn send(&self, request: OutgoingRequest) -> Result<HttpResponse>;
}

/// Runs before a request is sent and may rewrite or reject it.
#[async_trait]
pub trait RequestInterceptor: Send + Sync {
    /// Inspect or rewrite `request`.
    async fn intercept(&self, request: HttpRequest) -> Result<HttpRequest>;
}

/// Runs when a request fails and may replace the error.
#[async_trait]
pub trait ResponseErrorInterceptor: Send + Sync {
    /// Inspect or replace `error`.
    async fn intercept(&self, error: AuthError) -> AuthError;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
