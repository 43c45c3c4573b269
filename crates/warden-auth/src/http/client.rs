//! Interceptor-capable HTTP client.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::debug;
use url::Url;

use super::{
    HttpRequest, HttpResponse, HttpTransport, OutgoingRequest, RequestInterceptor, ResponseErrorInterceptor,
};
use crate::errors::{AuthError, Result};

/// Handle returned when an interceptor is registered; pass it back to eject.
pub type InterceptorId = u64;

/// HTTP client with default headers and request / response-error interceptors.
pub struct HttpClient {
    transport: Arc<dyn HttpTransport>,
    base_url: Option<Url>,
    headers: RwLock<BTreeMap<String, String>>,
    request_interceptors: RwLock<Vec<(InterceptorId, Arc<dyn RequestInterceptor>)>>,
    error_interceptors: RwLock<Vec<(InterceptorId, Arc<dyn ResponseErrorInterceptor>)>>,
    next_id: AtomicU64,
}

impl HttpClient {
    /// Client sending through `transport`. Relative urls resolve against
    /// `base_url`, which is also the app origin.
    pub fn new(transport: Arc<dyn HttpTransport>, base_url: Option<Url>) -> Self {
        Self {
            transport,
            base_url,
            headers: RwLock::new(BTreeMap::new()),
            request_interceptors: RwLock::new(Vec::new()),
            error_interceptors: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    // ── Default headers ─────────────────────────────────────────────

    /// Default header value, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .read()
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    }

    /// Set a default header sent with every request.
    pub fn set_header(&self, name: &str, value: impl Into<String>) {
        let mut headers = self.headers.write();
        headers.retain(|k, _| !k.eq_ignore_ascii_case(name));
        let _ = headers.insert(name.to_string(), value.into());
    }

    /// Remove a default header.
    pub fn remove_header(&self, name: &str) {
        self.headers.write().retain(|k, _| !k.eq_ignore_ascii_case(name));
    }

    // ── Interceptors ────────────────────────────────────────────────

    fn next_id(&self) -> InterceptorId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a request interceptor. Interceptors run in registration order.
    pub fn add_request_interceptor(&self, interceptor: Arc<dyn RequestInterceptor>) -> InterceptorId {
        let id = self.next_id();
        self.request_interceptors.write().push((id, interceptor));
        id
    }

    /// Remove a request interceptor. Unknown ids are ignored.
    pub fn eject_request_interceptor(&self, id: InterceptorId) {
        self.request_interceptors.write().retain(|(i, _)| *i != id);
    }

    /// Register a response-error interceptor.
    pub fn add_error_interceptor(&self, interceptor: Arc<dyn ResponseErrorInterceptor>) -> InterceptorId {
        let id = self.next_id();
        self.error_interceptors.write().push((id, interceptor));
        id
    }

    /// Remove a response-error interceptor. Unknown ids are ignored.
    pub fn eject_error_interceptor(&self, id: InterceptorId) {
        self.error_interceptors.write().retain(|(i, _)| *i != id);
    }

    /// Number of registered request interceptors.
    pub fn request_interceptor_count(&self) -> usize {
        self.request_interceptors.read().len()
    }

    // ── Sending ─────────────────────────────────────────────────────

    /// Send through the interceptor chains. Non-2xx responses are errors.
    pub async fn raw(&self, mut request: HttpRequest) -> Result<HttpResponse> {
        let interceptors: Vec<_> = self
            .request_interceptors
            .read()
            .iter()
            .map(|(_, i)| Arc::clone(i))
            .collect();
        for interceptor in interceptors {
            request = interceptor.intercept(request).await?;
        }

        match self.dispatch(request).await {
            Ok(response) => Ok(response),
            Err(error) => Err(self.handle_error(error).await),
        }
    }

    /// Send without running any interceptor.
    pub async fn raw_direct(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.dispatch(request).await
    }

    async fn handle_error(&self, mut error: AuthError) -> AuthError {
        let interceptors: Vec<_> = self
            .error_interceptors
            .read()
            .iter()
            .map(|(_, i)| Arc::clone(i))
            .collect();
        for interceptor in interceptors {
            error = interceptor.intercept(error).await;
        }
        error
    }

    async fn dispatch(&self, request: HttpRequest) -> Result<HttpResponse> {
        let outgoing = self.resolve(request)?;
        debug!(method = outgoing.method.as_str(), url = %outgoing.url, "sending request");
        self.transport.send(outgoing).await?.error_for_status()
    }

    /// Resolve url, base and headers into a transport request.
    pub fn resolve(&self, request: HttpRequest) -> Result<OutgoingRequest> {
        let path = request
            .url
            .ok_or_else(|| AuthError::Configuration("URL is required".to_string()))?;

        let base = match request.base_url.as_deref() {
            Some(base) if !base.is_empty() => Some(Url::parse(base)?),
            _ => self.base_url.clone(),
        };
        let mut url = match Url::parse(&path) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => match base {
                Some(base) => base.join(&path)?,
                None => {
                    return Err(AuthError::Configuration(format!(
                        "relative url {path} needs a base url"
                    )));
                }
            },
            Err(e) => return Err(e.into()),
        };
        if !request.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in &request.query {
                let _ = pairs.append_pair(k, v);
            }
        }

        let mut headers = request.headers;
        for (name, value) in self.headers.read().iter() {
            if !headers.keys().any(|k| k.eq_ignore_ascii_case(name)) {
                let _ = headers.insert(name.clone(), value.clone());
            }
        }

        Ok(OutgoingRequest {
            method: request.method.unwrap_or_default(),
            url,
            headers,
            body: request.body,
            with_credentials: request.with_credentials,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpMethod, ReqwestTransport};
    use async_trait::async_trait;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base: &str) -> HttpClient {
        HttpClient::new(Arc::new(ReqwestTransport::new()), Some(Url::parse(base).unwrap()))
    }

    struct Tag(&'static str);

    #[async_trait]
    impl RequestInterceptor for Tag {
        async fn intercept(&self, mut request: HttpRequest) -> Result<HttpRequest> {
            request.set_header("x-tag", self.0);
            Ok(request)
        }
    }

    struct Rewrite;

    #[async_trait]
    impl ResponseErrorInterceptor for Rewrite {
        async fn intercept(&self, _error: AuthError) -> AuthError {
            AuthError::ExpiredSession
        }
    }

    #[test]
    fn resolves_relative_against_base() {
        let c = client("http://app.test");
        let out = c.resolve(HttpRequest::new(HttpMethod::Get, "/api/user")).unwrap();
        assert_eq!(out.url.as_str(), "http://app.test/api/user");
    }

    #[test]
    fn empty_base_means_origin() {
        let c = client("http://app.test");
        let mut request = HttpRequest::new(HttpMethod::Post, "/_auth/reset");
        request.base_url = Some(String::new());
        assert_eq!(c.resolve(request).unwrap().url.as_str(), "http://app.test/_auth/reset");
    }

    #[test]
    fn missing_url_is_configuration_error() {
        let c = client("http://app.test");
        assert_matches::assert_matches!(c.resolve(HttpRequest::default()), Err(AuthError::Configuration(_)));
    }

    #[test]
    fn default_headers_do_not_override_request_headers() {
        let c = client("http://app.test");
        c.set_header("Authorization", "Bearer stale");
        c.set_header("Accept", "application/json");
        let mut request = HttpRequest::new(HttpMethod::Get, "/x");
        request.set_header("authorization", "Bearer fresh");
        let out = c.resolve(request).unwrap();
        assert_eq!(out.headers.get("authorization").map(String::as_str), Some("Bearer fresh"));
        assert_eq!(out.headers.get("Accept").map(String::as_str), Some("application/json"));
        assert!(!out.headers.contains_key("Authorization"));
    }

    #[tokio::test]
    async fn request_interceptor_runs_until_ejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .and(header("x-tag", "a"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let c = client(&server.uri());
        let id = c.add_request_interceptor(Arc::new(Tag("a")));
        let first = c.raw(HttpRequest::new(HttpMethod::Get, "/ping")).await.unwrap();
        assert_eq!(first.data, json!({"ok": true}));

        c.eject_request_interceptor(id);
        c.eject_request_interceptor(id);
        let second = c.raw(HttpRequest::new(HttpMethod::Get, "/ping")).await.unwrap();
        assert_eq!(second.status, 204);
        assert_eq!(c.request_interceptor_count(), 0);
    }

    #[tokio::test]
    async fn error_interceptor_replaces_error() {
        let server = MockServer::start().await;
        Mock::given(path("/secret"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let c = client(&server.uri());
        let err = c.raw(HttpRequest::new(HttpMethod::Get, "/secret")).await.unwrap_err();
        assert_eq!(err.status(), Some(401));

        let _ = c.add_error_interceptor(Arc::new(Rewrite));
        let err = c.raw(HttpRequest::new(HttpMethod::Get, "/secret")).await.unwrap_err();
        assert!(err.is_expired_session());
    }
}
