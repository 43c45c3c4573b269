//! Cookie backend.
//!
//! The platform supplies a [`CookieJar`]; the backend adds the configured
//! name prefix, serializes values, and applies [`CookieOptions`] on every
//! write. Removal is a write with `Max-Age=-1`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use cookie::time::{Duration, OffsetDateTime};
use cookie::{Cookie, SameSite as CookieSameSite};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::warn;
use warden_core::RenderContext;
use warden_settings::{CookieOptions, CookieStoreOptions, SameSite};

use crate::backend::{BackendKind, StorageBackend};
use crate::codec::{decode_value, encode_value};
use crate::errors::Result;

/// Platform cookie access: `document.cookie` in a browser, the request
/// `Cookie` header plus outgoing `Set-Cookie` headers on a server.
pub trait CookieJar: Send + Sync {
    /// Value of a cookie, already percent-decoded.
    fn get(&self, name: &str) -> Option<String>;

    /// Every cookie currently visible.
    fn all(&self) -> BTreeMap<String, String>;

    /// Apply a cookie write. A non-positive `Max-Age` deletes.
    fn set(&self, cookie: Cookie<'static>) -> Result<()>;

    /// Whether the platform allows cookies at all.
    fn is_available(&self) -> bool {
        true
    }
}

/// In-process cookie jar.
///
/// On the server it is seeded from the request `Cookie` header and collects
/// `Set-Cookie` headers for the response.
#[derive(Default)]
pub struct MemoryCookieJar {
    cookies: RwLock<BTreeMap<String, String>>,
    set_cookie_headers: Mutex<Vec<String>>,
}

impl MemoryCookieJar {
    /// Empty jar.
    pub fn new() -> Self {
        Self::default()
    }

    /// Jar seeded from a `Cookie` request header. Malformed pairs are skipped.
    pub fn from_header(header: &str) -> Self {
        let cookies = Cookie::split_parse_encoded(header)
            .filter_map(std::result::Result::ok)
            .map(|c| (c.name().to_string(), c.value().to_string()))
            .collect();
        Self {
            cookies: RwLock::new(cookies),
            set_cookie_headers: Mutex::new(Vec::new()),
        }
    }

    /// Drain `Set-Cookie` header values produced so far.
    pub fn take_set_cookie_headers(&self) -> Vec<String> {
        std::mem::take(&mut *self.set_cookie_headers.lock())
    }
}

impl CookieJar for MemoryCookieJar {
    fn get(&self, name: &str) -> Option<String> {
        self.cookies.read().get(name).cloned()
    }

    fn all(&self) -> BTreeMap<String, String> {
        self.cookies.read().clone()
    }

    fn set(&self, cookie: Cookie<'static>) -> Result<()> {
        self.set_cookie_headers.lock().push(cookie.encoded().to_string());
        let expired = cookie.max_age().is_some_and(|age| age <= Duration::ZERO);
        let mut cookies = self.cookies.write();
        if expired {
            let _ = cookies.remove(cookie.name());
        } else {
            let _ = cookies.insert(cookie.name().to_string(), cookie.value().to_string());
        }
        Ok(())
    }
}

/// Build a cookie with the configured attributes.
pub fn build_cookie(name: String, value: String, options: &CookieOptions) -> Cookie<'static> {
    let mut builder = Cookie::build((name, value))
        .secure(options.secure)
        .http_only(options.http_only);
    if let Some(path) = &options.path {
        builder = builder.path(path.clone());
    }
    if let Some(domain) = &options.domain {
        builder = builder.domain(domain.clone());
    }
    if let Some(max_age) = options.max_age {
        builder = builder.max_age(Duration::seconds(max_age));
    }
    if let Some(days) = options.expires {
        builder = builder.expires(OffsetDateTime::now_utc() + Duration::days(days));
    }
    if let Some(same_site) = options.same_site {
        builder = builder.same_site(match same_site {
            SameSite::Lax => CookieSameSite::Lax,
            SameSite::Strict => CookieSameSite::Strict,
            SameSite::None => CookieSameSite::None,
        });
    }
    builder.build()
}

/// [`StorageBackend`] over a [`CookieJar`].
pub struct CookieBackend {
    jar: Arc<dyn CookieJar>,
    options: CookieStoreOptions,
    context: RenderContext,
    warned: AtomicBool,
}

impl CookieBackend {
    /// New backend.
    pub fn new(jar: Arc<dyn CookieJar>, options: CookieStoreOptions, context: RenderContext) -> Self {
        Self {
            jar,
            options,
            context,
            warned: AtomicBool::new(false),
        }
    }

    /// Whether config enables cookies.
    pub fn is_configured(&self) -> bool {
        self.options.enabled
    }

    /// Whether the platform offers cookies in this render context.
    pub fn is_available(&self) -> bool {
        self.context.is_server() || self.jar.is_available()
    }

    fn prefixed(&self, key: &str) -> String {
        format!("{}{key}", self.options.prefix)
    }

    /// Read a cookie by its exact name (no prefix, no decoding).
    pub fn raw(&self, name: &str) -> Option<String> {
        self.jar.get(name)
    }

    /// Every visible cookie by exact name.
    pub fn all(&self) -> BTreeMap<String, String> {
        self.jar.all()
    }

    /// Expire a cookie by its exact name.
    pub fn remove_raw(&self, name: &str) -> Result<()> {
        let mut options = self.options.options.clone();
        options.max_age = Some(-1);
        options.expires = None;
        self.jar.set(build_cookie(name.to_string(), String::new(), &options))
    }
}

impl StorageBackend for CookieBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Cookie
    }

    fn is_enabled(&self) -> bool {
        if !self.is_configured() {
            return false;
        }
        if self.is_available() {
            return true;
        }
        if !self.warned.swap(true, Ordering::Relaxed) {
            warn!("cookies are enabled in config but the platform does not support them");
        }
        false
    }

    fn get(&self, key: &str) -> Option<Value> {
        self.jar.get(&self.prefixed(key)).map(|raw| decode_value(&raw))
    }

    fn set(&self, key: &str, value: &Value) -> Result<()> {
        let cookie = build_cookie(self.prefixed(key), encode_value(value), &self.options.options);
        self.jar.set(cookie)
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.remove_raw(&self.prefixed(key))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn backend(jar: Arc<MemoryCookieJar>) -> CookieBackend {
        CookieBackend::new(jar, CookieStoreOptions::default(), RenderContext::Client)
    }

    #[test]
    fn writes_are_prefixed_and_encoded() {
        let jar = Arc::new(MemoryCookieJar::new());
        let b = backend(jar.clone());
        b.set("strategy", &json!("local")).unwrap();
        assert_eq!(jar.get("auth.strategy").as_deref(), Some("local"));
        assert_eq!(b.get("strategy"), Some(json!("local")));
    }

    #[test]
    fn remove_sends_negative_max_age() {
        let jar = Arc::new(MemoryCookieJar::new());
        let b = backend(jar.clone());
        b.set("strategy", &json!("local")).unwrap();
        b.remove("strategy").unwrap();
        assert_eq!(b.get("strategy"), None);
        let headers = jar.take_set_cookie_headers();
        assert_eq!(headers.len(), 2);
        assert!(headers[1].contains("Max-Age=-1"), "{}", headers[1]);
        assert!(headers[1].contains("Path=/"));
    }

    #[test]
    fn cookie_attributes_applied() {
        let options = CookieOptions {
            domain: Some("example.com".into()),
            same_site: Some(SameSite::Lax),
            secure: true,
            http_only: true,
            max_age: Some(60),
            ..CookieOptions::default()
        };
        let header = build_cookie("auth.x".into(), "1".into(), &options).to_string();
        assert!(header.contains("Domain=example.com"));
        assert!(header.contains("SameSite=Lax"));
        assert!(header.contains("Secure"));
        assert!(header.contains("HttpOnly"));
        assert!(header.contains("Max-Age=60"));
    }

    #[test]
    fn json_values_survive_percent_encoding() {
        let jar = Arc::new(MemoryCookieJar::new());
        let b = backend(jar.clone());
        b.set("user", &json!({"name": "Ada Lovelace"})).unwrap();
        let header = jar.take_set_cookie_headers().remove(0);
        let value = header.split(';').next().unwrap();
        let server_jar = MemoryCookieJar::from_header(value);
        assert_eq!(
            decode_value(&server_jar.get("auth.user").unwrap()),
            json!({"name": "Ada Lovelace"})
        );
    }

    #[test]
    fn from_header_parses_pairs() {
        let jar = MemoryCookieJar::from_header("auth.strategy=local; XSRF-TOKEN=abc");
        assert_eq!(jar.get("auth.strategy").as_deref(), Some("local"));
        assert_eq!(jar.get("XSRF-TOKEN").as_deref(), Some("abc"));
        assert_eq!(jar.all().len(), 2);
    }

    struct BlockedJar;

    impl CookieJar for BlockedJar {
        fn get(&self, _name: &str) -> Option<String> {
            None
        }
        fn all(&self) -> BTreeMap<String, String> {
            BTreeMap::new()
        }
        fn set(&self, _cookie: Cookie<'static>) -> Result<()> {
            Ok(())
        }
        fn is_available(&self) -> bool {
            false
        }
    }

    #[test]
    fn unavailable_on_client_disables() {
        let b = CookieBackend::new(Arc::new(BlockedJar), CookieStoreOptions::default(), RenderContext::Client);
        assert!(!b.is_enabled());
        assert!(!b.is_enabled());
    }

    #[test]
    fn server_ignores_client_availability() {
        let b = CookieBackend::new(Arc::new(BlockedJar), CookieStoreOptions::default(), RenderContext::Server);
        assert!(b.is_enabled());
    }
}
