//! Router capability: current route, in-app navigation, location replace.

use std::collections::{BTreeMap, HashMap};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::utils::{normalize_path, parse_query};

/// Per-page auth marker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteAuth {
    /// Explicitly protected.
    Required,
    /// Only for visitors who are not logged in.
    Guest,
    /// Never guarded.
    Disabled,
}

/// Route metadata.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RouteMeta {
    /// Auth marker, when the page declares one.
    pub auth: Option<RouteAuth>,
}

/// A resolved route.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Route {
    /// Path without query or hash.
    pub path: String,
    /// Path with query and hash.
    pub full_path: String,
    /// Decoded query.
    pub query: BTreeMap<String, String>,
    /// Fragment including the leading `#`, or empty.
    pub hash: String,
    /// Metadata.
    pub meta: RouteMeta,
}

impl Route {
    /// Split `full_path` into path, query and hash.
    pub fn parse(full_path: &str) -> Self {
        let (without_hash, hash) = match full_path.split_once('#') {
            Some((rest, hash)) => (rest, format!("#{hash}")),
            None => (full_path, String::new()),
        };
        let (path, query) = without_hash.split_once('?').unwrap_or((without_hash, ""));
        Self {
            path: path.to_string(),
            full_path: full_path.to_string(),
            query: parse_query(query),
            hash,
            meta: RouteMeta::default(),
        }
    }

    /// Builder-style auth marker.
    #[must_use]
    pub fn with_auth(mut self, auth: RouteAuth) -> Self {
        self.meta.auth = Some(auth);
        self
    }
}

/// Navigation capability supplied by the host application.
pub trait Router: Send + Sync {
    /// Route currently displayed.
    fn current_route(&self) -> Route;
    /// In-app navigation to a relative path.
    fn navigate(&self, to: &str);
    /// Replace the whole location (leaves the app for absolute urls).
    fn replace_location(&self, url: &str);
}

/// One recorded navigation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Navigation {
    /// In-app push.
    Push(String),
    /// Location replace.
    Replace(String),
}

/// Router that records navigations. Pages may be given auth markers up front.
#[derive(Default)]
pub struct MemoryRouter {
    current: RwLock<Route>,
    pages: RwLock<HashMap<String, RouteMeta>>,
    history: Mutex<Vec<Navigation>>,
}

impl MemoryRouter {
    /// Router sitting at `full_path`.
    pub fn new(full_path: &str) -> Self {
        let router = Self::default();
        router.visit(full_path);
        router
    }

    /// Declare the auth marker of a page.
    pub fn define(&self, path: &str, auth: RouteAuth) {
        let _ = self
            .pages
            .write()
            .insert(normalize_path(path), RouteMeta { auth: Some(auth) });
    }

    /// Move to `full_path` without recording a navigation.
    pub fn visit(&self, full_path: &str) {
        let mut route = Route::parse(full_path);
        if let Some(meta) = self.pages.read().get(&normalize_path(&route.path)) {
            route.meta = meta.clone();
        }
        *self.current.write() = route;
    }

    /// Navigations so far.
    pub fn navigations(&self) -> Vec<Navigation> {
        self.history.lock().clone()
    }

    /// Most recent navigation target.
    pub fn last_target(&self) -> Option<String> {
        self.history.lock().last().map(|n| match n {
            Navigation::Push(to) | Navigation::Replace(to) => to.clone(),
        })
    }
}

impl Router for MemoryRouter {
    fn current_route(&self) -> Route {
        self.current.read().clone()
    }

    fn navigate(&self, to: &str) {
        self.history.lock().push(Navigation::Push(to.to_string()));
        self.visit(to);
    }

    fn replace_location(&self, url: &str) {
        self.history.lock().push(Navigation::Replace(url.to_string()));
        if url.starts_with('/') {
            self.visit(url);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_route_parts() {
        let route = Route::parse("/login?to=%2Fprofile#access_token=x");
        assert_eq!(route.path, "/login");
        assert_eq!(route.query["to"], "/profile");
        assert_eq!(route.hash, "#access_token=x");
        assert_eq!(route.meta.auth, None);
    }

    #[test]
    fn memory_router_applies_page_meta() {
        let router = MemoryRouter::new("/");
        router.define("/login", RouteAuth::Guest);
        router.navigate("/login/");
        assert_eq!(router.current_route().meta.auth, Some(RouteAuth::Guest));
        assert_eq!(router.navigations(), vec![Navigation::Push("/login/".to_string())]);
    }

    #[test]
    fn external_replace_keeps_current_route() {
        let router = MemoryRouter::new("/login");
        router.replace_location("https://idp.test/authorize?x=1");
        assert_eq!(router.current_route().path, "/login");
        assert_eq!(router.last_target().as_deref(), Some("https://idp.test/authorize?x=1"));
    }
}
