//! Universal storage: one durable value per key across every surface.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tracing::warn;
use warden_core::RenderContext;
use warden_settings::StoreOptions;

use crate::backend::{BackendKind, BackendSet, StorageBackend};
use crate::cookies::{CookieBackend, CookieJar, MemoryCookieJar};
use crate::errors::{Result, StorageError};
use crate::memory::{MemoryState, StateChange};
use crate::web::{WebStorage, WebStorageBackend};

/// Platform-provided storage primitives.
#[derive(Clone)]
pub struct Platform {
    /// Cookie access.
    pub cookies: Arc<dyn CookieJar>,
    /// `localStorage`, when the platform has one.
    pub local: Option<Arc<dyn WebStorage>>,
    /// `sessionStorage`, when the platform has one.
    pub session: Option<Arc<dyn WebStorage>>,
}

impl Platform {
    /// Server platform: cookies from the request, no web storage.
    pub fn server(cookies: Arc<dyn CookieJar>) -> Self {
        Self {
            cookies,
            local: None,
            session: None,
        }
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::server(Arc::new(MemoryCookieJar::new()))
    }
}

fn is_unset(value: Option<&Value>) -> bool {
    value.is_none_or(Value::is_null)
}

/// Session state plus cookie, local and session storage behind one API.
///
/// Reads follow a fixed precedence (memory first on the server; cookie →
/// local → session → memory on the client). Writes fan out to every included
/// and enabled backend and always land in memory last, so memory holds the
/// most current value.
pub struct Storage {
    context: RenderContext,
    strict: bool,
    state: MemoryState,
    cookie: Arc<CookieBackend>,
    backends: Vec<Arc<dyn StorageBackend>>,
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let enabled: Vec<BackendKind> = self
            .backends
            .iter()
            .filter(|b| b.is_enabled())
            .map(|b| b.kind())
            .collect();
        f.debug_struct("Storage")
            .field("context", &self.context)
            .field("strict", &self.strict)
            .field("backends", &enabled)
            .finish_non_exhaustive()
    }
}

impl Storage {
    /// Build storage from config and platform primitives.
    ///
    /// In strict mode a configured backend the platform cannot provide is an
    /// error; otherwise it is disabled with a warning.
    pub fn new(options: &StoreOptions, context: RenderContext, platform: Platform) -> Result<Self> {
        let cookie = Arc::new(CookieBackend::new(platform.cookies, options.cookie.clone(), context));
        let local = Arc::new(WebStorageBackend::new(
            BackendKind::Local,
            platform.local,
            options.local.clone(),
            context,
        ));
        let session = Arc::new(WebStorageBackend::new(
            BackendKind::Session,
            platform.session,
            options.session.clone(),
            context,
        ));

        if options.strict_exceptions {
            if cookie.is_configured() && !cookie.is_available() {
                return Err(StorageError::Unavailable(BackendKind::Cookie));
            }
            for web in [&local, &session] {
                if web.is_configured() && context.is_client() && !web.is_available() {
                    return Err(StorageError::Unavailable(web.kind()));
                }
            }
        }

        let backends: Vec<Arc<dyn StorageBackend>> = vec![cookie.clone(), local, session];
        Ok(Self {
            context,
            strict: options.strict_exceptions,
            state: MemoryState::new(),
            cookie,
            backends,
        })
    }

    /// Render context this storage was built for.
    pub fn context(&self) -> RenderContext {
        self.context
    }

    fn absorb(&self, result: Result<()>, key: &str) -> Result<()> {
        match result {
            Err(e) if self.strict => Err(e),
            Err(e) => {
                warn!(key, error = %e, "storage write failed, continuing");
                Ok(())
            }
            Ok(()) => Ok(()),
        }
    }

    // ── Universal ───────────────────────────────────────────────────

    /// Write `value` to every included backend, then to memory. An unset
    /// value removes the key everywhere.
    pub fn set_universal(&self, key: &str, value: Option<Value>, include: BackendSet) -> Result<()> {
        let Some(value) = value.filter(|v| !v.is_null()) else {
            return self.remove_universal(key);
        };
        for backend in &self.backends {
            if include.contains(backend.kind()) && backend.is_enabled() {
                self.absorb(backend.set(key, &value), key)?;
            }
        }
        self.state.set(key, Some(value));
        Ok(())
    }

    /// First defined value in precedence order, with the backend it came from.
    pub fn get_universal_with_source(&self, key: &str) -> Option<(Value, BackendKind)> {
        if self.context.is_server() {
            if let Some(v) = self.state.get(key) {
                return Some((v, BackendKind::Memory));
            }
        }
        for backend in &self.backends {
            if !backend.is_enabled() {
                continue;
            }
            let value = backend.get(key);
            if !is_unset(value.as_ref()) {
                return value.map(|v| (v, backend.kind()));
            }
        }
        self.state.get(key).map(|v| (v, BackendKind::Memory))
    }

    /// First defined value in precedence order.
    pub fn get_universal(&self, key: &str) -> Option<Value> {
        self.get_universal_with_source(key).map(|(v, _)| v)
    }

    /// Resolve a key (falling back to `default`) and write it back to every
    /// included backend except the one it was read from.
    pub fn sync_universal(&self, key: &str, default: Option<Value>, include: BackendSet) -> Result<Option<Value>> {
        let (value, source) = match self.get_universal_with_source(key) {
            Some((v, source)) => (Some(v), Some(source)),
            None => (default.filter(|v| !v.is_null()), None),
        };
        let Some(value) = value else {
            return Ok(None);
        };
        for backend in &self.backends {
            if Some(backend.kind()) == source || !include.contains(backend.kind()) || !backend.is_enabled() {
                continue;
            }
            self.absorb(backend.set(key, &value), key)?;
        }
        if source != Some(BackendKind::Memory) {
            self.state.set(key, Some(value.clone()));
        }
        Ok(Some(value))
    }

    /// Remove a key from memory and every backend.
    ///
    /// Every backend is attempted even when one fails; in strict mode the
    /// first failure is returned afterwards.
    pub fn remove_universal(&self, key: &str) -> Result<()> {
        self.state.set(key, None);
        let mut first_error = None;
        for backend in &self.backends {
            if backend.is_enabled() {
                if let Err(e) = self.absorb(backend.remove(key), key) {
                    let _ = first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    // ── State ───────────────────────────────────────────────────────

    /// Write memory state only.
    pub fn set_state(&self, key: &str, value: Option<Value>) {
        self.state.set(key, value);
    }

    /// Read memory state only.
    pub fn get_state(&self, key: &str) -> Option<Value> {
        self.state.get(key)
    }

    /// Subscribe to public state changes.
    pub fn watch_state(&self) -> broadcast::Receiver<StateChange> {
        self.state.watch()
    }

    /// Public state for hydration. Never includes `_`-prefixed keys.
    pub fn state_snapshot(&self) -> Map<String, Value> {
        self.state.snapshot()
    }

    // ── Cookies by exact name ───────────────────────────────────────

    /// Read a cookie by exact name, bypassing the prefix.
    pub fn raw_cookie(&self, name: &str) -> Option<String> {
        if self.cookie.is_enabled() { self.cookie.raw(name) } else { None }
    }

    /// Every visible cookie by exact name.
    pub fn cookies(&self) -> BTreeMap<String, String> {
        if self.cookie.is_enabled() { self.cookie.all() } else { BTreeMap::new() }
    }

    /// Expire a cookie by exact name.
    pub fn remove_raw_cookie(&self, name: &str) -> Result<()> {
        if !self.cookie.is_enabled() {
            return Ok(());
        }
        self.absorb(self.cookie.remove_raw(name), name)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
