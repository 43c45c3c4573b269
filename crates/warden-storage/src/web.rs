//! `localStorage` / `sessionStorage` backends.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use serde_json::Value;
use tracing::warn;
use warden_core::RenderContext;
use warden_settings::WebStoreOptions;

use crate::backend::{BackendKind, StorageBackend};
use crate::codec::{decode_value, encode_value};
use crate::errors::{Result, StorageError};

/// Platform web storage area.
pub trait WebStorage: Send + Sync {
    /// Read an item.
    fn get_item(&self, key: &str) -> Option<String>;

    /// Write an item. Fails with [`StorageError::QuotaExceeded`] when full.
    fn set_item(&self, key: &str, value: &str) -> Result<()>;

    /// Remove an item.
    fn remove_item(&self, key: &str);

    /// Whether the area can be used (private browsing may block it).
    fn is_available(&self) -> bool {
        true
    }
}

/// In-process storage area with an optional byte quota.
pub struct MemoryWebStorage {
    kind: BackendKind,
    items: RwLock<HashMap<String, String>>,
    quota: Option<usize>,
}

impl MemoryWebStorage {
    /// Unbounded area.
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            items: RwLock::new(HashMap::new()),
            quota: None,
        }
    }

    /// Area that refuses writes once keys + values exceed `bytes`.
    pub fn with_quota(kind: BackendKind, bytes: usize) -> Self {
        Self {
            quota: Some(bytes),
            ..Self::new(kind)
        }
    }
}

impl WebStorage for MemoryWebStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items.read().get(key).cloned()
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let mut items = self.items.write();
        if let Some(quota) = self.quota {
            let used: usize = items
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            if used + key.len() + value.len() > quota {
                return Err(StorageError::QuotaExceeded {
                    backend: self.kind,
                    key: key.to_string(),
                });
            }
        }
        let _ = items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) {
        let _ = self.items.write().remove(key);
    }
}

/// [`StorageBackend`] over a [`WebStorage`] area. Never used while rendering
/// on the server.
pub struct WebStorageBackend {
    kind: BackendKind,
    area: Option<Arc<dyn WebStorage>>,
    options: WebStoreOptions,
    context: RenderContext,
    warned: AtomicBool,
}

impl WebStorageBackend {
    /// New backend. `area` is `None` when the platform has no such storage.
    pub fn new(
        kind: BackendKind,
        area: Option<Arc<dyn WebStorage>>,
        options: WebStoreOptions,
        context: RenderContext,
    ) -> Self {
        Self {
            kind,
            area,
            options,
            context,
            warned: AtomicBool::new(false),
        }
    }

    /// Whether config enables this area.
    pub fn is_configured(&self) -> bool {
        self.options.enabled
    }

    /// Whether the platform offers this area in the current render context.
    pub fn is_available(&self) -> bool {
        self.context.is_client() && self.area.as_ref().is_some_and(|a| a.is_available())
    }

    fn area(&self) -> Option<&Arc<dyn WebStorage>> {
        if self.is_enabled() { self.area.as_ref() } else { None }
    }

    fn prefixed(&self, key: &str) -> String {
        format!("{}{key}", self.options.prefix)
    }
}

impl StorageBackend for WebStorageBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn is_enabled(&self) -> bool {
        if !self.is_configured() || self.context.is_server() {
            return false;
        }
        if self.is_available() {
            return true;
        }
        if !self.warned.swap(true, Ordering::Relaxed) {
            warn!(backend = %self.kind, "storage is enabled in config but the platform does not support it");
        }
        false
    }

    fn get(&self, key: &str) -> Option<Value> {
        let raw = self.area()?.get_item(&self.prefixed(key))?;
        Some(decode_value(&raw))
    }

    fn set(&self, key: &str, value: &Value) -> Result<()> {
        match self.area() {
            Some(area) => area.set_item(&self.prefixed(key), &encode_value(value)),
            None => Ok(()),
        }
    }

    fn remove(&self, key: &str) -> Result<()> {
        if let Some(area) = self.area() {
            area.remove_item(&self.prefixed(key));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
