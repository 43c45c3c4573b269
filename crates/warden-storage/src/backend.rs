//! The uniform backend capability and per-key inclusion sets.

use std::fmt;

use serde_json::Value;

use crate::errors::Result;

/// Identity of a storage surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// In-process reactive state.
    Memory,
    /// HTTP cookies.
    Cookie,
    /// `localStorage`.
    Local,
    /// `sessionStorage`.
    Session,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Memory => "memory",
            Self::Cookie => "cookie",
            Self::Local => "local",
            Self::Session => "session",
        })
    }
}

/// One durable storage surface.
pub trait StorageBackend: Send + Sync {
    /// Which surface this is.
    fn kind(&self) -> BackendKind;

    /// Whether reads and writes reach the surface. Configured-but-missing
    /// surfaces report `false` and warn once.
    fn is_enabled(&self) -> bool;

    /// Read a key.
    fn get(&self, key: &str) -> Option<Value>;

    /// Write a key.
    fn set(&self, key: &str, value: &Value) -> Result<()>;

    /// Remove a key. Removing a missing key is a no-op.
    fn remove(&self, key: &str) -> Result<()>;
}

/// Which durable backends a write fans out to. Memory state is always written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackendSet {
    /// Write cookies.
    pub cookie: bool,
    /// Write `localStorage`.
    pub local: bool,
    /// Write `sessionStorage`.
    pub session: bool,
}

impl BackendSet {
    /// Every backend.
    pub const ALL: Self = Self {
        cookie: true,
        local: true,
        session: true,
    };

    /// Memory state only.
    pub const MEMORY_ONLY: Self = Self {
        cookie: false,
        local: false,
        session: false,
    };

    /// Copy of `self` with `kind` switched off.
    #[must_use]
    pub fn without(mut self, kind: BackendKind) -> Self {
        match kind {
            BackendKind::Cookie => self.cookie = false,
            BackendKind::Local => self.local = false,
            BackendKind::Session => self.session = false,
            BackendKind::Memory => {}
        }
        self
    }

    /// Whether `kind` is included. Memory always is.
    pub fn contains(self, kind: BackendKind) -> bool {
        match kind {
            BackendKind::Memory => true,
            BackendKind::Cookie => self.cookie,
            BackendKind::Local => self.local,
            BackendKind::Session => self.session,
        }
    }
}

impl Default for BackendSet {
    fn default() -> Self {
        Self::ALL
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
