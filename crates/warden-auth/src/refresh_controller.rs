//! Single-flight token refresh.
//!
//! Concurrent refresh triggers share one in-flight operation. The slot is
//! cleared before any waiter observes the outcome, so the next expiry starts
//! a fresh refresh.

use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tracing::debug;

use crate::errors::{AuthError, Result};
use crate::schemes::Scheme;

type SharedRefresh = Shared<BoxFuture<'static, std::result::Result<(), Arc<AuthError>>>>;

/// Per-scheme refresh slot.
#[derive(Clone, Default)]
pub struct RefreshController {
    inflight: Arc<Mutex<Option<SharedRefresh>>>,
}

impl RefreshController {
    /// Empty controller.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a refresh is in flight.
    pub fn is_refreshing(&self) -> bool {
        self.inflight.lock().is_some()
    }

    /// Join the in-flight refresh, or start one with `start`.
    pub async fn handle_refresh<F>(&self, start: F) -> Result<()>
    where
        F: FnOnce() -> BoxFuture<'static, Result<()>>,
    {
        let shared = {
            let mut slot = self.inflight.lock();
            if let Some(existing) = slot.as_ref() {
                debug!("joining in-flight refresh");
                existing.clone()
            } else {
                let release = Arc::clone(&self.inflight);
                let operation = start();
                let shared = async move {
                    let outcome = operation.await.map_err(Arc::new);
                    *release.lock() = None;
                    outcome
                }
                .boxed()
                .shared();
                *slot = Some(shared.clone());
                shared
            }
        };
        shared.await.map_err(AuthError::Refresh)
    }
}

/// Refresh `scheme`'s tokens through its controller. Schemes that cannot
/// refresh succeed immediately.
pub async fn handle_refresh(scheme: Arc<dyn Scheme>) -> Result<()> {
    let Some(controller) = scheme.as_refresh_capable().map(|r| r.refresh_controller().clone()) else {
        return Ok(());
    };
    controller
        .handle_refresh(move || {
            async move {
                match scheme.as_refresh_capable() {
                    Some(capable) => capable.refresh_tokens().await.map(|_| ()),
                    None => Ok(()),
                }
            }
            .boxed()
        })
        .await
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
