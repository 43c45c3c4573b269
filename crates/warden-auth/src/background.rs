//! Long-running session tasks: the `loggedIn` redirect watcher and the
//! periodic token validator.
//!
//! Both hold a [`Weak`] handle to the façade and stop when it is dropped or
//! the cancellation token fires.

use std::sync::{Arc, Weak};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use warden_settings::RedirectName;

use crate::auth::Auth;
use crate::context::keys;
use crate::errors::AuthError;
use crate::refresh_controller::handle_refresh;
use crate::router::RouteAuth;
use crate::schemes::ResetOptions;

/// Redirect home on login and to the logout page on logout, for pages that
/// declare an auth marker.
pub(crate) fn spawn_logged_in_watcher(auth: &Arc<Auth>, cancel: CancellationToken) -> JoinHandle<()> {
    let mut changes = auth.storage().watch_state();
    let auth = Arc::downgrade(auth);
    tokio::spawn(async move {
        loop {
            let change = tokio::select! {
                () = cancel.cancelled() => return,
                change = changes.recv() => change,
            };
            let change = match change {
                Ok(change) => change,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "loggedIn watcher lagged");
                    continue;
                }
                Err(RecvError::Closed) => return,
            };
            if change.key != keys::LOGGED_IN {
                continue;
            }
            let Some(auth) = auth.upgrade() else { return };
            let logged_in = matches!(change.new, Some(Value::Bool(true)));
            let route = auth.context().router().current_route();
            match route.meta.auth {
                Some(RouteAuth::Disabled) | None => {}
                Some(_) => {
                    let target = if logged_in { RedirectName::Home } else { RedirectName::Logout };
                    debug!(logged_in, page = %route.path, "session flipped, redirecting");
                    auth.redirect(target, Some(&route), true);
                }
            }
        }
    })
}

/// Check the session every `period`; refresh an expired token when possible
/// and end the session otherwise.
pub(crate) fn spawn_token_validator(auth: &Arc<Auth>, period: Duration, cancel: CancellationToken) -> JoinHandle<()> {
    let auth = Arc::downgrade(auth);
    tokio::spawn(async move {
        let mut ticks = time::interval(period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first tick completes immediately
        let _ = ticks.tick().await;
        loop {
            tokio::select! {
                () = cancel.cancelled() => return,
                _ = ticks.tick() => {}
            }
            if validate_once(&auth).await.is_break() {
                info!("token validator stopped");
                return;
            }
        }
    })
}

async fn validate_once(auth: &Weak<Auth>) -> std::ops::ControlFlow<()> {
    use std::ops::ControlFlow::{Break, Continue};

    let Some(auth) = auth.upgrade() else {
        return Break(());
    };
    let Ok(scheme) = auth.strategy() else {
        return Continue(());
    };
    let check = match scheme.check(true) {
        Ok(check) => check,
        Err(e) => {
            warn!(error = %e, "token validation check failed");
            return Continue(());
        }
    };

    let renewed = if check.refresh_token_expired {
        false
    } else if check.token_expired && check.is_refreshable {
        match handle_refresh(Arc::clone(&scheme)).await {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "proactive refresh failed");
                false
            }
        }
    } else {
        !check.token_expired
    };
    if renewed {
        return Continue(());
    }

    if let Err(e) = scheme.reset(ResetOptions::default()).await {
        warn!(error = %e, "reset after expired session failed");
    }
    auth.context().call_on_error(&AuthError::ExpiredSession, "tokenValidation");
    Break(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
