//! Route guard run before every page navigation.

use tracing::debug;
use warden_settings::RedirectName;

use crate::auth::Auth;
use crate::router::{Route, RouteAuth};
use crate::utils::is_same_path;

/// Outcome of [`guard_route`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GuardDecision {
    /// Render the page.
    Proceed,
    /// The guard redirected to this page instead.
    Redirect(RedirectName),
}

/// Decide whether `to` may be rendered, redirecting when it may not.
///
/// Pages marked [`RouteAuth::Disabled`] are never guarded. Logged-in users are
/// sent home from guest pages and the login page; an expired session is
/// refreshed when possible and otherwise reset and sent to login. Anonymous
/// users are sent to login from every page except guest pages, the login page
/// and the OAuth callback.
pub async fn guard_route(auth: &Auth, to: &Route) -> GuardDecision {
    if to.meta.auth == Some(RouteAuth::Disabled) {
        return GuardDecision::Proceed;
    }
    let redirect = &auth.options().redirect;
    let guest = to.meta.auth == Some(RouteAuth::Guest);
    let inside = |page: Option<&String>| page.is_some_and(|page| is_same_path(&to.path, page));
    let on_login = inside(redirect.login.as_ref());

    if auth.logged_in() {
        if redirect.login.is_none() || on_login || guest {
            return send(auth, RedirectName::Home, to);
        }

        let check = match auth.check(true) {
            Ok(check) => check,
            Err(e) => {
                debug!(error = %e, "session check failed");
                return GuardDecision::Proceed;
            }
        };
        let ended = if check.refresh_token_expired {
            true
        } else if check.token_expired {
            !check.is_refreshable || auth.refresh_tokens().await.is_err()
        } else {
            false
        };
        if ended {
            debug!(page = %to.path, "session ended during navigation");
            if let Err(e) = auth.reset().await {
                debug!(error = %e, "reset failed");
            }
            return send(auth, RedirectName::Login, to);
        }
        GuardDecision::Proceed
    } else if guest || on_login || inside(redirect.callback.as_ref()) {
        GuardDecision::Proceed
    } else {
        send(auth, RedirectName::Login, to)
    }
}

fn send(auth: &Auth, name: RedirectName, from: &Route) -> GuardDecision {
    auth.redirect(name, Some(from), true);
    GuardDecision::Redirect(name)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthBuilder;
    use crate::router::{MemoryRouter, Navigation, Router};
    use crate::token::CredentialValue;
    use serde_json::{Value, json};
    use std::sync::Arc;
    use std::time::Duration;
    use warden_core::ManualClock;
    use warden_settings::AuthOptions;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Harness {
        auth: Arc<Auth>,
        router: Arc<MemoryRouter>,
        clock: Arc<ManualClock>,
    }

    async fn harness(base: &str, strategy: Value) -> Harness {
        let mut options = AuthOptions {
            base_url: Some(base.to_string()),
            ..AuthOptions::default()
        };
        options.redirect.callback = Some("/callback".to_string());
        let _ = options.strategies.insert("refresh".into(), strategy);
        let router = Arc::new(MemoryRouter::new("/"));
        router.define("/welcome", RouteAuth::Guest);
        router.define("/public", RouteAuth::Disabled);
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let auth = AuthBuilder::new(options)
            .router(router.clone())
            .clock(clock.clone())
            .build()
            .unwrap();
        auth.set_strategy("refresh").await.unwrap();
        Harness { auth, router, clock }
    }

    fn visit(router: &MemoryRouter, path: &str) -> Route {
        router.visit(path);
        router.current_route()
    }

    #[tokio::test]
    async fn anonymous_visitor_is_sent_to_login() {
        let h = harness("http://127.0.0.1:9", json!({"endpoints": {"user": false}})).await;

        let to = visit(&h.router, "/account");
        assert_eq!(guard_route(&h.auth, &to).await, GuardDecision::Redirect(RedirectName::Login));
        assert_eq!(h.router.navigations(), vec![Navigation::Push("/login".to_string())]);
    }

    #[tokio::test]
    async fn open_pages_do_not_redirect_anonymous_visitors() {
        let h = harness("http://127.0.0.1:9", json!({"endpoints": {"user": false}})).await;

        for page in ["/public", "/welcome", "/login", "/callback?code=x"] {
            let to = visit(&h.router, page);
            assert_eq!(guard_route(&h.auth, &to).await, GuardDecision::Proceed, "{page}");
        }
        assert!(h.router.navigations().is_empty());
    }

    #[tokio::test]
    async fn logged_in_user_leaves_guest_pages() {
        let h = harness("http://127.0.0.1:9", json!({"endpoints": {"user": false}})).await;
        h.auth.set_user_token("t1".into(), Some("r1".into())).await.unwrap();
        assert!(h.auth.logged_in());

        let to = visit(&h.router, "/welcome");
        assert_eq!(guard_route(&h.auth, &to).await, GuardDecision::Redirect(RedirectName::Home));
        assert_eq!(h.router.last_target().as_deref(), Some("/"));

        let to = visit(&h.router, "/account");
        assert_eq!(guard_route(&h.auth, &to).await, GuardDecision::Proceed);
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_before_rendering() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "t2", "refresh_token": "r2"})))
            .expect(1)
            .mount(&server)
            .await;
        let h = harness(
            &server.uri(),
            json!({"token": {"maxAge": 60}, "endpoints": {"user": false}}),
        )
        .await;
        h.auth.set_user_token("t1".into(), Some("r1".into())).await.unwrap();
        h.clock.advance(Duration::from_secs(120));

        let to = visit(&h.router, "/account");
        assert_eq!(guard_route(&h.auth, &to).await, GuardDecision::Proceed);
        let scheme = h.auth.strategy().unwrap();
        assert_eq!(
            scheme.as_token_bearing().unwrap().token().get(),
            Some(CredentialValue::Value("Bearer t2".to_string()))
        );
    }

    #[tokio::test]
    async fn expired_refresh_token_ends_session() {
        let h = harness(
            "http://127.0.0.1:9",
            json!({"token": {"maxAge": 60}, "refreshToken": {"maxAge": 120}, "endpoints": {"user": false}}),
        )
        .await;
        h.auth.set_user_token("t1".into(), Some("r1".into())).await.unwrap();
        h.clock.advance(Duration::from_secs(300));

        let to = visit(&h.router, "/account");
        assert_eq!(guard_route(&h.auth, &to).await, GuardDecision::Redirect(RedirectName::Login));
        assert!(!h.auth.logged_in());
        assert_eq!(h.router.last_target().as_deref(), Some("/login"));
    }
}
