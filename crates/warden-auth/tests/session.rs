//! End-to-end session flows through the public façade, against a mock
//! provider.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use jsonwebtoken::{EncodingKey, Header, encode};
use parking_lot::Mutex;
use serde_json::{Value, json};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use warden_auth::{
    Auth, AuthBuilder, AuthError, CredentialValue, GuardDecision, HttpRequest, LoginRequest, MemoryRouter, Router,
    guard_route,
};
use warden_core::{Clock, ManualClock};
use warden_settings::{AuthOptions, HttpMethod, RedirectName};
use warden_storage::{BackendKind, MemoryCookieJar, MemoryWebStorage, Platform};

const START_MILLIS: i64 = 1_700_000_000_000;

struct Session {
    auth: Arc<Auth>,
    router: Arc<MemoryRouter>,
    clock: Arc<ManualClock>,
    errors: Arc<Mutex<Vec<(String, bool)>>>,
}

fn session(base: &str, name: &str, strategy: Value) -> Session {
    let mut options = AuthOptions {
        base_url: Some(base.to_string()),
        ..AuthOptions::default()
    };
    let _ = options.strategies.insert(name.to_string(), strategy);
    let router = Arc::new(MemoryRouter::new("/"));
    let clock = Arc::new(ManualClock::new(START_MILLIS));
    let platform = Platform {
        cookies: Arc::new(MemoryCookieJar::new()),
        local: Some(Arc::new(MemoryWebStorage::new(BackendKind::Local))),
        session: Some(Arc::new(MemoryWebStorage::new(BackendKind::Session))),
    };
    let auth = AuthBuilder::new(options)
        .platform(platform)
        .router(router.clone())
        .clock(clock.clone())
        .build()
        .unwrap();

    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&errors);
    auth.on_error(Arc::new(move |e: &AuthError, method: &str| {
        sink.lock().push((method.to_string(), e.is_expired_session()));
    }));
    Session {
        auth,
        router,
        clock,
        errors,
    }
}

fn bearer(auth: &Auth) -> Option<CredentialValue> {
    auth.strategy().ok()?.as_token_bearing()?.token().get()
}

#[tokio::test]
async fn concurrent_requests_share_one_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"token": "t2", "refresh_token": "r2"}))
                .set_delay(Duration::from_millis(150)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/data"))
        .and(header("Authorization", "Bearer t2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(5)
        .mount(&server)
        .await;

    let s = session(
        &server.uri(),
        "refresh",
        json!({"token": {"maxAge": 60}, "endpoints": {"user": false}}),
    );
    s.auth.set_strategy("refresh").await.unwrap();
    s.auth.set_user_token("t1".into(), Some("r1".into())).await.unwrap();
    s.clock.advance(Duration::from_secs(120));

    let requests = (0..5).map(|_| s.auth.request(HttpRequest::new(HttpMethod::Get, "/api/data"), None));
    for response in join_all(requests).await {
        assert_eq!(response.unwrap().data["ok"], true);
    }
    assert_eq!(bearer(&s.auth), Some(CredentialValue::Value("Bearer t2".to_string())));
    assert!(s.errors.lock().is_empty());
}

#[tokio::test]
async fn jwt_expiry_overrides_configured_max_age() {
    let s = session(
        "http://127.0.0.1:9",
        "local",
        json!({"token": {"maxAge": 3600}, "endpoints": {"user": false}}),
    );
    s.auth.set_strategy("local").await.unwrap();
    let exp = s.clock.now_millis() / 1000 + 60;
    let jwt = encode(
        &Header::default(),
        &json!({"sub": "user-1", "exp": exp}),
        &EncodingKey::from_secret(b"integration"),
    )
    .unwrap();
    s.auth.set_user_token(jwt.as_str().into(), None).await.unwrap();
    assert!(s.auth.check(true).unwrap().valid);

    s.clock.advance(Duration::from_secs(120));
    let check = s.auth.check(true).unwrap();
    assert!(check.token_expired);
    assert!(!check.valid);
}

#[tokio::test]
async fn expired_refresh_token_ends_session_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "never"})))
        .expect(0)
        .mount(&server)
        .await;

    let s = session(
        &server.uri(),
        "refresh",
        json!({"token": {"maxAge": 60}, "refreshToken": {"maxAge": 120}, "endpoints": {"user": false}}),
    );
    s.auth.set_strategy("refresh").await.unwrap();
    s.auth.set_user_token("t1".into(), Some("r1".into())).await.unwrap();
    let mut changes = s.auth.storage().watch_state();
    s.clock.advance(Duration::from_secs(300));

    let err = s
        .auth
        .request(HttpRequest::new(HttpMethod::Get, "/api/data"), None)
        .await
        .unwrap_err();
    assert!(err.is_expired_session());
    assert!(!s.auth.logged_in());
    assert_eq!(bearer(&s.auth), None);
    assert_eq!(s.errors.lock().as_slice(), [("request".to_string(), true)]);

    let mut logged_out = 0;
    while let Ok(change) = changes.try_recv() {
        if change.key == "loggedIn" {
            assert_eq!(change.new, Some(json!(false)));
            logged_out += 1;
        }
    }
    assert_eq!(logged_out, 1);
}

#[tokio::test]
async fn guard_redirects_to_login_once_without_loop() {
    let s = session("http://127.0.0.1:9", "local", json!({"endpoints": {"user": false}}));
    s.auth.init().await.unwrap();

    s.router.visit("/account");
    let to = s.router.current_route();
    assert_eq!(guard_route(&s.auth, &to).await, GuardDecision::Redirect(RedirectName::Login));

    let to = s.router.current_route();
    assert_eq!(to.path, "/login");
    assert_eq!(guard_route(&s.auth, &to).await, GuardDecision::Proceed);
    assert_eq!(s.router.navigations().len(), 1);
    assert_eq!(s.auth.storage().get_universal("redirect"), Some(json!("/account")));
    s.auth.shutdown();
}

#[tokio::test]
async fn reset_is_idempotent() {
    let s = session("http://127.0.0.1:9", "local", json!({"endpoints": {"user": false}}));
    s.auth.set_strategy("local").await.unwrap();
    s.auth.set_user_token("t1".into(), None).await.unwrap();

    s.auth.reset().await.unwrap();
    let first = s.auth.storage().state_snapshot();
    s.auth.reset().await.unwrap();
    assert_eq!(s.auth.storage().state_snapshot(), first);
    assert!(!s.auth.logged_in());
    assert_eq!(s.auth.user(), None);
    assert!(s.errors.lock().is_empty());
}

#[tokio::test]
async fn oauth2_code_flow_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("code=c0de"))
        .and(body_string_contains("code_verifier="))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok",
            "refresh_token": "ref",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;

    let s = session(
        "https://app.test",
        "social",
        json!({
            "scheme": "oauth2",
            "clientId": "app",
            "endpoints": {
                "authorization": format!("{}/authorize", server.uri()),
                "token": format!("{}/token", server.uri()),
                "userInfo": false
            },
            "responseType": "code",
            "grantType": "authorization_code",
            "codeChallengeMethod": "S256"
        }),
    );

    let _ = s.auth.login_with("social", LoginRequest::default()).await.unwrap();
    let authorize = s.router.last_target().unwrap();
    assert!(authorize.starts_with(&format!("{}/authorize?", server.uri())));
    let query = url::Url::parse(&authorize).unwrap();
    let state = query
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .unwrap();
    assert!(query.query_pairs().any(|(k, v)| k == "code_challenge_method" && v == "S256"));

    s.router.visit(&format!("/login?code=c0de&state={state}"));
    s.auth.mounted().await.unwrap();

    assert!(s.auth.logged_in());
    assert_eq!(bearer(&s.auth), Some(CredentialValue::Value("Bearer tok".to_string())));
    assert_eq!(s.router.last_target().as_deref(), Some("/"));
}

#[tokio::test]
async fn openid_connect_discovers_endpoints() {
    let server = MockServer::start().await;
    let base = server.uri();
    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issuer": base,
            "authorization_endpoint": format!("{base}/authorize"),
            "token_endpoint": format!("{base}/token"),
            "jwks_uri": format!("{base}/jwks"),
            "response_types_supported": ["code"],
            "subject_types_supported": ["public"],
            "id_token_signing_alg_values_supported": ["RS256"]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let s = session(
        "https://app.test",
        "oidc",
        json!({
            "scheme": "openIDConnect",
            "clientId": "app",
            "endpoints": {"configuration": format!("{base}/.well-known/openid-configuration")}
        }),
    );
    s.auth.init().await.unwrap();
    assert!(s.errors.lock().is_empty());

    let _ = s.auth.login(LoginRequest::default()).await.unwrap();
    let authorize = s.router.last_target().unwrap();
    assert!(authorize.starts_with(&format!("{base}/authorize?")));
    assert!(authorize.contains("code_challenge="));
    s.auth.shutdown();
}
