//! OpenID Connect on top of the OAuth 2.0 flows: id tokens, discovery and
//! RP-initiated logout.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use serde_json::Value;
use tracing::instrument;
use warden_settings::{Endpoints, SchemeKind, StrategyOptions};

use super::configuration_document::ConfigurationDocument;
use super::oauth2::OauthCore;
use super::{
    Checkable, IdTokenCapable, LoginRequest, RefreshCapable, ResetOptions, Scheme, SchemeCheck, TokenBearing,
    set_user,
};
use crate::context::AuthContext;
use crate::errors::Result;
use crate::http::{HttpRequest, HttpResponse};
use crate::refresh_controller::RefreshController;
use crate::token::{CredentialValue, IdToken, RefreshToken, Token};

/// OpenID Connect scheme.
pub struct OpenIdConnectScheme {
    core: OauthCore,
    configuration_document: ConfigurationDocument,
}

impl OpenIdConnectScheme {
    /// Build the scheme for `options`.
    pub fn new(ctx: Arc<AuthContext>, options: StrategyOptions) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let weak: Weak<dyn Scheme> = weak.clone();
            let configuration_document =
                ConfigurationDocument::new(&options.name, options.endpoints.configuration.clone());
            Self {
                core: OauthCore::new(ctx, options, weak, true),
                configuration_document,
            }
        })
    }

    /// Discovery document of the provider.
    pub fn configuration_document(&self) -> &ConfigurationDocument {
        &self.configuration_document
    }

    fn id_token_store(&self) -> &IdToken {
        match &self.core.id_token {
            Some(id_token) => id_token,
            None => unreachable!("openid connect core always carries an id token"),
        }
    }
}

impl Checkable for OpenIdConnectScheme {
    fn check(&self, check_status: bool) -> Result<SchemeCheck> {
        self.core.check(check_status)
    }
}

impl TokenBearing for OpenIdConnectScheme {
    fn token(&self) -> &Token {
        &self.core.token
    }

    fn refresh_token(&self) -> Option<&RefreshToken> {
        Some(&self.core.refresh_token)
    }
}

impl IdTokenCapable for OpenIdConnectScheme {
    fn id_token(&self) -> &IdToken {
        self.id_token_store()
    }
}

#[async_trait]
impl RefreshCapable for OpenIdConnectScheme {
    fn refresh_controller(&self) -> &RefreshController {
        &self.core.refresh_controller
    }

    #[instrument(skip_all, fields(strategy = %self.core.options.name))]
    async fn refresh_tokens(&self) -> Result<Option<HttpResponse>> {
        self.core.refresh_tokens(self).await
    }
}

#[async_trait]
impl Scheme for OpenIdConnectScheme {
    fn name(&self) -> &str {
        &self.core.options.name
    }

    fn kind(&self) -> SchemeKind {
        SchemeKind::OpenIdConnect
    }

    fn options(&self) -> &StrategyOptions {
        &self.core.options
    }

    fn endpoints(&self) -> Endpoints {
        self.core.endpoints.read().clone()
    }

    fn context(&self) -> &Arc<AuthContext> {
        &self.core.ctx
    }

    #[instrument(skip_all, fields(strategy = %self.core.options.name))]
    async fn mounted(&self) -> Result<()> {
        if let Err(e) = self.configuration_document.init(&self.core.ctx, &self.core.endpoints).await {
            self.core.ctx.call_on_error(&e, "configurationDocument.init");
        }
        self.core.mounted(self).await
    }

    #[instrument(skip_all, fields(strategy = %self.core.options.name))]
    async fn login(&self, login: LoginRequest) -> Result<Option<HttpResponse>> {
        let _ = self.core.login(login)?;
        Ok(None)
    }

    #[instrument(skip_all, fields(strategy = %self.core.options.name))]
    async fn logout(&self, _request: Option<HttpRequest>) -> Result<()> {
        let mut params = Vec::new();
        if let Some(CredentialValue::Value(id_token)) = self.id_token_store().get() {
            params.push(("id_token_hint".to_string(), id_token));
        }
        params.push(("post_logout_redirect_uri".to_string(), self.core.logout_redirect_uri()));
        self.core.replace_with_logout(params);
        self.reset(ResetOptions::default()).await
    }

    async fn fetch_user(&self, request: Option<HttpRequest>) -> Result<()> {
        if !self.check(false)?.valid {
            return Ok(());
        }
        if !self.core.options.fetch_remote {
            if let Some(claims) = self.id_token_store().user_info()? {
                set_user(self, Some(Value::Object(claims)));
                return Ok(());
            }
        }
        self.core.fetch_user(self, request).await
    }

    async fn reset(&self, options: ResetOptions) -> Result<()> {
        self.core.reset(self, options).await?;
        self.configuration_document.reset(&self.core.ctx);
        Ok(())
    }

    async fn set_user_token(&self, token: CredentialValue, refresh: Option<CredentialValue>) -> Result<()> {
        let _ = self.core.token.set(token, None)?;
        if let Some(refresh) = refresh {
            let _ = self.core.refresh_token.set(refresh)?;
        }
        self.fetch_user(None).await
    }

    fn as_token_bearing(&self) -> Option<&dyn TokenBearing> {
        Some(self)
    }

    fn as_refresh_capable(&self) -> Option<&dyn RefreshCapable> {
        Some(self)
    }

    fn as_id_token_capable(&self) -> Option<&dyn IdTokenCapable> {
        Some(self)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{TestEnv, jwt_with_exp};
    use crate::utils::parse_query;
    use serde_json::json;
    use std::time::Duration;
    use warden_core::Clock;
    use warden_settings::{AuthOptions, resolve_strategies};
    use warden_storage::BackendSet;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn auth_options() -> AuthOptions {
        AuthOptions {
            base_url: Some("https://app.test".to_string()),
            ..AuthOptions::default()
        }
    }

    fn scheme(env: &TestEnv, strategy: Value) -> Arc<OpenIdConnectScheme> {
        let mut options = env.ctx.options().clone();
        let _ = options.strategies.insert("oidc".into(), json!({"scheme": "openIDConnect"}));
        if let Some(fields) = options.strategies.get_mut("oidc").and_then(Value::as_object_mut) {
            if let Value::Object(extra) = strategy {
                fields.extend(extra);
            }
        }
        let resolved = resolve_strategies(&options).unwrap();
        OpenIdConnectScheme::new(Arc::clone(&env.ctx), resolved.get("oidc").cloned().unwrap())
    }

    async fn discovery_server() -> MockServer {
        let server = MockServer::start().await;
        let base = server.uri();
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issuer": base,
                "authorization_endpoint": format!("{base}/authorize"),
                "token_endpoint": format!("{base}/token"),
                "end_session_endpoint": format!("{base}/logout"),
                "jwks_uri": format!("{base}/jwks"),
                "response_types_supported": ["code"],
                "subject_types_supported": ["public"],
                "id_token_signing_alg_values_supported": ["RS256"]
            })))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn code_flow_uses_discovered_endpoints_and_id_token_claims() {
        let server = discovery_server().await;
        let now_secs = 1_700_000_000;
        let id_token = jwt_with_exp(now_secs + 600);
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "tok",
                "refresh_token": "ref",
                "id_token": id_token
            })))
            .expect(1)
            .mount(&server)
            .await;

        let env = TestEnv::new(auth_options());
        env.clock.set(now_secs * 1000);
        let oidc = scheme(
            &env,
            json!({
                "clientId": "app",
                "endpoints": {"configuration": format!("{}/.well-known/openid-configuration", server.uri())}
            }),
        );
        env.ctx
            .storage()
            .set_universal("oidc.state", Some(json!("s1")), BackendSet::ALL)
            .unwrap();
        env.ctx
            .storage()
            .set_universal("oidc.pkce_code_verifier", Some(json!("verifier")), BackendSet::ALL)
            .unwrap();
        env.router.visit("/login?code=abc&state=s1");

        oidc.mounted().await.unwrap();
        assert_eq!(oidc.endpoints().token.unwrap().url, format!("{}/token", server.uri()));
        assert_eq!(oidc.id_token().get(), Some(CredentialValue::Value(id_token.clone())));
        assert_eq!(env.ctx.user().unwrap()["sub"], "user-1");
        assert!(env.ctx.logged_in());

        env.clock.advance(Duration::from_secs(601));
        let check = oidc.check(true).unwrap();
        assert!(check.id_token_expired && !check.valid);
    }

    #[tokio::test]
    async fn logout_sends_id_token_hint() {
        let server = discovery_server().await;
        let env = TestEnv::new(auth_options());
        let oidc = scheme(
            &env,
            json!({"endpoints": {"configuration": format!("{}/.well-known/openid-configuration", server.uri())}}),
        );
        oidc.mounted().await.unwrap();
        let id_token = jwt_with_exp(env.clock.now_millis() / 1000 + 600);
        let _ = oidc.id_token().set(id_token.as_str().into()).unwrap();
        let _ = oidc.token().set("tok".into(), None).unwrap();

        oidc.logout(None).await.unwrap();
        let target = env.router.last_target().unwrap();
        assert!(target.starts_with(&format!("{}/logout?", server.uri())));
        let query = parse_query(target.split_once('?').map_or("", |(_, q)| q));
        assert_eq!(query["id_token_hint"], id_token);
        assert_eq!(query["post_logout_redirect_uri"], "https://app.test/");
        assert_eq!(oidc.id_token().get(), None);
        assert!(oidc.configuration_document().get(&env.ctx).is_none());
    }

    #[tokio::test]
    async fn unreachable_discovery_is_reported_not_fatal() {
        let env = TestEnv::new(auth_options());
        let errors = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);
        env.ctx.on_error(Arc::new(move |_: &crate::errors::AuthError, method: &str| sink.lock().push(method.to_string())));
        let oidc = scheme(&env, json!({"endpoints": {"configuration": false}}));

        oidc.mounted().await.unwrap();
        assert_eq!(errors.lock().as_slice(), ["configurationDocument.init".to_string()]);
    }
}
