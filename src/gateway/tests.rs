use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::extract::FromRef;
use axum::http::{Method, Request, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum_extra::extract::PrivateCookieJar;
use axum_extra::extract::cookie::{Cookie, Key};
use mockito::Matcher;
use serde_json::Value;
use time::OffsetDateTime;
use tower::ServiceExt;
use url::Url;

use super::{AuthenticatedPrincipal, GatewayConfig, gateway_routes};
use crate::error::BoxError;
use crate::oauth::{AuthConfig, ProviderEndpoints};
use crate::session::{MemorySessionStore, SessionManager, SessionStore};
use crate::types::{Principal, ProviderProfile, SessionId};
use crate::verify::{ProfilePassthrough, VerificationCallback, VerifiedEvent};

const TOKEN_BODY: &str =
    r#"{"access_token":"at","token_type":"Bearer","refresh_token":"rt","expires_in":3600}"#;

fn config(server: &mockito::Server, base_path: &str) -> GatewayConfig {
    let base = server.url();
    let provider = ProviderEndpoints::new(
        "spotify",
        format!("{base}/authorize").parse().unwrap(),
        format!("{base}/api/token").parse().unwrap(),
        format!("{base}/v1/me").parse().unwrap(),
    );
    let auth = AuthConfig::new(
        provider,
        "test-client",
        "test-secret",
        "http://gw.test".parse().unwrap(),
        base_path,
    )
    .unwrap()
    .with_scopes(["user-read-email"]);

    GatewayConfig::new(auth, Key::generate()).with_secure_cookies(false)
}

fn gateway(config: GatewayConfig) -> Router {
    let sessions = config.session_manager(MemorySessionStore::new());
    let verification = VerificationCallback::new("spotify", ProfilePassthrough);
    gateway_routes(config, verification, sessions).unwrap()
}

async fn mock_token(server: &mut mockito::Server, code: &str) -> mockito::Mock {
    server
        .mock("POST", "/api/token")
        .match_body(Matcher::UrlEncoded("code".into(), code.into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(TOKEN_BODY)
        .create_async()
        .await
}

async fn mock_profile(server: &mut mockito::Server, body: &str) -> mockito::Mock {
    server
        .mock("GET", "/v1/me")
        .match_header("authorization", "Bearer at")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body)
        .create_async()
        .await
}

/// Minimal cookie-keeping client driving the router with `oneshot`.
struct Browser {
    app: Router,
    cookies: HashMap<String, String>,
}

impl Browser {
    fn new(app: Router) -> Self {
        Self {
            app,
            cookies: HashMap::new(),
        }
    }

    fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("; ")
    }

    async fn request(&mut self, method: Method, uri: &str) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if !self.cookies.is_empty() {
            builder = builder.header(header::COOKIE, self.cookie_header());
        }
        let response = self
            .app
            .clone()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();

        for value in response.headers().get_all(header::SET_COOKIE) {
            let cookie = Cookie::parse(value.to_str().unwrap().to_string()).unwrap();
            let removed = cookie.value().is_empty()
                || cookie.max_age().is_some_and(|age| age.is_zero());
            if removed {
                self.cookies.remove(cookie.name());
            } else {
                self.cookies
                    .insert(cookie.name().to_string(), cookie.value().to_string());
            }
        }
        response
    }

    async fn get(&mut self, uri: &str) -> Response {
        self.request(Method::GET, uri).await
    }

    /// Hit the initiate route and return the `state` the provider would echo.
    async fn initiate(&mut self, path: &str) -> String {
        let response = self.get(path).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        let url: Url = location(&response).parse().unwrap();
        url.query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap()
    }
}

fn location(response: &Response) -> &str {
    response.headers()[header::LOCATION].to_str().unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn initiate_redirects_to_provider() {
    let server = mockito::Server::new_async().await;
    let mut browser = Browser::new(gateway(config(&server, "")));

    let response = browser.get("/auth/spotify").await;

    assert_eq!(response.status(), StatusCode::FOUND);
    let url: Url = location(&response).parse().unwrap();
    assert_eq!(url.path(), "/authorize");
    let query: HashMap<String, String> = url.query_pairs().into_owned().collect();
    assert_eq!(query["response_type"], "code");
    assert_eq!(query["client_id"], "test-client");
    assert_eq!(query["redirect_uri"], "http://gw.test/auth/spotify/callback");
    assert_eq!(query["scope"], "user-read-email");
    assert_eq!(query["state"].len(), 22);
    assert_eq!(browser.cookies.len(), 1, "state cookie set");
}

#[tokio::test]
async fn approve_flow_authenticates_then_logout_clears() {
    let mut server = mockito::Server::new_async().await;
    let token = mock_token(&mut server, "XYZ").await;
    let profile = mock_profile(&mut server, r#"{"id":"p1","name":"Ana"}"#).await;
    let mut browser = Browser::new(gateway(config(&server, "")));

    assert_eq!(browser.get("/api/me").await.status(), StatusCode::UNAUTHORIZED);

    let state = browser.initiate("/auth/spotify").await;
    let response = browser
        .get(&format!("/auth/spotify/callback?code=XYZ&state={state}"))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["user"]["id"], "p1");
    assert_eq!(body["user"]["display_name"], "Ana");
    assert_eq!(body["user"]["profile"]["name"], "Ana");
    token.assert_async().await;
    profile.assert_async().await;

    let response = browser.get("/api/me").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["user"]["id"], "p1");

    let stale_cookie = browser.cookie_header();
    let response = browser.get("/logout").await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/api");

    assert_eq!(browser.get("/api/me").await.status(), StatusCode::UNAUTHORIZED);

    // The record itself is gone, not just the browser's cookie.
    browser.cookies.clear();
    let response = browser
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/me")
                .header(header::COOKIE, stale_cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn provider_denial_redirects_to_failure_page() {
    let mut server = mockito::Server::new_async().await;
    let token = server
        .mock("POST", "/api/token")
        .expect(0)
        .create_async()
        .await;
    let mut browser = Browser::new(gateway(config(&server, "")));

    let state = browser.initiate("/auth/spotify").await;
    let response = browser
        .get(&format!(
            "/auth/spotify/callback?error=access_denied&error_description=nope&state={state}"
        ))
        .await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/login");
    assert!(browser.cookies.is_empty(), "state cleared, no session");
    assert_eq!(browser.get("/api/me").await.status(), StatusCode::UNAUTHORIZED);
    token.assert_async().await;
}

#[tokio::test]
async fn state_mismatch_never_reaches_provider() {
    let mut server = mockito::Server::new_async().await;
    let token = server
        .mock("POST", "/api/token")
        .expect(0)
        .create_async()
        .await;
    let app = gateway(config(&server, ""));

    let mut browser = Browser::new(app.clone());
    browser.initiate("/auth/spotify").await;
    let response = browser
        .get("/auth/spotify/callback?code=XYZ&state=forged")
        .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/login");

    // No state cookie at all.
    let mut fresh = Browser::new(app);
    let response = fresh
        .get("/auth/spotify/callback?code=XYZ&state=anything")
        .await;
    assert_eq!(location(&response), "/login");

    token.assert_async().await;
}

#[tokio::test]
async fn disabled_state_verification_skips_the_check() {
    let mut server = mockito::Server::new_async().await;
    let _token = mock_token(&mut server, "XYZ").await;
    let _profile = mock_profile(&mut server, r#"{"id":"p1"}"#).await;
    let mut browser = Browser::new(gateway(
        config(&server, "").with_state_verification(false),
    ));

    let response = browser.get("/auth/spotify").await;
    let url: Url = location(&response).parse().unwrap();
    assert!(url.query_pairs().all(|(k, _)| k != "state"));
    assert!(browser.cookies.is_empty());

    let response = browser.get("/auth/spotify/callback?code=XYZ").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn missing_code_redirects_to_failure_page() {
    let server = mockito::Server::new_async().await;
    let mut browser = Browser::new(gateway(config(&server, "")));

    let state = browser.initiate("/auth/spotify").await;
    let response = browser
        .get(&format!("/auth/spotify/callback?state={state}"))
        .await;
    assert_eq!(location(&response), "/login");
}

#[tokio::test]
async fn rejected_exchange_redirects_to_failure_page() {
    let mut server = mockito::Server::new_async().await;
    let _token = server
        .mock("POST", "/api/token")
        .with_status(400)
        .with_body(r#"{"error":"invalid_grant"}"#)
        .create_async()
        .await;
    let mut browser = Browser::new(gateway(
        config(&server, "").with_failure_redirect("/oops"),
    ));

    let state = browser.initiate("/auth/spotify").await;
    let response = browser
        .get(&format!("/auth/spotify/callback?code=bad&state={state}"))
        .await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/oops");
    assert!(browser.cookies.is_empty());
}

#[tokio::test]
async fn incomplete_credentials_never_produce_a_session() {
    let mut server = mockito::Server::new_async().await;
    let _token = server
        .mock("POST", "/api/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"at","expires_in":3600}"#)
        .create_async()
        .await;
    let mut browser = Browser::new(gateway(config(&server, "")));

    let state = browser.initiate("/auth/spotify").await;
    let response = browser
        .get(&format!("/auth/spotify/callback?code=XYZ&state={state}"))
        .await;

    assert_eq!(location(&response), "/login");
    assert_eq!(browser.get("/api/me").await.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn rejected_verification_redirects_to_failure_page() {
    let mut server = mockito::Server::new_async().await;
    let _token = mock_token(&mut server, "XYZ").await;
    let _profile = mock_profile(&mut server, r#"{"name":"No Id"}"#).await;
    let mut browser = Browser::new(gateway(config(&server, "")));

    let state = browser.initiate("/auth/spotify").await;
    let response = browser
        .get(&format!("/auth/spotify/callback?code=XYZ&state={state}"))
        .await;

    assert_eq!(location(&response), "/login");
    assert!(browser.cookies.is_empty());
}

#[tokio::test]
async fn login_redirect_sends_browser_onward() {
    let mut server = mockito::Server::new_async().await;
    let _token = mock_token(&mut server, "XYZ").await;
    let _profile = mock_profile(&mut server, r#"{"id":"p1"}"#).await;
    let mut browser = Browser::new(gateway(
        config(&server, "").with_login_redirect("/home"),
    ));

    let state = browser.initiate("/auth/spotify").await;
    let response = browser
        .get(&format!("/auth/spotify/callback?code=XYZ&state={state}"))
        .await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/home");
    assert_eq!(browser.get("/api/me").await.status(), StatusCode::OK);
}

#[tokio::test]
async fn base_path_prefixes_every_route() {
    let mut server = mockito::Server::new_async().await;
    let _token = mock_token(&mut server, "XYZ").await;
    let _profile = mock_profile(&mut server, r#"{"id":"p1"}"#).await;
    let mut browser = Browser::new(gateway(config(&server, "/gw/")));

    let response = browser.get("/gw/auth/spotify").await;
    let url: Url = location(&response).parse().unwrap();
    let redirect_uri = url
        .query_pairs()
        .find(|(k, _)| k == "redirect_uri")
        .map(|(_, v)| v.into_owned());
    assert_eq!(
        redirect_uri.as_deref(),
        Some("http://gw.test/gw/auth/spotify/callback")
    );

    let state = browser.initiate("/gw/auth/spotify").await;
    let response = browser
        .get(&format!("/gw/auth/spotify/callback?code=XYZ&state={state}"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(browser.get("/gw/api/me").await.status(), StatusCode::OK);

    let response = browser.request(Method::POST, "/gw/logout").await;
    assert_eq!(location(&response), "/gw/api");

    assert_eq!(browser.get("/auth/spotify").await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_callback_query_redirects_to_failure_page() {
    let mut server = mockito::Server::new_async().await;
    let token = server
        .mock("POST", "/api/token")
        .expect(0)
        .create_async()
        .await;
    let mut browser = Browser::new(gateway(config(&server, "")));

    for query in [
        "error=access_denied&error=x",
        "code=a&code=b",
        "state=s1&state=s2&code=a",
    ] {
        let state = browser.initiate("/auth/spotify").await;
        let response = browser
            .get(&format!("/auth/spotify/callback?{query}&extra={state}"))
            .await;
        assert_eq!(response.status(), StatusCode::FOUND, "{query}");
        assert_eq!(location(&response), "/login", "{query}");
        assert!(browser.cookies.is_empty(), "{query}: state cleared, no session");
    }

    token.assert_async().await;
}

#[tokio::test]
async fn login_rotates_session_id() {
    let mut server = mockito::Server::new_async().await;
    let _token = server
        .mock("POST", "/api/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(TOKEN_BODY)
        .expect(2)
        .create_async()
        .await;
    let _profile = server
        .mock("GET", "/v1/me")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id":"p1"}"#)
        .expect(2)
        .create_async()
        .await;
    let mut browser = Browser::new(gateway(config(&server, "")));

    let state = browser.initiate("/auth/spotify").await;
    browser
        .get(&format!("/auth/spotify/callback?code=XYZ&state={state}"))
        .await;
    let first_cookie = browser.cookie_header();

    let state = browser.initiate("/auth/spotify").await;
    let response = browser
        .get(&format!("/auth/spotify/callback?code=XYZ&state={state}"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(browser.get("/api/me").await.status(), StatusCode::OK);

    // The cookie carried into the second login no longer names a session.
    let response = browser
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/me")
                .header(header::COOKIE, first_cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

/// Accepts connections and never answers.
async fn stalling_provider() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn provider_timeout_redirects_to_failure_page() {
    let base = stalling_provider().await;
    let provider = ProviderEndpoints::new(
        "spotify",
        format!("{base}/authorize").parse().unwrap(),
        format!("{base}/api/token").parse().unwrap(),
        format!("{base}/v1/me").parse().unwrap(),
    );
    let auth = AuthConfig::new(
        provider,
        "test-client",
        "test-secret",
        "http://gw.test".parse().unwrap(),
        "",
    )
    .unwrap();
    let config = GatewayConfig::new(auth, Key::generate())
        .with_secure_cookies(false)
        .with_provider_timeout(Duration::from_millis(200));
    let mut browser = Browser::new(gateway(config));

    let state = browser.initiate("/auth/spotify").await;
    let response = browser
        .get(&format!("/auth/spotify/callback?code=XYZ&state={state}"))
        .await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/login");
    assert!(browser.cookies.is_empty());
}

/// Memory store whose deletes always fail.
struct UndeletableStore(MemorySessionStore);

impl SessionStore for UndeletableStore {
    async fn load(&self, id: &SessionId) -> Result<Option<String>, BoxError> {
        self.0.load(id).await
    }

    async fn save(
        &self,
        id: &SessionId,
        data: String,
        expires_at: OffsetDateTime,
    ) -> Result<(), BoxError> {
        self.0.save(id, data, expires_at).await
    }

    async fn delete(&self, _id: &SessionId) -> Result<(), BoxError> {
        Err("store unavailable".into())
    }

    async fn delete_expired(&self, now: OffsetDateTime) -> Result<usize, BoxError> {
        self.0.delete_expired(now).await
    }
}

#[tokio::test]
async fn failed_logout_is_reported_not_redirected() {
    let mut server = mockito::Server::new_async().await;
    let _token = mock_token(&mut server, "XYZ").await;
    let _profile = mock_profile(&mut server, r#"{"id":"p1"}"#).await;
    let config = config(&server, "");
    let sessions = config.session_manager(UndeletableStore(MemorySessionStore::new()));
    let verification = VerificationCallback::new("spotify", ProfilePassthrough);
    let mut browser = Browser::new(gateway_routes(config, verification, sessions).unwrap());

    let state = browser.initiate("/auth/spotify").await;
    browser
        .get(&format!("/auth/spotify/callback?code=XYZ&state={state}"))
        .await;
    assert_eq!(browser.get("/api/me").await.status(), StatusCode::OK);

    let response = browser.get("/logout").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.headers().get(header::LOCATION).is_none());
    assert!(browser.cookies.is_empty(), "browser cookie is dropped anyway");
}

#[tokio::test]
async fn observers_are_notified_on_login() {
    let mut server = mockito::Server::new_async().await;
    let _token = mock_token(&mut server, "XYZ").await;
    let _profile = mock_profile(&mut server, r#"{"id":"p1"}"#).await;

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let config = config(&server, "");
    let sessions = config.session_manager(MemorySessionStore::new());
    let verification = VerificationCallback::new("spotify", ProfilePassthrough).with_observer(
        move |event: &VerifiedEvent<'_>| -> Result<(), BoxError> {
            assert_eq!(event.principal.id, "p1");
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        },
    );
    let mut browser = Browser::new(gateway_routes(config, verification, sessions).unwrap());

    let state = browser.initiate("/auth/spotify").await;
    browser
        .get(&format!("/auth/spotify/callback?code=XYZ&state={state}"))
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn api_index_answers_static_message() {
    let server = mockito::Server::new_async().await;
    let mut browser = Browser::new(gateway(config(&server, "")));

    let response = browser.get("/api").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await["message"],
        "Welcome to identity-gateway!"
    );
}

#[test]
fn invalid_config_is_rejected_at_build_time() {
    let auth = AuthConfig::new(
        ProviderEndpoints::spotify(),
        "client",
        "secret",
        "https://gw.example.com".parse().unwrap(),
        "",
    )
    .unwrap();
    let config = GatewayConfig::new(auth, Key::generate()).with_failure_redirect("//evil.test");
    let sessions = SessionManager::new(MemorySessionStore::new());

    let result = gateway_routes(
        config,
        VerificationCallback::new("spotify", ProfilePassthrough),
        sessions,
    );
    assert!(result.is_err());
}

// ── Extractor on application state ────────────────────────────────

#[derive(Clone)]
struct AppState {
    sessions: SessionManager,
    key: Key,
}

impl FromRef<AppState> for SessionManager {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.clone()
    }
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.key.clone()
    }
}

async fn greet(user: Option<AuthenticatedPrincipal>) -> String {
    match user {
        Some(u) => format!("Hello, {}", u.principal.id),
        None => "Hello, guest".to_string(),
    }
}

async fn protected(user: AuthenticatedPrincipal) -> String {
    user.principal.id
}

fn app(state: AppState) -> Router {
    Router::new()
        .route("/greet", get(greet))
        .route("/protected", get(protected))
        .with_state(state)
}

/// Encrypt a session cookie the way the gateway would.
fn encrypted_cookie(state: &AppState, value: &str) -> String {
    let jar = PrivateCookieJar::new(state.key.clone())
        .add(Cookie::new(state.sessions.cookie_name().to_string(), value.to_string()));
    let response = jar.into_response();
    let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    let cookie = Cookie::parse(set_cookie.to_string()).unwrap();
    format!("{}={}", cookie.name(), cookie.value())
}

async fn call(app: Router, uri: &str, cookie: Option<String>) -> (StatusCode, String) {
    let mut builder = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    let response = app
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

fn principal(id: &str) -> Principal {
    Principal {
        id: id.into(),
        display_name: None,
        user_id: None,
        profile: ProviderProfile::default(),
    }
}

#[tokio::test]
async fn extractor_works_on_any_state_with_the_right_parts() {
    let state = AppState {
        sessions: SessionManager::new(MemorySessionStore::new()),
        key: Key::generate(),
    };
    let id = state.sessions.establish(None, principal("p7")).await.unwrap();
    let cookie = encrypted_cookie(&state, id.as_str());

    let (status, body) = call(app(state.clone()), "/greet", None).await;
    assert_eq!((status, body.as_str()), (StatusCode::OK, "Hello, guest"));

    let (status, body) = call(app(state.clone()), "/greet", Some(cookie.clone())).await;
    assert_eq!((status, body.as_str()), (StatusCode::OK, "Hello, p7"));

    let (status, body) = call(app(state.clone()), "/protected", Some(cookie)).await;
    assert_eq!((status, body.as_str()), (StatusCode::OK, "p7"));

    let (status, _) = call(app(state), "/protected", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unencrypted_or_expired_cookies_are_anonymous() {
    let state = AppState {
        sessions: SessionManager::new(MemorySessionStore::new())
            .with_idle_timeout(time::Duration::ZERO),
        key: Key::generate(),
    };
    let id = state.sessions.establish(None, principal("p7")).await.unwrap();

    let forged = format!("{}={}", state.sessions.cookie_name(), id.as_str());
    let (status, _) = call(app(state.clone()), "/protected", Some(forged)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let expired = encrypted_cookie(&state, id.as_str());
    let (status, body) = call(app(state.clone()), "/protected", Some(expired.clone())).await;
    assert_eq!((status, body.as_str()), (StatusCode::UNAUTHORIZED, "Session expired"));

    let (status, body) = call(app(state), "/greet", Some(expired)).await;
    assert_eq!((status, body.as_str()), (StatusCode::OK, "Hello, guest"));
}
