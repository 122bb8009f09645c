use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use axum_extra::extract::PrivateCookieJar;
use serde::Deserialize;
use serde_json::json;

use super::config::GatewayConfig;
use super::cookies;
use super::error::AuthError;
use super::extractor::AuthenticatedPrincipal;
use super::state::GatewayState;
use crate::csrf;
use crate::error::Error;
use crate::oauth::AuthClient;
use crate::session::SessionManager;
use crate::types::{Principal, SessionId};
use crate::verify::{VerificationCallback, Verifier};

/// Create the gateway router.
///
/// Mounts, under the configured base path:
/// - `GET /auth/<provider>`: start the authorization-code flow
/// - `GET /auth/<provider>/callback`: finish it and establish a session
/// - `GET|POST /logout`
/// - `GET /api`, `GET /api/me`
///
/// `sessions` is used as given; build it with
/// [`GatewayConfig::session_manager`] to apply the configured lifetimes.
///
/// # Errors
///
/// Returns [`Error::Config`] if the configuration fails validation or the
/// provider HTTP client cannot be built.
pub fn gateway_routes<V: Verifier>(
    config: GatewayConfig,
    verification: VerificationCallback<V>,
    sessions: SessionManager,
) -> Result<Router, Error> {
    config.validate()?;

    let base = config.auth.base_path().to_string();
    let auth_path = config.auth.auth_path();
    let callback_path = config.auth.callback_path().to_string();
    let logout_redirect = config.logout_redirect();
    let client = AuthClient::new(config.auth, config.settings.provider_timeout)?;

    let state = GatewayState {
        client: Arc::new(client),
        verification: Arc::new(verification),
        sessions,
        settings: config.settings,
        logout_redirect: logout_redirect.into(),
    };

    let router = Router::new()
        .route(&auth_path, get(initiate::<V>))
        .route(&callback_path, get(callback::<V>))
        .route(
            &format!("{base}/logout"),
            get(logout::<V>).post(logout::<V>),
        )
        .route(&format!("{base}/api"), get(api_index))
        .route(&format!("{base}/api/me"), get(me))
        .with_state(state);

    Ok(router)
}

// ── Initiate ───────────────────────────────────────────────────────

async fn initiate<V: Verifier>(
    State(state): State<GatewayState<V>>,
    jar: PrivateCookieJar,
) -> (PrivateCookieJar, Response) {
    let config = state.client.config();

    if !state.settings.verify_state {
        let url = state.client.authorization_url(config.scopes(), None);
        return (jar, found(url.as_str()));
    }

    let csrf_state = csrf::generate_state();
    let url = state
        .client
        .authorization_url(config.scopes(), Some(&csrf_state));
    let cookie = cookies::state_cookie(
        &csrf_state,
        state.settings.secure_cookies,
        &config.auth_path(),
    );

    (jar.add(cookie), found(url.as_str()))
}

// ── Callback ───────────────────────────────────────────────────────

#[derive(Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

async fn callback<V: Verifier>(
    State(state): State<GatewayState<V>>,
    jar: PrivateCookieJar,
    params: Result<Query<CallbackParams>, QueryRejection>,
) -> (PrivateCookieJar, Response) {
    let expected_state = cookies::get_state(&jar);
    let current = cookies::get_session_id(&jar, state.sessions.cookie_name());
    let jar = jar.remove(cookies::clear_state_cookie(
        &state.client.config().auth_path(),
    ));

    let params = match params {
        Ok(Query(params)) => params,
        Err(rejection) => {
            tracing::warn!(error = %rejection, "Malformed callback query");
            return (jar, found(&state.settings.failure_redirect));
        }
    };

    let (session_id, principal) =
        match complete_login(&state, params, expected_state.as_deref(), current.as_ref()).await {
            Ok(done) => done,
            Err(_) => return (jar, found(&state.settings.failure_redirect)),
        };

    let cookie = cookies::session_cookie(
        state.sessions.cookie_name(),
        &session_id,
        state.sessions.max_age(),
        state.settings.secure_cookies,
    );
    let jar = jar.add(cookie);

    tracing::info!(
        provider = state.client.config().provider().name(),
        principal_id = %principal.id,
        "Login successful"
    );

    let response = match &state.settings.login_redirect {
        Some(target) => found(target),
        None => Json(json!({ "user": principal })).into_response(),
    };
    (jar, response)
}

/// Exchange, verify and establish. Every failure is logged here and
/// collapses to the failure redirect in the caller.
async fn complete_login<V: Verifier>(
    state: &GatewayState<V>,
    params: CallbackParams,
    expected_state: Option<&str>,
    current: Option<&SessionId>,
) -> Result<(SessionId, Principal), Error> {
    if let Some(error) = params.error {
        let description = params.error_description.unwrap_or_default();
        tracing::warn!(error = %error, description = %description, "Provider denied authorization");
        return Err(Error::Provider {
            operation: "authorization",
            status: None,
            detail: error,
        });
    }

    let code = params.code.filter(|c| !c.is_empty()).ok_or_else(|| {
        tracing::warn!("Callback without authorization code");
        Error::Protocol("callback missing code".into())
    })?;

    if state.settings.verify_state {
        let matches = match (expected_state, params.state.as_deref()) {
            (Some(expected), Some(received)) => csrf::state_matches(expected, received),
            _ => false,
        };
        if !matches {
            tracing::warn!("OAuth state mismatch");
            return Err(Error::Protocol("state mismatch".into()));
        }
    }

    let credentials = state.client.exchange_code(&code).await.map_err(|e| {
        tracing::error!(error = %e, "Token exchange failed");
        e
    })?;

    let principal = state.verification.verify(&credentials).await.map_err(|e| {
        tracing::warn!(error = %e, "Verification rejected identity");
        e
    })?;

    let session_id = state
        .sessions
        .establish(current, principal.clone())
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Session establishment failed");
            e
        })?;

    Ok((session_id, principal))
}

// ── Logout ─────────────────────────────────────────────────────────

/// The browser cookie is always dropped. If the store cannot delete the
/// record the answer is a 500 rather than the usual redirect, since the
/// session stays valid server-side until it expires.
async fn logout<V: Verifier>(
    State(state): State<GatewayState<V>>,
    jar: PrivateCookieJar,
) -> (PrivateCookieJar, Response) {
    let cookie_name = state.sessions.cookie_name();
    let session_id = cookies::get_session_id(&jar, cookie_name);
    let jar = jar.remove(cookies::clear_session_cookie(cookie_name));

    if let Some(session_id) = session_id {
        if let Err(e) = state.sessions.clear(&session_id).await {
            return (jar, AuthError::from(e).into_response());
        }
        tracing::info!("Logout");
    }

    (jar, found(&state.logout_redirect))
}

// ── API ────────────────────────────────────────────────────────────

async fn api_index() -> Json<serde_json::Value> {
    Json(json!({ "message": "Welcome to identity-gateway!" }))
}

async fn me(user: AuthenticatedPrincipal) -> Json<serde_json::Value> {
    Json(json!({ "user": user.principal }))
}

// ── Helpers ────────────────────────────────────────────────────────

/// `302 Found`; `Redirect::to` answers 303.
fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}
