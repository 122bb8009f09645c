use axum::extract::{FromRef, FromRequestParts, OptionalFromRequestParts};
use axum::http::request::Parts;
use axum_extra::extract::PrivateCookieJar;
use axum_extra::extract::cookie::Key;

use super::cookies;
use super::error::AuthError;
use crate::session::SessionManager;
use crate::types::{Principal, SessionId};

/// Principal of the current request, resolved from the session cookie.
///
/// Use as an Axum extractor in route handlers. Rejects with `401 Unauthorized`
/// if the request has no live, authenticated session. Each successful
/// extraction refreshes the session's idle timer.
///
/// Any router state works as long as a [`SessionManager`] and the cookie
/// [`Key`] can be pulled out of it with [`FromRef`].
///
/// # Example
///
/// ```rust,ignore
/// async fn protected(user: AuthenticatedPrincipal) -> impl IntoResponse {
///     format!("Hello, {}", user.principal.id)
/// }
///
/// // Optional: accessible to both authenticated and anonymous users
/// async fn public(user: Option<AuthenticatedPrincipal>) -> impl IntoResponse {
///     match user {
///         Some(u) => format!("Hello, {}", u.principal.id),
///         None => "Hello, guest".to_string(),
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthenticatedPrincipal {
    /// Session ID (from cookie).
    pub session_id: SessionId,
    pub principal: Principal,
}

impl<S> FromRequestParts<S> for AuthenticatedPrincipal
where
    SessionManager: FromRef<S>,
    Key: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let sessions = SessionManager::from_ref(state);
        let jar = <PrivateCookieJar<Key> as FromRequestParts<S>>::from_request_parts(parts, state)
            .await
            .map_err(|_| AuthError::Unauthenticated)?;

        let session_id =
            cookies::get_session_id(&jar, sessions.cookie_name()).ok_or(AuthError::Unauthenticated)?;

        let session = sessions
            .touch(&session_id)
            .await?
            .ok_or(AuthError::SessionExpired)?;

        let principal = session.principal.ok_or(AuthError::Unauthenticated)?;
        Ok(Self {
            session_id,
            principal,
        })
    }
}

impl<S> OptionalFromRequestParts<S> for AuthenticatedPrincipal
where
    SessionManager: FromRef<S>,
    Key: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        match <Self as FromRequestParts<S>>::from_request_parts(parts, state).await {
            Ok(user) => Ok(Some(user)),
            Err(AuthError::Unauthenticated | AuthError::SessionExpired) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
