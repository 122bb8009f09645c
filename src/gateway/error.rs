use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Rejections produced by gateway extractors.
///
/// Failures inside the login flow never surface as this type; they collapse
/// to the failure redirect.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No session cookie, or the session carries no principal.
    #[error("Not authenticated")]
    Unauthenticated,

    /// The cookie names a session that has expired or was cleared.
    #[error("Session expired")]
    SessionExpired,

    /// Session store operation failed.
    #[error("Session store error: {0}")]
    Store(String),

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthenticated | Self::SessionExpired => {
                (StatusCode::UNAUTHORIZED, self.to_string()).into_response()
            }
            Self::Store(_) | Self::Config(_) => {
                tracing::error!(error = %self, "Gateway internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
            }
        }
    }
}

impl From<crate::error::Error> for AuthError {
    fn from(e: crate::error::Error) -> Self {
        match e {
            crate::error::Error::Config(msg) => Self::Config(msg),
            other => Self::Store(other.to_string()),
        }
    }
}
