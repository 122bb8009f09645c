/// Boxed error returned by consumer-implemented collaborators (stores, user services).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Malformed origin, base path or missing credentials. Fatal at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The provider rejected a request, or the round trip failed or timed out.
    #[error("Provider error during {operation}: {detail}")]
    Provider {
        operation: &'static str,
        status: Option<u16>,
        detail: String,
    },

    /// The provider answered with something we could not interpret.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The application refused an otherwise valid provider identity.
    #[error("Verification error: {0}")]
    Verification(String),

    #[error("Invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("Session store error: {0}")]
    Store(String),
}

impl Error {
    /// Whether the error belongs to the callback path and should collapse into
    /// the failure redirect rather than an internal error.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Provider { .. } | Self::Protocol(_) | Self::Verification(_)
        )
    }

    pub(crate) fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            return Self::Protocol(e.to_string());
        }
        let operation = if e.is_timeout() {
            "request (timed out)"
        } else if e.is_connect() {
            "connect"
        } else {
            "request"
        };
        Self::Provider {
            operation,
            status: e.status().map(|s| s.as_u16()),
            detail: e.to_string(),
        }
    }
}
