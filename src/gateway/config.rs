use std::time::Duration as StdDuration;

use axum_extra::extract::cookie::Key;
use time::Duration;
use url::Url;

use crate::error::Error;
use crate::oauth::{AuthConfig, DEFAULT_PROVIDER_TIMEOUT, ProviderEndpoints};
use crate::session::{
    DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_AGE, DEFAULT_SESSION_COOKIE, SessionManager, SessionStore,
};

pub const DEFAULT_PORT: u16 = 3333;
pub const DEFAULT_FAILURE_REDIRECT: &str = "/login";
const DEFAULT_SCOPES: [&str; 2] = ["user-read-email", "user-read-private"];

/// Shared gateway settings used by both config and runtime state.
#[derive(Clone)]
pub(crate) struct GatewaySettings {
    pub(crate) cookie_key: Key,
    pub(crate) secure_cookies: bool,
    pub(crate) verify_state: bool,
    pub(crate) failure_redirect: String,
    pub(crate) login_redirect: Option<String>,
    pub(crate) logout_redirect: Option<String>,
    pub(crate) provider_timeout: StdDuration,
    pub(crate) session_cookie_name: String,
    pub(crate) session_idle_timeout: Duration,
    pub(crate) session_max_age: Duration,
}

impl GatewaySettings {
    fn defaults(cookie_key: Key) -> Self {
        Self {
            cookie_key,
            secure_cookies: true,
            verify_state: true,
            failure_redirect: DEFAULT_FAILURE_REDIRECT.into(),
            login_redirect: None,
            logout_redirect: None,
            provider_timeout: DEFAULT_PROVIDER_TIMEOUT,
            session_cookie_name: DEFAULT_SESSION_COOKIE.into(),
            session_idle_timeout: DEFAULT_IDLE_TIMEOUT,
            session_max_age: DEFAULT_MAX_AGE,
        }
    }
}

/// Gateway configuration.
///
/// Required parts (`AuthConfig`, cookie key) are constructor parameters. The
/// cookie key has no default: pass a real one, or use
/// [`from_env()`](GatewayConfig::from_env).
pub struct GatewayConfig {
    pub(super) auth: AuthConfig,
    pub(super) settings: GatewaySettings,
    port: u16,
}

impl GatewayConfig {
    #[must_use]
    pub fn new(auth: AuthConfig, cookie_key: Key) -> Self {
        Self {
            auth,
            settings: GatewaySettings::defaults(cookie_key),
            port: DEFAULT_PORT,
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `SPOTIFY_CLIENT_ID`, `SPOTIFY_CLIENT_SECRET`: OAuth2 client registration
    /// - `PUBLIC_ORIGIN`: origin the browser reaches the gateway on
    /// - `SESSION_SECRET`: cookie encryption key, at least 64 bytes (release
    ///   builds only; debug builds fall back to an ephemeral key)
    ///
    /// # Optional env vars
    /// - `SPOTIFY_SCOPES`: comma-separated scopes
    /// - `BASE_PATH`: path prefix for every route
    /// - `GATEWAY_PORT`: listening port (default 3333)
    /// - `SESSION_IDLE_TIMEOUT_SECS`, `SESSION_MAX_AGE_SECS`: session lifetime
    /// - `PROVIDER_TIMEOUT_SECS`: bound on each provider round trip
    /// - `LOGIN_FAILURE_REDIRECT`: failure page (default `/login`)
    /// - `LOGIN_SUCCESS_REDIRECT`: post-login target; unset returns the principal as JSON
    /// - `INSECURE_COOKIES`: `"1"` or `"true"` drops the `Secure` flag for plain-HTTP development
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if required env vars are missing or a value is invalid.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|name| std::env::var(name).ok(), !cfg!(debug_assertions))
    }

    pub(crate) fn from_lookup<F>(lookup: F, require_secret: bool) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| Error::Config(format!("{name} is required")))
        };

        let client_id = required("SPOTIFY_CLIENT_ID")?;
        let client_secret = required("SPOTIFY_CLIENT_SECRET")?;
        let origin: Url = required("PUBLIC_ORIGIN")?
            .parse()
            .map_err(|e| Error::Config(format!("PUBLIC_ORIGIN: {e}")))?;
        let base_path = lookup("BASE_PATH").unwrap_or_default();

        let scopes: Vec<String> = match lookup("SPOTIFY_SCOPES") {
            Some(raw) => raw.split(',').map(|s| s.trim().to_string()).collect(),
            None => DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
        };

        let auth = AuthConfig::new(
            ProviderEndpoints::spotify(),
            client_id,
            client_secret,
            origin,
            &base_path,
        )?
        .with_scopes(scopes);

        let cookie_key = match lookup("SESSION_SECRET") {
            Some(secret) => Key::try_from(secret.as_bytes()).map_err(|_| {
                Error::Config("SESSION_SECRET is set but invalid (must be at least 64 bytes)".into())
            })?,
            None if require_secret => {
                return Err(Error::Config("SESSION_SECRET is required".into()));
            }
            None => {
                tracing::warn!("SESSION_SECRET not set; using an ephemeral cookie key");
                Key::generate()
            }
        };

        let insecure = matches!(lookup("INSECURE_COOKIES").as_deref(), Some("1") | Some("true"));

        let mut config = Self::new(auth, cookie_key).with_secure_cookies(!insecure);

        if let Some(port) = parse_var::<u16>(&lookup, "GATEWAY_PORT")? {
            config = config.with_port(port);
        }
        if let Some(secs) = parse_var::<u32>(&lookup, "SESSION_IDLE_TIMEOUT_SECS")? {
            config = config.with_session_idle_timeout(Duration::seconds(secs.into()));
        }
        if let Some(secs) = parse_var::<u32>(&lookup, "SESSION_MAX_AGE_SECS")? {
            config = config.with_session_max_age(Duration::seconds(secs.into()));
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "PROVIDER_TIMEOUT_SECS")? {
            config = config.with_provider_timeout(StdDuration::from_secs(secs));
        }
        if let Some(path) = lookup("LOGIN_FAILURE_REDIRECT") {
            config = config.with_failure_redirect(path);
        }
        if let Some(path) = lookup("LOGIN_SUCCESS_REDIRECT") {
            config = config.with_login_redirect(path);
        }

        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.settings.secure_cookies = secure;
        self
    }

    /// Check the `state` parameter against the cookie set at initiate (default on).
    #[must_use]
    pub fn with_state_verification(mut self, enabled: bool) -> Self {
        self.settings.verify_state = enabled;
        self
    }

    #[must_use]
    pub fn with_failure_redirect(mut self, path: impl Into<String>) -> Self {
        self.settings.failure_redirect = path.into();
        self
    }

    /// Redirect here after login instead of answering with the principal.
    #[must_use]
    pub fn with_login_redirect(mut self, path: impl Into<String>) -> Self {
        self.settings.login_redirect = Some(path.into());
        self
    }

    /// Override the post-logout target (default `<base_path>/api`).
    #[must_use]
    pub fn with_logout_redirect(mut self, path: impl Into<String>) -> Self {
        self.settings.logout_redirect = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_provider_timeout(mut self, timeout: StdDuration) -> Self {
        self.settings.provider_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_session_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.settings.session_cookie_name = name.into();
        self
    }

    #[must_use]
    pub fn with_session_idle_timeout(mut self, timeout: Duration) -> Self {
        self.settings.session_idle_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_session_max_age(mut self, max_age: Duration) -> Self {
        self.settings.session_max_age = max_age;
        self
    }

    #[must_use]
    pub fn auth(&self) -> &AuthConfig {
        &self.auth
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// A [`SessionManager`] over `store` using this config's cookie and lifetime settings.
    #[must_use]
    pub fn session_manager(&self, store: impl SessionStore) -> SessionManager {
        SessionManager::new(store)
            .with_cookie_name(self.settings.session_cookie_name.clone())
            .with_idle_timeout(self.settings.session_idle_timeout)
            .with_max_age(self.settings.session_max_age)
    }

    pub(super) fn logout_redirect(&self) -> String {
        self.settings
            .logout_redirect
            .clone()
            .unwrap_or_else(|| format!("{}/api", self.auth.base_path()))
    }

    /// Startup checks that cannot be expressed in the types.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for unsafe redirect targets, a non-positive
    /// session lifetime, or an invalid cookie name.
    pub fn validate(&self) -> Result<(), Error> {
        check_redirect("failure redirect", &self.settings.failure_redirect)?;
        if let Some(target) = &self.settings.login_redirect {
            check_redirect("login redirect", target)?;
        }
        if let Some(target) = &self.settings.logout_redirect {
            check_redirect("logout redirect", target)?;
        }
        if !self.settings.session_idle_timeout.is_positive()
            || !self.settings.session_max_age.is_positive()
        {
            return Err(Error::Config("session lifetimes must be positive".into()));
        }
        let name = &self.settings.session_cookie_name;
        if name.is_empty() || !name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-') {
            return Err(Error::Config(format!("invalid session cookie name {name:?}")));
        }
        if self.settings.provider_timeout.is_zero() {
            return Err(Error::Config("provider timeout must be positive".into()));
        }
        Ok(())
    }
}

/// Redirect targets are local paths or absolute http(s) URLs; protocol-relative
/// `//host` targets are rejected.
fn check_redirect(what: &str, target: &str) -> Result<(), Error> {
    let local = target.starts_with('/') && !target.starts_with("//") && !target.contains('\\');
    let absolute = Url::parse(target)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false);
    if local || absolute {
        Ok(())
    } else {
        Err(Error::Config(format!("{what} {target:?} must be a path or http(s) URL")))
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>, Error>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    lookup(name)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| Error::Config(format!("{name}: {e}")))
        })
        .transpose()
}
