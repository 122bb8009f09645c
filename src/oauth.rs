use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::error::Error;
use crate::types::ProviderProfile;

/// Default bound on each provider round trip.
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);

/// Endpoints and conventions of one identity provider.
///
/// ```rust,ignore
/// use identity_gateway::ProviderEndpoints;
///
/// let spotify = ProviderEndpoints::spotify();
/// // Point at a staging deployment instead:
/// let staging = ProviderEndpoints::new(
///     "spotify",
///     "https://accounts.staging.example/authorize".parse()?,
///     "https://accounts.staging.example/api/token".parse()?,
///     "https://api.staging.example/v1/me".parse()?,
/// );
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ProviderEndpoints {
    pub(crate) name: String,
    pub(crate) auth_url: Url,
    pub(crate) token_url: Url,
    pub(crate) profile_url: Url,
    pub(crate) scope_separator: String,
}

impl ProviderEndpoints {
    /// Provider identified by `name`, which also becomes the route segment in
    /// `/auth/<name>`.
    #[must_use]
    pub fn new(name: impl Into<String>, auth_url: Url, token_url: Url, profile_url: Url) -> Self {
        Self {
            name: name.into(),
            auth_url,
            token_url,
            profile_url,
            scope_separator: " ".into(),
        }
    }

    /// Spotify Accounts service.
    #[must_use]
    pub fn spotify() -> Self {
        Self::new(
            "spotify",
            "https://accounts.spotify.com/authorize"
                .parse()
                .expect("valid default URL"),
            "https://accounts.spotify.com/api/token"
                .parse()
                .expect("valid default URL"),
            "https://api.spotify.com/v1/me"
                .parse()
                .expect("valid default URL"),
        )
    }

    /// Override how scopes are joined in the authorization URL (default: space).
    #[must_use]
    pub fn with_scope_separator(mut self, separator: impl Into<String>) -> Self {
        self.scope_separator = separator.into();
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn auth_url(&self) -> &Url {
        &self.auth_url
    }

    #[must_use]
    pub fn token_url(&self) -> &Url {
        &self.token_url
    }

    #[must_use]
    pub fn profile_url(&self) -> &Url {
        &self.profile_url
    }
}

/// OAuth2 client registration plus where the gateway is publicly reachable.
///
/// Immutable once built. The callback URL is derived here exactly once and
/// both the authorization request and the router read it from this value.
#[derive(Clone)]
pub struct AuthConfig {
    client_id: String,
    client_secret: String,
    scopes: Vec<String>,
    origin: Url,
    base_path: String,
    provider: ProviderEndpoints,
    callback_url: Url,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("scopes", &self.scopes)
            .field("origin", &self.origin.as_str())
            .field("base_path", &self.base_path)
            .field("provider", &self.provider.name)
            .field("callback_url", &self.callback_url.as_str())
            .finish()
    }
}

impl AuthConfig {
    /// Build and validate a configuration.
    ///
    /// `base_path` is normalized: a leading slash is added and trailing slashes
    /// are dropped, so `"gw/"` becomes `"/gw"` and `"/"` becomes `""`. Any
    /// path, query or fragment on `origin` is replaced.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when credentials are empty, the origin is not
    /// an absolute `http(s)` URL, the provider name is not a plain path
    /// segment, or the derived callback path would not match the route path
    /// byte for byte.
    pub fn new(
        provider: ProviderEndpoints,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        origin: Url,
        base_path: &str,
    ) -> Result<Self, Error> {
        let client_id = client_id.into();
        let client_secret = client_secret.into();
        if client_id.trim().is_empty() {
            return Err(Error::Config("client id must not be empty".into()));
        }
        if client_secret.trim().is_empty() {
            return Err(Error::Config("client secret must not be empty".into()));
        }
        if !matches!(origin.scheme(), "http" | "https") || origin.host_str().is_none() {
            return Err(Error::Config(format!(
                "origin must be an absolute http(s) URL, got {origin}"
            )));
        }
        if provider.name.is_empty()
            || !provider
                .name
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return Err(Error::Config(format!(
                "provider name {:?} must be a non-empty path segment",
                provider.name
            )));
        }

        let base_path = normalize_base_path(base_path)?;
        let callback_path = format!("{base_path}/auth/{}/callback", provider.name);

        let mut callback_url = origin.clone();
        callback_url.set_path(&callback_path);
        callback_url.set_query(None);
        callback_url.set_fragment(None);

        if callback_url.path() != callback_path {
            return Err(Error::Config(format!(
                "callback path {callback_path:?} does not survive URL encoding (got {:?})",
                callback_url.path()
            )));
        }

        Ok(Self {
            client_id,
            client_secret,
            scopes: Vec::new(),
            origin,
            base_path,
            provider,
            callback_url,
        })
    }

    /// Scopes requested by the initiate route. Duplicates are dropped, the
    /// first occurrence wins.
    #[must_use]
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes.clear();
        for scope in scopes {
            let scope = scope.into();
            let scope = scope.trim();
            if !scope.is_empty() && !self.scopes.iter().any(|s| s == scope) {
                self.scopes.push(scope.to_string());
            }
        }
        self
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    #[must_use]
    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Normalized base path, either empty or `/segment[/segment...]`.
    #[must_use]
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    #[must_use]
    pub fn provider(&self) -> &ProviderEndpoints {
        &self.provider
    }

    /// Path the initiate route listens on: `<base>/auth/<provider>`.
    #[must_use]
    pub fn auth_path(&self) -> String {
        format!("{}/auth/{}", self.base_path, self.provider.name)
    }

    /// Path the callback route listens on. Always equal to the path of
    /// [`callback_url`](Self::callback_url).
    #[must_use]
    pub fn callback_path(&self) -> &str {
        self.callback_url.path()
    }

    /// Redirect URI registered with the provider.
    #[must_use]
    pub fn callback_url(&self) -> &Url {
        &self.callback_url
    }
}

fn normalize_base_path(raw: &str) -> Result<String, Error> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Ok(String::new());
    }
    if trimmed.contains(['?', '#', '\\']) {
        return Err(Error::Config(format!(
            "base path {raw:?} must not contain '?', '#' or '\\'"
        )));
    }
    let path = if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    };
    if path.contains("//") {
        return Err(Error::Config(format!(
            "base path {raw:?} must not contain empty segments"
        )));
    }
    Ok(path)
}

/// Everything a successful authorization-code exchange yields.
///
/// All four parts are required, so holding a value proves the exchange was
/// complete.
#[derive(Clone)]
pub struct ProviderCredentials {
    access_token: String,
    refresh_token: String,
    expires_in_seconds: u64,
    profile: ProviderProfile,
}

impl std::fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_in_seconds", &self.expires_in_seconds)
            .field("profile", &self.profile)
            .finish()
    }
}

impl ProviderCredentials {
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if either token is empty.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_in_seconds: u64,
        profile: ProviderProfile,
    ) -> Result<Self, Error> {
        let access_token = access_token.into();
        let refresh_token = refresh_token.into();
        if access_token.is_empty() {
            return Err(Error::Protocol("empty access_token".into()));
        }
        if refresh_token.is_empty() {
            return Err(Error::Protocol("empty refresh_token".into()));
        }
        Ok(Self {
            access_token,
            refresh_token,
            expires_in_seconds,
            profile,
        })
    }

    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    #[must_use]
    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }

    #[must_use]
    pub fn expires_in_seconds(&self) -> u64 {
        self.expires_in_seconds
    }

    #[must_use]
    pub fn profile(&self) -> &ProviderProfile {
        &self.profile
    }
}

/// Raw token endpoint response. Every field is optional here so a partial
/// response turns into a [`Error::Protocol`] naming what is missing.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

impl TokenResponse {
    fn into_parts(self) -> Result<(String, String, u64), Error> {
        let missing: Vec<&str> = [
            ("access_token", self.access_token.as_deref().is_none_or(str::is_empty)),
            ("refresh_token", self.refresh_token.as_deref().is_none_or(str::is_empty)),
            ("expires_in", self.expires_in.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, absent)| absent.then_some(name))
        .collect();

        match (self.access_token, self.refresh_token, self.expires_in) {
            (Some(access), Some(refresh), Some(expires)) if missing.is_empty() => {
                Ok((access, refresh, expires))
            }
            _ => Err(Error::Protocol(format!(
                "token response missing {}",
                missing.join(", ")
            ))),
        }
    }
}

/// OAuth2 authorization-code client for one provider.
pub struct AuthClient {
    config: AuthConfig,
    http: reqwest::Client,
}

impl AuthClient {
    /// Create a client whose provider calls give up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the HTTP client cannot be built (e.g. no
    /// TLS backend).
    pub fn new(config: AuthConfig, timeout: Duration) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("HTTP client: {e}")))?;
        Ok(Self { config, http })
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    ///
    /// The caller is responsible for configuring its timeout.
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Build the provider authorization URL.
    ///
    /// Pure: the same scopes and state always give the same URL.
    #[must_use]
    pub fn authorization_url(&self, scopes: &[String], state: Option<&str>) -> Url {
        let provider = &self.config.provider;
        let scope = scopes.join(&provider.scope_separator);

        let mut url = provider.auth_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.config.client_id)
                .append_pair("redirect_uri", self.config.callback_url.as_str());
            if !scope.is_empty() {
                query.append_pair("scope", &scope);
            }
            if let Some(state) = state {
                query.append_pair("state", state);
            }
        }
        url
    }

    /// Exchange an authorization code for tokens and fetch the profile.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Provider`] if the provider rejects the code, a call
    /// fails or times out, and [`Error::Protocol`] if a response cannot be
    /// decoded or lacks a required field.
    pub async fn exchange_code(&self, code: &str) -> Result<ProviderCredentials, Error> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.callback_url.as_str()),
        ];

        let response = self
            .http
            .post(self.config.provider.token_url.clone())
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&params)
            .send()
            .await?;

        let response = Self::ensure_success(response, "token exchange").await?;
        let (access_token, refresh_token, expires_in) =
            response.json::<TokenResponse>().await?.into_parts()?;

        let profile = self.fetch_profile(&access_token).await?;

        ProviderCredentials::new(access_token, refresh_token, expires_in, profile)
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<ProviderProfile, Error> {
        let response = self
            .http
            .get(self.config.provider.profile_url.clone())
            .bearer_auth(access_token)
            .send()
            .await?;

        let response = Self::ensure_success(response, "profile request").await?;
        let body = response.json::<serde_json::Value>().await?;
        ProviderProfile::try_from(body)
    }

    /// Checks HTTP response status; returns the response on success or an error with details.
    async fn ensure_success(
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<reqwest::Response, Error> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(Error::Provider {
            operation,
            status: Some(status),
            detail: body,
        })
    }
}
