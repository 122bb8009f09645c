use std::sync::Arc;

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;

use super::config::GatewaySettings;
use crate::oauth::AuthClient;
use crate::session::SessionManager;
use crate::verify::VerificationCallback;

/// Shared state for gateway route handlers.
pub(super) struct GatewayState<V> {
    pub(super) client: Arc<AuthClient>,
    pub(super) verification: Arc<VerificationCallback<V>>,
    pub(super) sessions: SessionManager,
    pub(super) settings: GatewaySettings,
    pub(super) logout_redirect: Arc<str>,
}

// Manual Clone: avoid derive adding a `V: Clone` bound.
impl<V> Clone for GatewayState<V> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            verification: self.verification.clone(),
            sessions: self.sessions.clone(),
            settings: self.settings.clone(),
            logout_redirect: self.logout_redirect.clone(),
        }
    }
}

// PrivateCookieJar requires Key to be extractable from state
impl<V> FromRef<GatewayState<V>> for Key {
    fn from_ref(state: &GatewayState<V>) -> Self {
        state.settings.cookie_key.clone()
    }
}

impl<V> FromRef<GatewayState<V>> for SessionManager {
    fn from_ref(state: &GatewayState<V>) -> Self {
        state.sessions.clone()
    }
}
