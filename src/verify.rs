//! The trust boundary between provider credentials and application principals.
//!
//! Nothing reaches a session without passing through [`VerificationCallback::verify`].

use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use crate::error::{BoxError, Error};
use crate::oauth::ProviderCredentials;
use crate::types::{Principal, ProviderProfile};
use crate::users::{CreateUser, Email, UserField, UserService};

/// Event name delivered to observers after a successful verification.
pub const VERIFIED_EVENT: &str = "auth.provider.verified";

/// Lifecycle notification emitted once per successful verification.
#[derive(Debug)]
#[non_exhaustive]
pub struct VerifiedEvent<'a> {
    pub event: &'static str,
    pub provider: &'a str,
    pub credentials: &'a ProviderCredentials,
    pub principal: &'a Principal,
}

/// Receives [`VerifiedEvent`]s. Errors and panics are logged and dropped.
///
/// Closures of the right shape implement this directly:
///
/// ```rust,ignore
/// let callback = VerificationCallback::new("spotify", ProfilePassthrough)
///     .with_observer(|event: &VerifiedEvent<'_>| -> Result<(), BoxError> {
///         tracing::info!(provider = event.provider, "login");
///         Ok(())
///     });
/// ```
pub trait VerificationObserver: Send + Sync + 'static {
    fn on_verified(&self, event: &VerifiedEvent<'_>) -> Result<(), BoxError>;
}

impl<F> VerificationObserver for F
where
    F: Fn(&VerifiedEvent<'_>) -> Result<(), BoxError> + Send + Sync + 'static,
{
    fn on_verified(&self, event: &VerifiedEvent<'_>) -> Result<(), BoxError> {
        self(event)
    }
}

/// Decides whether a remote identity is acceptable and what principal it maps to.
///
/// Implement this to attach provider identities to internal accounts; the
/// route layer does not change.
pub trait Verifier: Send + Sync + 'static {
    /// # Errors
    ///
    /// Returns [`Error::Verification`] to reject the identity.
    fn verify(
        &self,
        credentials: &ProviderCredentials,
    ) -> impl Future<Output = Result<Principal, Error>> + Send;
}

/// Accepts any profile with an `id` and uses the profile itself as the principal.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProfilePassthrough;

impl Verifier for ProfilePassthrough {
    async fn verify(&self, credentials: &ProviderCredentials) -> Result<Principal, Error> {
        principal_from_profile(credentials.profile())
    }
}

/// Build a principal from a provider profile.
///
/// # Errors
///
/// Returns [`Error::Verification`] if the profile has no usable `id`.
pub fn principal_from_profile(profile: &ProviderProfile) -> Result<Principal, Error> {
    let id = profile
        .id()
        .ok_or_else(|| Error::Verification("profile has no id".into()))?;
    Ok(Principal {
        id,
        display_name: profile.display_name().map(str::to_string),
        user_id: None,
        profile: profile.clone(),
    })
}

/// Resolves the profile email to an internal user, creating one on first login.
pub struct UserResolvingVerifier<U> {
    users: Arc<U>,
}

impl<U> UserResolvingVerifier<U> {
    #[must_use]
    pub fn new(users: Arc<U>) -> Self {
        Self { users }
    }
}

impl<U: UserService> Verifier for UserResolvingVerifier<U> {
    async fn verify(&self, credentials: &ProviderCredentials) -> Result<Principal, Error> {
        let mut principal = principal_from_profile(credentials.profile())?;

        let email: Email = credentials
            .profile()
            .email()
            .ok_or_else(|| Error::Verification("profile has no email".into()))?
            .parse()
            .map_err(|e| Error::Verification(format!("profile email: {e}")))?;

        let existing = self
            .users
            .find_by_email(&email, &UserField::ALL)
            .await
            .map_err(|e| Error::Verification(format!("user lookup failed: {e}")))?;

        let user = match existing {
            Some(user) => user,
            None => {
                let user = self
                    .users
                    .create_user(CreateUser {
                        username: None,
                        email: Some(email.into()),
                    })
                    .await
                    .map_err(|e| Error::Verification(format!("user creation failed: {e}")))?;
                tracing::info!(user_id = %user.id, provider_id = %principal.id, "Created user on first login");
                user
            }
        };

        principal.user_id = Some(user.id);
        Ok(principal)
    }
}

/// Runs the configured [`Verifier`] and notifies observers on success.
pub struct VerificationCallback<V> {
    provider: String,
    verifier: V,
    observers: Vec<Arc<dyn VerificationObserver>>,
}

impl<V: Verifier> VerificationCallback<V> {
    #[must_use]
    pub fn new(provider: impl Into<String>, verifier: V) -> Self {
        Self {
            provider: provider.into(),
            verifier,
            observers: Vec::new(),
        }
    }

    /// Register an observer. Observers run in registration order.
    #[must_use]
    pub fn with_observer(mut self, observer: impl VerificationObserver) -> Self {
        self.observers.push(Arc::new(observer));
        self
    }

    /// # Errors
    ///
    /// Returns whatever the verifier rejected with, normally
    /// [`Error::Verification`]. Observer failures never surface here.
    pub async fn verify(&self, credentials: &ProviderCredentials) -> Result<Principal, Error> {
        let principal = self.verifier.verify(credentials).await?;

        let event = VerifiedEvent {
            event: VERIFIED_EVENT,
            provider: &self.provider,
            credentials,
            principal: &principal,
        };
        self.notify(&event);

        Ok(principal)
    }

    fn notify(&self, event: &VerifiedEvent<'_>) {
        for (index, observer) in self.observers.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| observer.on_verified(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(observer = index, error = %e, "Verification observer failed");
                }
                Err(_) => {
                    tracing::error!(observer = index, "Verification observer panicked");
                }
            }
        }
    }
}
