#![doc = include_str!("../README.md")]

pub mod csrf;
pub mod error;
pub mod gateway;
pub mod oauth;
pub mod session;
pub mod types;
pub mod users;
pub mod verify;

// Re-exports for convenient access
pub use error::{BoxError, Error};
pub use gateway::{
    AuthError, AuthenticatedPrincipal, CookieKey, GatewayConfig, gateway_routes,
};
pub use oauth::{AuthClient, AuthConfig, ProviderCredentials, ProviderEndpoints};
pub use session::{MemorySessionStore, Session, SessionManager, SessionStore};
pub use types::{Principal, ProviderProfile, SessionId};
pub use users::{
    CreateUser, Email, InMemoryUserService, User, UserField, UserId, UserRecord, UserService,
    Username,
};
pub use verify::{
    ProfilePassthrough, UserResolvingVerifier, VerificationCallback, VerificationObserver,
    VerifiedEvent, Verifier,
};
