//! HTTP surface of the gateway for Axum.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use identity_gateway::{GatewayConfig, MemorySessionStore, ProfilePassthrough,
//!     VerificationCallback, gateway_routes};
//!
//! let config = GatewayConfig::from_env()?;
//! let sessions = config.session_manager(MemorySessionStore::new());
//! let verification = VerificationCallback::new("spotify", ProfilePassthrough);
//!
//! let app = axum::Router::new()
//!     .merge(gateway_routes(config, verification, sessions)?);
//! ```
//!
//! Protected handlers take an [`AuthenticatedPrincipal`].

mod config;
mod cookies;
mod error;
mod extractor;
mod routes;
mod state;

#[cfg(test)]
mod tests;

pub use config::{DEFAULT_FAILURE_REDIRECT, DEFAULT_PORT, GatewayConfig};
pub use error::AuthError;
pub use extractor::AuthenticatedPrincipal;
pub use routes::gateway_routes;

/// Re-export cookie key type for builder API.
pub use axum_extra::extract::cookie::Key as CookieKey;
