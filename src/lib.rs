//! Glue between axum request handlers, Azure AD / AD B2C sign-in, and Microsoft
//! Graph user management.
//!
//! Bearer tokens are decoded and policy-checked but their signatures are NOT
//! verified. Only put [`auth::bearer_auth_middleware`] behind something that
//! already checks signatures, or accept that callers can forge claims.

pub mod auth;
pub mod error;
pub mod graph;

pub use auth::{AuthClient, AuthClientConfig, AuthMode, BearerGate};
pub use error::{AzlinkError, Result};
pub use graph::{GraphClient, User};
