//! Authentication for TurboCommerce clients.
//!
//! Provides a FIFO [`AsyncLock`], the [`Authenticator`] boundary, and an
//! [`AuthenticationInterceptor`] that refreshes credentials exactly once
//! when many requests fail together.

mod authenticator;
mod bearer;
mod error;
mod interceptor;
mod lock;

pub use authenticator::{Authenticator, Credential};
pub use bearer::{BearerAuthenticator, BearerToken, EndpointRefresher, TokenGrant, TokenRefresher};
pub use error::BearerError;
pub use interceptor::AuthenticationInterceptor;
pub use lock::{AsyncLock, AsyncLockGuard};
