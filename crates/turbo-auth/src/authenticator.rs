//! Credential storage and refresh boundary.

use async_trait::async_trait;
use turbo_net::{NetworkError, Request};

/// A credential that can signal it is due for refresh.
pub trait Credential: Clone + Send + Sync + 'static {
    /// Whether the credential must be refreshed before its next use.
    fn requires_refresh(&self) -> bool;
}

/// Owns a credential and knows how to apply and renew it.
///
/// [`AuthenticationInterceptor`](crate::AuthenticationInterceptor) calls
/// every method while holding its lock, so implementations need no ordering
/// of their own beyond interior mutability for the stored credential.
#[async_trait]
pub trait Authenticator: Send + Sync + 'static {
    /// Credential type.
    type Credential: Credential;

    /// Error returned by [`refresh`](Self::refresh).
    type Error: std::error::Error + Send + Sync + 'static;

    /// The current credential, if any.
    fn credential(&self) -> Option<Self::Credential>;

    /// Replace the stored credential. `None` clears it.
    fn store_credential(&self, credential: Option<Self::Credential>);

    /// Attach `credential` to an outgoing request.
    fn apply(&self, credential: &Self::Credential, request: Request) -> Request;

    /// Obtain a new credential from `credential`.
    async fn refresh(&self, credential: &Self::Credential) -> Result<Self::Credential, Self::Error>;

    /// Whether `error` means the request was rejected for its credential.
    fn did_fail_due_to_auth_error(&self, request: &Request, error: &NetworkError) -> bool;

    /// Whether `request` carried `credential`.
    fn is_authenticated_with_latest(&self, request: &Request, credential: &Self::Credential)
        -> bool;
}
