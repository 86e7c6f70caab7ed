//! Bearer tokens and the authenticator that manages them.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::Instant;
use turbo_net::{Endpoint, NetworkError, Request, Session};

use crate::{Authenticator, BearerError, Credential};

/// An OAuth-style access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerToken {
    /// Value sent in the `Authorization` header.
    pub access_token: String,
    /// Token traded in for a new access token.
    pub refresh_token: Option<String>,
    /// When the access token stops being accepted. `None` never expires.
    pub expires_at: Option<Instant>,
}

impl BearerToken {
    /// Create a token that never expires.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
        }
    }

    /// Set the refresh token.
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Expire `lifetime` from now.
    pub fn expires_in(mut self, lifetime: Duration) -> Self {
        self.expires_at = Some(Instant::now() + lifetime);
        self
    }

    /// Check if the access token has expired.
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }

    /// Time left before expiry, zero once expired.
    pub fn time_to_expiry(&self) -> Option<Duration> {
        self.expires_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// The `Authorization` header value for this token.
    pub fn header_value(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

impl Credential for BearerToken {
    fn requires_refresh(&self) -> bool {
        self.is_expired()
    }
}

/// Token endpoint response body.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    /// New access token.
    pub access_token: String,
    /// Replacement refresh token, if the server rotates them.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<u64>,
}

impl TokenGrant {
    /// Turn the grant into a token, keeping `previous`'s refresh token when
    /// the server did not rotate it.
    pub fn into_token(self, previous: &BearerToken) -> BearerToken {
        BearerToken {
            access_token: self.access_token,
            refresh_token: self.refresh_token.or_else(|| previous.refresh_token.clone()),
            expires_at: self
                .expires_in
                .map(|secs| Instant::now() + Duration::from_secs(secs)),
        }
    }
}

/// Trades a token in for a new one.
#[async_trait]
pub trait TokenRefresher: Send + Sync + 'static {
    /// Obtain a replacement for `token`.
    async fn refresh(&self, token: &BearerToken) -> Result<BearerToken, BearerError>;
}

/// Refreshes tokens by posting the refresh token to a token endpoint.
///
/// The session must not itself authenticate through an
/// [`AuthenticationInterceptor`](crate::AuthenticationInterceptor) that uses
/// this refresher, or the refresh would wait on its own lock.
pub struct EndpointRefresher {
    session: Session,
    endpoint: Endpoint,
}

impl EndpointRefresher {
    /// Post to `endpoint` through `session`.
    pub fn new(session: Session, endpoint: Endpoint) -> Self {
        Self { session, endpoint }
    }
}

#[async_trait]
impl TokenRefresher for EndpointRefresher {
    async fn refresh(&self, token: &BearerToken) -> Result<BearerToken, BearerError> {
        let refresh_token = token
            .refresh_token
            .as_deref()
            .ok_or(BearerError::MissingRefreshToken)?;
        let endpoint = self
            .endpoint
            .clone()
            .parameter("grant_type", "refresh_token")
            .parameter("refresh_token", refresh_token);

        let grant: TokenGrant = self.session.request(&endpoint).await?;
        if grant.access_token.is_empty() {
            return Err(BearerError::Rejected("empty access token".to_string()));
        }
        Ok(grant.into_token(token))
    }
}

/// [`Authenticator`] for bearer tokens.
///
/// HTTP 401 counts as an authentication failure. A request counts as sent
/// with the latest token when its `Authorization` header matches the stored
/// token.
pub struct BearerAuthenticator<R> {
    token: Mutex<Option<BearerToken>>,
    refresher: R,
}

impl<R: TokenRefresher> BearerAuthenticator<R> {
    /// Create an authenticator with no token.
    pub fn new(refresher: R) -> Self {
        Self {
            token: Mutex::new(None),
            refresher,
        }
    }

    /// Start with `token`.
    pub fn with_token(self, token: BearerToken) -> Self {
        *self.slot() = Some(token);
        self
    }

    /// The refresher.
    pub fn refresher(&self) -> &R {
        &self.refresher
    }

    fn slot(&self) -> MutexGuard<'_, Option<BearerToken>> {
        self.token.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl<R: TokenRefresher> Authenticator for BearerAuthenticator<R> {
    type Credential = BearerToken;
    type Error = BearerError;

    fn credential(&self) -> Option<BearerToken> {
        self.slot().clone()
    }

    fn store_credential(&self, credential: Option<BearerToken>) {
        *self.slot() = credential;
    }

    fn apply(&self, credential: &BearerToken, request: Request) -> Request {
        request.bearer_auth(&credential.access_token)
    }

    async fn refresh(&self, credential: &BearerToken) -> Result<BearerToken, BearerError> {
        self.refresher.refresh(credential).await
    }

    fn did_fail_due_to_auth_error(&self, _request: &Request, error: &NetworkError) -> bool {
        error.status() == Some(401)
    }

    fn is_authenticated_with_latest(&self, request: &Request, credential: &BearerToken) -> bool {
        request.header_value("Authorization") == Some(credential.header_value().as_str())
    }
}
