//! Interceptor that applies credentials and refreshes them once under
//! contention.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tracing::{debug, info, warn};
use turbo_net::{Adapter, NetworkError, Request, RetryDecision, Retrier};

use crate::{AsyncLock, Authenticator, Credential};

/// Applies an [`Authenticator`]'s credential to every request and renews it
/// when it expires or the server rejects it.
///
/// Adapting and retrying both run under one [`AsyncLock`]. When many
/// requests fail together, the first one through the lock refreshes; the
/// others see that they were sent with an older credential and retry with
/// the new one without refreshing again.
///
/// If a refresh fails the stored credential stays cleared and the request
/// fails with [`NetworkError::Auth`] carrying the authenticator's error.
pub struct AuthenticationInterceptor<A: Authenticator> {
    authenticator: A,
    lock: AsyncLock,
    refreshes: AtomicU64,
}

impl<A: Authenticator> AuthenticationInterceptor<A> {
    /// Wrap `authenticator`.
    pub fn new(authenticator: A) -> Self {
        Self {
            authenticator,
            lock: AsyncLock::new(),
            refreshes: AtomicU64::new(0),
        }
    }

    /// The wrapped authenticator.
    pub fn authenticator(&self) -> &A {
        &self.authenticator
    }

    /// Number of refreshes started so far.
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::Relaxed)
    }

    /// Refresh `credential`. Must be called with the lock held.
    async fn refresh(&self, credential: &A::Credential) -> Result<A::Credential, NetworkError> {
        self.authenticator.store_credential(None);
        let count = self.refreshes.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(refresh = count, "refreshing credential");

        match self.authenticator.refresh(credential).await {
            Ok(fresh) => {
                self.authenticator.store_credential(Some(fresh.clone()));
                info!(refresh = count, "credential refreshed");
                Ok(fresh)
            }
            Err(error) => {
                warn!(refresh = count, %error, "credential refresh failed");
                Err(NetworkError::auth(error))
            }
        }
    }
}

#[async_trait]
impl<A: Authenticator> Adapter for AuthenticationInterceptor<A> {
    async fn adapt(&self, request: Request) -> Result<Request, NetworkError> {
        let _guard = self.lock.acquire().await;

        let Some(mut credential) = self.authenticator.credential() else {
            return Ok(request);
        };
        if credential.requires_refresh() {
            credential = self.refresh(&credential).await?;
        }
        Ok(self.authenticator.apply(&credential, request))
    }
}

#[async_trait]
impl<A: Authenticator> Retrier for AuthenticationInterceptor<A> {
    async fn retry(
        &self,
        request: &Request,
        error: &NetworkError,
        _attempt: u32,
    ) -> Result<RetryDecision, NetworkError> {
        if !error.is_remote() || !self.authenticator.did_fail_due_to_auth_error(request, error) {
            return Ok(RetryDecision::DoNotRetry);
        }

        let _guard = self.lock.acquire().await;

        let Some(credential) = self.authenticator.credential() else {
            return Ok(RetryDecision::DoNotRetry);
        };
        if !self
            .authenticator
            .is_authenticated_with_latest(request, &credential)
        {
            debug!(url = %request.url, "credential already refreshed; retrying");
            return Ok(RetryDecision::Retry);
        }

        self.refresh(&credential).await?;
        Ok(RetryDecision::Retry)
    }
}
