//! Authentication errors.

use thiserror::Error;
use turbo_net::NetworkError;

/// Errors raised while refreshing a bearer token.
#[derive(Error, Debug, Clone)]
pub enum BearerError {
    /// The token has no refresh token to trade in.
    #[error("no refresh token available")]
    MissingRefreshToken,

    /// The token endpoint answered but refused the grant.
    #[error("refresh rejected: {0}")]
    Rejected(String),

    /// The refresh request itself failed.
    #[error("refresh request failed: {0}")]
    Network(#[from] NetworkError),
}

impl BearerError {
    /// Check if the refresh token itself is unusable, so the user must sign
    /// in again.
    pub fn requires_sign_in(&self) -> bool {
        match self {
            BearerError::MissingRefreshToken | BearerError::Rejected(_) => true,
            BearerError::Network(e) => matches!(e.status(), Some(400 | 401)),
        }
    }
}
