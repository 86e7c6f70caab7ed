//! Network error types.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use thiserror::Error;

/// Category of a failure that happened before a response was received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalErrorKind {
    /// The request URL could not be built.
    InvalidUrl,
    /// The connection could not be established or was lost.
    Connection,
    /// The transport gave up waiting.
    Timeout,
    /// Any other transport-level failure.
    Transport,
}

impl fmt::Display for LocalErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidUrl => write!(f, "invalid URL"),
            Self::Connection => write!(f, "connection error"),
            Self::Timeout => write!(f, "timed out"),
            Self::Transport => write!(f, "transport error"),
        }
    }
}

/// A connectivity or URL construction failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct LocalError {
    /// Failure category.
    pub kind: LocalErrorKind,
    /// Human-readable detail from the transport.
    pub message: String,
}

impl LocalError {
    /// Create a new local error.
    pub fn new(kind: LocalErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Create an invalid URL error.
    pub fn invalid_url(message: impl Into<String>) -> Self {
        Self::new(LocalErrorKind::InvalidUrl, message)
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(LocalErrorKind::Connection, message)
    }

    /// Create a timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(LocalErrorKind::Timeout, message)
    }

    /// Create a generic transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(LocalErrorKind::Transport, message)
    }
}

/// Errors surfaced to callers of a session.
///
/// Cloneable so that a single terminal failure can be handed to every caller
/// sharing one deduplicated execution.
#[derive(Error, Debug, Clone)]
pub enum NetworkError {
    /// Connectivity or URL construction failure.
    #[error("local error: {0}")]
    Local(#[from] LocalError),

    /// The server answered with a non-2xx status.
    #[error("HTTP {status}")]
    Remote { status: u16, body: Vec<u8> },

    /// The response body did not match the expected shape.
    #[error("decoding error: {0}")]
    Decoding(String),

    /// Required local data (e.g. a stored credential) was absent.
    #[error("missing local data")]
    MissingLocalData,

    /// The transport completed without delivering a response.
    #[error("missing remote data")]
    MissingRemoteData,

    /// The session's base URL could not be parsed.
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),

    /// Credential refresh failed. Carries the refresh operation's own error.
    #[error("authentication error: {0}")]
    Auth(Arc<dyn std::error::Error + Send + Sync>),

    /// The request was cancelled before it completed.
    #[error("request cancelled")]
    Cancelled,

    /// The configured retry cap was reached.
    #[error("gave up after {attempts} attempts: {last}")]
    RetryLimitExceeded {
        attempts: u32,
        last: Box<NetworkError>,
    },
}

impl NetworkError {
    /// Wrap an authenticator error.
    pub fn auth(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Auth(Arc::new(error))
    }

    /// HTTP status of a remote failure.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Remote { status, .. } => Some(*status),
            Self::RetryLimitExceeded { last, .. } => last.status(),
            _ => None,
        }
    }

    /// Check if this is a remote (HTTP) failure.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote { .. })
    }

    /// Check if this failure happened before any response arrived.
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }

    /// Body of a remote failure.
    pub fn body(&self) -> Option<&[u8]> {
        match self {
            Self::Remote { body, .. } => Some(body),
            _ => None,
        }
    }

    /// Decode the body of a remote failure into a domain error type.
    ///
    /// Returns `None` for any other kind of error.
    pub fn decode_remote<E: DeserializeOwned>(&self) -> Option<Result<E, NetworkError>> {
        self.body()
            .map(|body| serde_json::from_slice(body).map_err(NetworkError::from))
    }
}

impl From<serde_json::Error> for NetworkError {
    fn from(e: serde_json::Error) -> Self {
        NetworkError::Decoding(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_remote_status() {
        let err = NetworkError::Remote {
            status: 404,
            body: b"missing".to_vec(),
        };
        assert!(err.is_remote());
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.body(), Some(&b"missing"[..]));
    }

    #[test]
    fn test_local_has_no_status() {
        let err = NetworkError::from(LocalError::connection("reset by peer"));
        assert!(err.is_local());
        assert!(!err.is_remote());
        assert_eq!(err.status(), None);
        assert_eq!(err.to_string(), "local error: connection error: reset by peer");
    }

    #[test]
    fn test_decode_remote_body() {
        #[derive(Deserialize)]
        struct ApiError {
            code: String,
        }

        let err = NetworkError::Remote {
            status: 422,
            body: br#"{"code":"out_of_stock"}"#.to_vec(),
        };
        let decoded: ApiError = err.decode_remote().unwrap().unwrap();
        assert_eq!(decoded.code, "out_of_stock");

        assert!(NetworkError::Cancelled.decode_remote::<ApiError>().is_none());
    }

    #[test]
    fn test_auth_error_keeps_source() {
        #[derive(Debug, Error)]
        #[error("refresh token revoked")]
        struct Revoked;

        let err = NetworkError::auth(Revoked);
        match &err {
            NetworkError::Auth(source) => assert!(source.downcast_ref::<Revoked>().is_some()),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.to_string(), "authentication error: refresh token revoked");
    }

    #[test]
    fn test_retry_limit_reports_last_status() {
        let err = NetworkError::RetryLimitExceeded {
            attempts: 3,
            last: Box::new(NetworkError::Remote {
                status: 503,
                body: Vec::new(),
            }),
        };
        assert_eq!(err.status(), Some(503));
        assert!(!err.is_remote());
    }
}
