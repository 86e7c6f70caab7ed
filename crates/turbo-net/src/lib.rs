//! Client-side network access for TurboCommerce.
//!
//! A [`Session`] owns one [`Transport`] and turns [`Endpoint`] descriptions
//! into awaitable results. Transports report progress through callbacks
//! ([`TransportEvent`]); the session routes them to a per-task
//! [`TaskProxy`] that accumulates the body and settles exactly once.
//!
//! Outgoing requests pass through an [`Interceptor`] chain: adapters mutate
//! the request before each attempt, retriers decide what happens after a
//! failed one.
//!
//! # Example
//!
//! ```rust,ignore
//! use serde::Deserialize;
//! use turbo_net::prelude::*;
//!
//! #[derive(Deserialize)]
//! struct Product {
//!     id: String,
//!     name: String,
//! }
//!
//! let session = Session::builder(transport)
//!     .with_base_url("https://api.example.com/v1")
//!     .with_interceptor(
//!         CompositeInterceptor::new()
//!             .with_adapter(DefaultHeaders::new().with_header("Accept", "application/json"))
//!             .with_retrier(RetryPolicy::new(2)),
//!     )
//!     .build();
//!
//! let product: Product = session
//!     .request(&Endpoint::get("products/123"))
//!     .await?;
//! ```

mod config;
mod endpoint;
mod error;
mod interceptor;
mod proxy;
mod request;
mod response;
mod retry;
mod session;
mod stub;
mod transport;

pub use config::{CacheSettings, ConfigError, RetrySettings, SessionConfig, DEFAULT_CACHE_TTL};
pub use endpoint::Endpoint;
pub use error::{LocalError, LocalErrorKind, NetworkError};
pub use interceptor::{
    Adapter, CompositeInterceptor, DefaultHeaders, DefaultInterceptor, Interceptor,
    RetryDecision, Retrier,
};
pub use proxy::{Outcome, ProxyError, ProxyPhase, TaskProxy};
pub use request::{Method, Request};
pub use response::Response;
pub use retry::{BackoffStrategy, RetryCondition, RetryPolicy};
pub use session::{Session, SessionBuilder};
pub use stub::{StubReply, StubTransport};
pub use transport::{TaskId, Transport, TransportEvent, TransportSink};

/// Re-export url for transports and callers building requests by hand.
pub use url::Url;

/// Prelude for common imports.
pub mod prelude {
    pub use crate::{
        Adapter, CompositeInterceptor, DefaultHeaders, Endpoint, Interceptor, Method,
        NetworkError, Request, Response, RetryDecision, RetryPolicy, Retrier, Session,
        SessionConfig, Transport,
    };
}
