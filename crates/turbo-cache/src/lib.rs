//! Request deduplication for TurboCommerce clients.
//!
//! Concurrent requests for the same endpoint share one execution, and a
//! successful result stays visible for a short TTL.
//!
//! # Example
//!
//! ```rust,ignore
//! use turbo_cache::SingleFlightCache;
//! use turbo_net::Endpoint;
//!
//! let cache: SingleFlightCache<Vec<Product>> = SingleFlightCache::new();
//!
//! // Both calls share one network request.
//! let (a, b) = tokio::join!(
//!     cache.fetch(&Endpoint::get("products"), &session),
//!     cache.fetch(&Endpoint::get("products"), &session),
//! );
//! ```

mod single_flight;

pub use single_flight::{CacheConfig, SingleFlightCache};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{CacheConfig, SingleFlightCache};
}
