//! Request adapters, retriers and their composition.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::{NetworkError, Request};

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Surface the error to the caller.
    DoNotRetry,
    /// Adapt and resubmit immediately.
    Retry,
    /// Adapt and resubmit after at least the given delay.
    RetryAfter(Duration),
}

impl RetryDecision {
    /// Check if this decision asks for another attempt.
    pub fn should_retry(&self) -> bool {
        !matches!(self, Self::DoNotRetry)
    }
}

/// Mutates outgoing requests.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Adapt `request` before it is handed to the transport.
    async fn adapt(&self, request: Request) -> Result<Request, NetworkError>;
}

/// Decides whether a failed request should be retried.
#[async_trait]
pub trait Retrier: Send + Sync {
    /// Inspect a failed attempt.
    ///
    /// `attempt` counts the retries already performed for this request
    /// (zero on the first failure). Returning an error aborts the request
    /// with that error.
    async fn retry(
        &self,
        request: &Request,
        error: &NetworkError,
        attempt: u32,
    ) -> Result<RetryDecision, NetworkError>;
}

/// Both roles at once.
pub trait Interceptor: Adapter + Retrier {}

impl<T: Adapter + Retrier + ?Sized> Interceptor for T {}

/// No-op adapter that never retries. Retrying is opt-in.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultInterceptor;

#[async_trait]
impl Adapter for DefaultInterceptor {
    async fn adapt(&self, request: Request) -> Result<Request, NetworkError> {
        Ok(request)
    }
}

#[async_trait]
impl Retrier for DefaultInterceptor {
    async fn retry(
        &self,
        _request: &Request,
        _error: &NetworkError,
        _attempt: u32,
    ) -> Result<RetryDecision, NetworkError> {
        Ok(RetryDecision::DoNotRetry)
    }
}

/// Adds a fixed set of headers to every request, without overriding
/// headers the endpoint already set.
#[derive(Debug, Clone, Default)]
pub struct DefaultHeaders {
    headers: HashMap<String, String>,
}

impl DefaultHeaders {
    /// Create an empty header set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

#[async_trait]
impl Adapter for DefaultHeaders {
    async fn adapt(&self, mut request: Request) -> Result<Request, NetworkError> {
        for (key, value) in &self.headers {
            if request.header_value(key).is_none() {
                request = request.header(key.clone(), value.clone());
            }
        }
        Ok(request)
    }
}

/// Ordered composition of adapters, retriers and full interceptors.
///
/// `adapt` runs the explicit adapters, then the interceptors, in declaration
/// order; the first error aborts. `retry` runs the explicit retriers, then
/// the interceptors; the first decision other than
/// [`RetryDecision::DoNotRetry`] wins.
#[derive(Clone, Default)]
pub struct CompositeInterceptor {
    adapters: Vec<Arc<dyn Adapter>>,
    retriers: Vec<Arc<dyn Retrier>>,
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl CompositeInterceptor {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an adapter.
    pub fn with_adapter(mut self, adapter: impl Adapter + 'static) -> Self {
        self.adapters.push(Arc::new(adapter));
        self
    }

    /// Append a retrier.
    pub fn with_retrier(mut self, retrier: impl Retrier + 'static) -> Self {
        self.retriers.push(Arc::new(retrier));
        self
    }

    /// Append an interceptor.
    pub fn with_interceptor(mut self, interceptor: impl Interceptor + 'static) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Append an already shared interceptor.
    pub fn with_shared_interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }
}

#[async_trait]
impl Adapter for CompositeInterceptor {
    async fn adapt(&self, mut request: Request) -> Result<Request, NetworkError> {
        for adapter in &self.adapters {
            request = adapter.adapt(request).await?;
        }
        for interceptor in &self.interceptors {
            request = interceptor.adapt(request).await?;
        }
        Ok(request)
    }
}

#[async_trait]
impl Retrier for CompositeInterceptor {
    async fn retry(
        &self,
        request: &Request,
        error: &NetworkError,
        attempt: u32,
    ) -> Result<RetryDecision, NetworkError> {
        for retrier in &self.retriers {
            let decision = retrier.retry(request, error, attempt).await?;
            if decision.should_retry() {
                return Ok(decision);
            }
        }
        for interceptor in &self.interceptors {
            let decision = interceptor.retry(request, error, attempt).await?;
            if decision.should_retry() {
                return Ok(decision);
            }
        }
        Ok(RetryDecision::DoNotRetry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Method;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use url::Url;

    fn request() -> Request {
        Request::new(Method::Get, Url::parse("https://api.example.com/").unwrap())
    }

    struct Tag {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Adapter for Tag {
        async fn adapt(&self, request: Request) -> Result<Request, NetworkError> {
            self.log.lock().unwrap().push(self.name);
            Ok(request)
        }
    }

    #[async_trait]
    impl Retrier for Tag {
        async fn retry(
            &self,
            _request: &Request,
            _error: &NetworkError,
            _attempt: u32,
        ) -> Result<RetryDecision, NetworkError> {
            self.log.lock().unwrap().push(self.name);
            Ok(RetryDecision::DoNotRetry)
        }
    }

    struct Fixed {
        decision: RetryDecision,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Retrier for Fixed {
        async fn retry(
            &self,
            _request: &Request,
            _error: &NetworkError,
            _attempt: u32,
        ) -> Result<RetryDecision, NetworkError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.decision)
        }
    }

    struct Reject;

    #[async_trait]
    impl Adapter for Reject {
        async fn adapt(&self, _request: Request) -> Result<Request, NetworkError> {
            Err(NetworkError::MissingLocalData)
        }
    }

    fn fixed(decision: RetryDecision) -> (Fixed, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Fixed {
                decision,
                calls: calls.clone(),
            },
            calls,
        )
    }

    #[tokio::test]
    async fn test_default_interceptor_is_inert() {
        let req = request();
        assert_eq!(DefaultInterceptor.adapt(req.clone()).await.unwrap(), req);
        let decision = DefaultInterceptor
            .retry(&req, &NetworkError::Cancelled, 0)
            .await
            .unwrap();
        assert_eq!(decision, RetryDecision::DoNotRetry);
    }

    #[tokio::test]
    async fn test_adapters_run_before_interceptors_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let tag = |name| Tag {
            name,
            log: log.clone(),
        };
        let chain = CompositeInterceptor::new()
            .with_interceptor(tag("interceptor"))
            .with_adapter(tag("first"))
            .with_adapter(tag("second"));

        chain.adapt(request()).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "interceptor"]);
    }

    #[tokio::test]
    async fn test_adapter_error_aborts_chain() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = CompositeInterceptor::new()
            .with_adapter(Reject)
            .with_adapter(Tag {
                name: "never",
                log: log.clone(),
            });

        let err = chain.adapt(request()).await.unwrap_err();
        assert!(matches!(err, NetworkError::MissingLocalData));
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_first_retry_decision_wins() {
        let (first, first_calls) = fixed(RetryDecision::DoNotRetry);
        let (second, second_calls) = fixed(RetryDecision::Retry);
        let (third, third_calls) = fixed(RetryDecision::RetryAfter(Duration::from_secs(1)));
        let chain = CompositeInterceptor::new()
            .with_retrier(first)
            .with_retrier(second)
            .with_retrier(third);

        let decision = chain
            .retry(&request(), &NetworkError::Cancelled, 0)
            .await
            .unwrap();
        assert_eq!(decision, RetryDecision::Retry);
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 1);
        assert_eq!(third_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_retriers_run_before_interceptors() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (retrier, _) = fixed(RetryDecision::DoNotRetry);
        let chain = CompositeInterceptor::new()
            .with_interceptor(Tag {
                name: "interceptor",
                log: log.clone(),
            })
            .with_retrier(retrier);

        let decision = chain
            .retry(&request(), &NetworkError::Cancelled, 0)
            .await
            .unwrap();
        assert_eq!(decision, RetryDecision::DoNotRetry);
        assert_eq!(*log.lock().unwrap(), vec!["interceptor"]);
    }

    #[tokio::test]
    async fn test_default_headers_do_not_override() {
        let adapter = DefaultHeaders::new()
            .with_header("Accept", "application/json")
            .with_header("X-Client", "turbo");
        let req = request().header("x-client", "ios");

        let adapted = adapter.adapt(req).await.unwrap();
        assert_eq!(adapted.header_value("Accept"), Some("application/json"));
        assert_eq!(adapted.header_value("X-Client"), Some("ios"));
    }
}
