/// End-to-end refresh behaviour through a session.
///
/// The stub server accepts only the most recently issued token, so every
/// request made with an older one fails with 401.
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use turbo_auth::{
    AuthenticationInterceptor, BearerAuthenticator, BearerError, BearerToken, TokenRefresher,
};
use turbo_net::{Endpoint, NetworkError, Session, StubReply, StubTransport};

struct CountingRefresher {
    calls: AtomicU32,
    fail: bool,
}

impl CountingRefresher {
    fn new() -> Self {
        Self {
            calls: AtomicU32::new(0),
            fail: false,
        }
    }
}

#[async_trait]
impl TokenRefresher for CountingRefresher {
    async fn refresh(&self, _token: &BearerToken) -> Result<BearerToken, BearerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        if self.fail {
            return Err(BearerError::Rejected("invalid_grant".to_string()));
        }
        Ok(BearerToken::new("fresh").with_refresh_token("r2"))
    }
}

fn server() -> Arc<StubTransport> {
    Arc::new(
        StubTransport::new(|request| match request.header_value("Authorization") {
            Some("Bearer fresh") => StubReply::json(200, &serde_json::json!({"ok": true})),
            _ => StubReply::status(401, "token expired"),
        })
        .with_latency(Duration::from_millis(5)),
    )
}

#[tokio::test]
async fn concurrent_unauthorized_requests_refresh_once() {
    let transport = server();
    let interceptor = Arc::new(AuthenticationInterceptor::new(
        BearerAuthenticator::new(CountingRefresher::new())
            .with_token(BearerToken::new("stale").with_refresh_token("r1")),
    ));
    let session = Session::builder_shared(transport.clone())
        .with_base_url("https://api.example.com/")
        .with_shared_interceptor(interceptor.clone())
        .build();

    let handles: Vec<_> = (0..6)
        .map(|i| {
            let session = session.clone();
            tokio::spawn(async move {
                let endpoint = Endpoint::get(format!("orders/{i}"));
                session.request::<serde_json::Value>(&endpoint).await
            })
        })
        .collect();

    for handle in handles {
        let body = handle.await.unwrap().unwrap();
        assert_eq!(body["ok"], true);
    }

    let refresher = interceptor.authenticator().refresher();
    assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    assert_eq!(interceptor.refresh_count(), 1);
}

#[tokio::test]
async fn failed_refresh_reaches_every_caller() {
    let transport = server();
    let interceptor = Arc::new(AuthenticationInterceptor::new(
        BearerAuthenticator::new(CountingRefresher {
            calls: AtomicU32::new(0),
            fail: true,
        })
        .with_token(BearerToken::new("stale").with_refresh_token("r1")),
    ));
    let session = Session::builder_shared(transport)
        .with_base_url("https://api.example.com/")
        .with_shared_interceptor(interceptor.clone())
        .build();

    let err = session.data(&Endpoint::get("orders")).await.unwrap_err();
    match err {
        NetworkError::Auth(source) => {
            let bearer = source.downcast_ref::<BearerError>().unwrap();
            assert!(bearer.requires_sign_in());
        }
        other => panic!("unexpected error: {other:?}"),
    }

    // The store stays cleared, so the next call goes out without a token
    // and the 401 is not retried.
    let err = session.data(&Endpoint::get("orders")).await.unwrap_err();
    assert_eq!(err.status(), Some(401));
    assert_eq!(interceptor.authenticator().refresher().calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn expired_token_is_refreshed_before_sending() {
    let transport = server();
    let interceptor = Arc::new(AuthenticationInterceptor::new(
        BearerAuthenticator::new(CountingRefresher::new()).with_token(
            BearerToken::new("stale")
                .with_refresh_token("r1")
                .expires_in(Duration::from_millis(100)),
        ),
    ));
    let session = Session::builder_shared(transport.clone())
        .with_base_url("https://api.example.com/")
        .with_shared_interceptor(interceptor.clone())
        .build();

    tokio::time::advance(Duration::from_millis(150)).await;
    session.data(&Endpoint::get("me")).await.unwrap();

    assert_eq!(interceptor.refresh_count(), 1);
    assert_eq!(transport.submissions(), 1);
}
