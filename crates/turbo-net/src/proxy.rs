//! Task proxies: push-style transport events in, one awaitable result out.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::oneshot;

use crate::{LocalError, NetworkError, Response, TaskId};

/// Terminal value of a task.
pub type Outcome = Result<Response, NetworkError>;

/// Lifecycle phase of a [`TaskProxy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyPhase {
    /// Submitted, nothing received yet.
    Idle,
    /// Response head or body data has arrived.
    Receiving,
    /// Completed; the outcome is fixed.
    Terminal,
}

/// Transport events that arrived out of contract.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProxyError {
    /// The task already reached a terminal state.
    #[error("{0} is already terminal")]
    Terminal(TaskId),
}

#[derive(Debug)]
struct Head {
    status: u16,
    headers: HashMap<String, String>,
}

#[derive(Debug)]
enum State {
    Idle,
    Receiving { head: Option<Head>, buffer: Vec<u8> },
    Terminal(Outcome),
}

#[derive(Debug)]
struct Inner {
    state: State,
    waiter: Option<oneshot::Sender<Outcome>>,
}

/// Bridges the events of one transport task into a single awaitable result.
///
/// Only one caller may wait at a time. Once terminal, every call to
/// [`result`](Self::result) returns the same value without touching the
/// transport again.
#[derive(Debug)]
pub struct TaskProxy {
    task: TaskId,
    inner: Mutex<Inner>,
}

impl TaskProxy {
    /// Create an idle proxy for `task`.
    pub fn new(task: TaskId) -> Self {
        Self {
            task,
            inner: Mutex::new(Inner {
                state: State::Idle,
                waiter: None,
            }),
        }
    }

    /// The transport task this proxy tracks.
    pub fn task(&self) -> TaskId {
        self.task
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> ProxyPhase {
        match self.lock().state {
            State::Idle => ProxyPhase::Idle,
            State::Receiving { .. } => ProxyPhase::Receiving,
            State::Terminal(_) => ProxyPhase::Terminal,
        }
    }

    /// Check if the proxy has reached its terminal state.
    pub fn is_terminal(&self) -> bool {
        self.phase() == ProxyPhase::Terminal
    }

    /// Record the status line and headers.
    pub fn on_response(
        &self,
        status: u16,
        headers: HashMap<String, String>,
    ) -> Result<(), ProxyError> {
        let mut inner = self.lock();
        let head = Some(Head { status, headers });
        match &mut inner.state {
            State::Terminal(_) => return Err(ProxyError::Terminal(self.task)),
            State::Receiving { head: slot, .. } => *slot = head,
            state @ State::Idle => {
                *state = State::Receiving {
                    head,
                    buffer: Vec::new(),
                }
            }
        }
        Ok(())
    }

    /// Append a body chunk.
    pub fn append(&self, chunk: &[u8]) -> Result<(), ProxyError> {
        let mut inner = self.lock();
        match &mut inner.state {
            State::Terminal(_) => return Err(ProxyError::Terminal(self.task)),
            State::Receiving { buffer, .. } => buffer.extend_from_slice(chunk),
            state @ State::Idle => {
                *state = State::Receiving {
                    head: None,
                    buffer: chunk.to_vec(),
                }
            }
        }
        Ok(())
    }

    /// Transition to terminal, classifying the outcome.
    ///
    /// A transport error becomes [`NetworkError::Local`], a non-2xx status
    /// becomes [`NetworkError::Remote`] carrying the buffered body, and a
    /// completion without any response head is
    /// [`NetworkError::MissingRemoteData`].
    pub fn complete(&self, error: Option<LocalError>) -> Result<(), ProxyError> {
        let mut inner = self.lock();
        let state = std::mem::replace(&mut inner.state, State::Idle);
        let outcome = match (state, error) {
            (State::Terminal(outcome), _) => {
                inner.state = State::Terminal(outcome);
                return Err(ProxyError::Terminal(self.task));
            }
            (_, Some(error)) => Err(NetworkError::Local(error)),
            (State::Idle, None) | (State::Receiving { head: None, .. }, None) => {
                Err(NetworkError::MissingRemoteData)
            }
            (
                State::Receiving {
                    head: Some(head),
                    buffer,
                },
                None,
            ) => Response::new(head.status, head.headers, buffer).error_for_status(),
        };
        Self::finish(&mut inner, outcome);
        Ok(())
    }

    /// Transition to terminal with an error decided outside the transport.
    pub fn fail(&self, error: NetworkError) -> Result<(), ProxyError> {
        let mut inner = self.lock();
        if matches!(inner.state, State::Terminal(_)) {
            return Err(ProxyError::Terminal(self.task));
        }
        Self::finish(&mut inner, Err(error));
        Ok(())
    }

    /// Wait for the terminal outcome.
    ///
    /// # Panics
    ///
    /// Panics if another caller is already waiting on this proxy.
    pub async fn result(&self) -> Outcome {
        let receiver = {
            let mut inner = self.lock();
            if let State::Terminal(outcome) = &inner.state {
                return outcome.clone();
            }
            if inner.waiter.as_ref().is_some_and(|w| !w.is_closed()) {
                panic!("{} already has a waiter", self.task);
            }
            let (tx, rx) = oneshot::channel();
            inner.waiter = Some(tx);
            rx
        };

        receiver.await.unwrap_or(Err(NetworkError::Cancelled))
    }

    /// Wait for the terminal outcome and return only the raw body.
    pub async fn data(&self) -> Result<Vec<u8>, NetworkError> {
        self.result().await.map(Response::into_body)
    }

    fn finish(inner: &mut Inner, outcome: Outcome) {
        if let Some(waiter) = inner.waiter.take() {
            // The waiter may have been cancelled; the outcome stays readable.
            let _ = waiter.send(outcome.clone());
        }
        inner.state = State::Terminal(outcome);
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::Arc;

    fn proxy() -> Arc<TaskProxy> {
        Arc::new(TaskProxy::new(TaskId(7)))
    }

    #[tokio::test]
    async fn test_success_assembles_chunks() {
        let proxy = proxy();
        assert_eq!(proxy.phase(), ProxyPhase::Idle);

        proxy.on_response(200, HashMap::new()).unwrap();
        proxy.append(b"hello ").unwrap();
        proxy.append(b"world").unwrap();
        assert_eq!(proxy.phase(), ProxyPhase::Receiving);

        proxy.complete(None).unwrap();
        let response = proxy.result().await.unwrap();
        assert_eq!(response.body, b"hello world");
        assert_eq!(proxy.phase(), ProxyPhase::Terminal);
    }

    #[tokio::test]
    async fn test_waiter_resumed_on_completion() {
        let proxy = proxy();
        let waiter = tokio::spawn({
            let proxy = proxy.clone();
            async move { proxy.data().await }
        });
        tokio::task::yield_now().await;

        proxy.on_response(201, HashMap::new()).unwrap();
        proxy.append(b"ok").unwrap();
        proxy.complete(None).unwrap();

        assert_eq!(waiter.await.unwrap().unwrap(), b"ok");
    }

    #[tokio::test]
    async fn test_non_2xx_is_remote_with_body() {
        let proxy = proxy();
        proxy.on_response(401, HashMap::new()).unwrap();
        proxy.append(b"expired").unwrap();
        proxy.complete(None).unwrap();

        let err = proxy.result().await.unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert_eq!(err.body(), Some(&b"expired"[..]));
    }

    #[tokio::test]
    async fn test_transport_error_is_local() {
        let proxy = proxy();
        proxy.append(b"partial").unwrap();
        proxy
            .complete(Some(LocalError::connection("reset")))
            .unwrap();
        assert!(proxy.result().await.unwrap_err().is_local());
    }

    #[tokio::test]
    async fn test_completion_without_response_is_missing_data() {
        let proxy = proxy();
        proxy.complete(None).unwrap();
        assert!(matches!(
            proxy.result().await,
            Err(NetworkError::MissingRemoteData)
        ));
    }

    #[tokio::test]
    async fn test_terminal_result_is_idempotent() {
        let proxy = proxy();
        proxy.on_response(200, HashMap::new()).unwrap();
        proxy.append(b"v1").unwrap();
        proxy.complete(None).unwrap();

        let first = proxy.result().await.unwrap();
        let second = proxy.result().await.unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_events_after_terminal_rejected() {
        let proxy = proxy();
        proxy.on_response(200, HashMap::new()).unwrap();
        proxy.complete(None).unwrap();

        assert_eq!(proxy.append(b"late"), Err(ProxyError::Terminal(TaskId(7))));
        assert_eq!(
            proxy.on_response(500, HashMap::new()),
            Err(ProxyError::Terminal(TaskId(7)))
        );
        assert_eq!(proxy.complete(None), Err(ProxyError::Terminal(TaskId(7))));
        assert_eq!(
            proxy.fail(NetworkError::Cancelled),
            Err(ProxyError::Terminal(TaskId(7)))
        );
    }

    #[tokio::test]
    async fn test_second_concurrent_waiter_panics() {
        let proxy = proxy();
        let first = proxy.result();
        futures::pin_mut!(first);
        assert!(futures::poll!(first.as_mut()).is_pending());

        let second = std::panic::AssertUnwindSafe(proxy.result())
            .catch_unwind()
            .await;
        assert!(second.is_err());

        proxy.fail(NetworkError::Cancelled).unwrap();
        assert!(matches!(first.await, Err(NetworkError::Cancelled)));
    }

    #[tokio::test]
    async fn test_abandoned_waiter_can_be_replaced() {
        let proxy = proxy();
        {
            let abandoned = proxy.result();
            futures::pin_mut!(abandoned);
            assert!(futures::poll!(abandoned.as_mut()).is_pending());
        }

        proxy.on_response(200, HashMap::new()).unwrap();
        let waiter = tokio::spawn({
            let proxy = proxy.clone();
            async move { proxy.result().await }
        });
        tokio::task::yield_now().await;
        proxy.complete(None).unwrap();
        assert!(waiter.await.unwrap().is_ok());
    }
}
