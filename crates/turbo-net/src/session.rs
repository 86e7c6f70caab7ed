//! Session: owns the transport and serializes task bookkeeping.
//!
//! Every registry mutation happens on one spawned loop that receives
//! [`Command`]s over a channel. Callers and transports only ever send
//! messages; nobody else touches the task map.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::{
    DefaultInterceptor, Endpoint, Interceptor, NetworkError, ProxyError, Request, Response,
    RetryDecision, SessionConfig, TaskId, TaskProxy, Transport, TransportEvent, TransportSink,
};

/// Messages handled by the registry loop.
#[derive(Debug)]
pub(crate) enum Command {
    /// Hand the proxy for a task to the caller waiting on it.
    Claim {
        task: TaskId,
        reply: oneshot::Sender<Arc<TaskProxy>>,
    },
    /// A transport reported progress.
    Event(TransportEvent),
    /// The caller stopped waiting.
    Abandon(TaskId),
}

#[derive(Debug)]
struct RegistryEntry {
    proxy: Arc<TaskProxy>,
    claimed: bool,
}

/// Number of retired task ids the registry remembers.
const RETIRED_WINDOW: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Retired {
    /// Claimed and terminal.
    Finished,
    /// The caller went away; the transport may or may not still report.
    Abandoned,
}

/// Task-id → proxy map, owned by the registry loop.
///
/// Proxies are created on first touch, whichever arrives first: the
/// transport's first event or the caller's claim. An entry is dropped once
/// it is both terminal and claimed, or when its caller abandons it, and the
/// id moves into a bounded window of retired ids. Events for retired ids
/// never recreate an entry.
#[derive(Debug, Default)]
struct Registry {
    entries: HashMap<TaskId, RegistryEntry>,
    retired: HashMap<TaskId, Retired>,
    // Oldest first.
    retired_order: VecDeque<TaskId>,
}

impl Registry {
    fn entry(&mut self, task: TaskId) -> &mut RegistryEntry {
        self.entries.entry(task).or_insert_with(|| RegistryEntry {
            proxy: Arc::new(TaskProxy::new(task)),
            claimed: false,
        })
    }

    fn retire(&mut self, task: TaskId, reason: Retired) {
        self.entries.remove(&task);
        if self.retired.insert(task, reason).is_some() {
            return;
        }
        self.retired_order.push_back(task);
        if self.retired_order.len() > RETIRED_WINDOW {
            if let Some(oldest) = self.retired_order.pop_front() {
                self.retired.remove(&oldest);
            }
        }
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Claim { task, reply } => {
                let entry = self.entry(task);
                entry.claimed = true;
                let proxy = entry.proxy.clone();
                if proxy.is_terminal() {
                    self.retire(task, Retired::Finished);
                }
                if reply.send(proxy).is_err() {
                    debug!(%task, "claimant went away");
                }
            }
            Command::Event(event) => self.on_event(event),
            Command::Abandon(task) => {
                if let Some(entry) = self.entries.get(&task) {
                    let _ = entry.proxy.fail(NetworkError::Cancelled);
                }
                self.retire(task, Retired::Abandoned);
            }
        }
    }

    fn on_event(&mut self, event: TransportEvent) {
        let task = event.task();
        match self.retired.get(&task) {
            Some(Retired::Abandoned) => {
                debug!(%task, "discarding event for abandoned task");
                return;
            }
            Some(Retired::Finished) => {
                warn!(%task, error = %ProxyError::Terminal(task), "dropping transport event");
                return;
            }
            None => {}
        }

        let entry = self.entry(task);
        let accepted = match event {
            TransportEvent::Response {
                status, headers, ..
            } => entry.proxy.on_response(status, headers),
            TransportEvent::Data { chunk, .. } => entry.proxy.append(&chunk),
            TransportEvent::Complete { error, .. } => entry.proxy.complete(error),
        };
        if let Err(e) = accepted {
            warn!(%task, error = %e, "dropping transport event");
        }
        if entry.claimed && entry.proxy.is_terminal() {
            self.retire(task, Retired::Finished);
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

async fn run_registry(mut commands: mpsc::UnboundedReceiver<Command>) {
    let mut registry = Registry::default();
    while let Some(command) = commands.recv().await {
        registry.handle(command);
    }
    debug!(pending = registry.len(), "session registry closed");
}

/// Builder for [`Session`].
pub struct SessionBuilder {
    transport: Arc<dyn Transport>,
    base_url: String,
    interceptor: Arc<dyn Interceptor>,
    max_retries: Option<u32>,
}

impl SessionBuilder {
    /// Set the base URL relative endpoint paths resolve against.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the interceptor consulted on every attempt.
    pub fn with_interceptor(mut self, interceptor: impl Interceptor + 'static) -> Self {
        self.interceptor = Arc::new(interceptor);
        self
    }

    /// Set an already shared interceptor.
    pub fn with_shared_interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptor = interceptor;
        self
    }

    /// Cap the number of retries per request.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Build the session and start its registry loop.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Session {
        let (commands, receiver) = mpsc::unbounded_channel();
        tokio::spawn(run_registry(receiver));

        Session {
            inner: Arc::new(Inner {
                transport: self.transport,
                base_url: self.base_url,
                interceptor: self.interceptor,
                max_retries: self.max_retries,
                commands,
            }),
        }
    }
}

struct Inner {
    transport: Arc<dyn Transport>,
    base_url: String,
    interceptor: Arc<dyn Interceptor>,
    max_retries: Option<u32>,
    commands: mpsc::UnboundedSender<Command>,
}

/// Turns endpoints into results over one exclusively owned transport.
///
/// Cheap to clone; clones share the transport and registry.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    /// Start building a session over `transport`.
    pub fn builder(transport: impl Transport + 'static) -> SessionBuilder {
        Self::builder_shared(Arc::new(transport))
    }

    /// Start building a session over a shared transport.
    pub fn builder_shared(transport: Arc<dyn Transport>) -> SessionBuilder {
        SessionBuilder {
            transport,
            base_url: String::new(),
            interceptor: Arc::new(DefaultInterceptor),
            max_retries: None,
        }
    }

    /// Build a session from configuration, using the interceptor chain the
    /// config describes.
    pub fn from_config(transport: impl Transport + 'static, config: &SessionConfig) -> Self {
        let mut builder = Self::builder(transport)
            .with_base_url(config.base_url.clone())
            .with_interceptor(config.interceptor());
        if let Some(max) = config.max_retries {
            builder = builder.with_max_retries(max);
        }
        builder.build()
    }

    /// The base URL.
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// Perform `endpoint` and decode the JSON body.
    ///
    /// Non-2xx responses surface as [`NetworkError::Remote`] before any
    /// decoding is attempted; decoding failures are never retried.
    pub async fn request<T: DeserializeOwned>(&self, endpoint: &Endpoint) -> Result<T, NetworkError> {
        self.response(endpoint).await?.json()
    }

    /// Perform `endpoint` and return the raw body.
    pub async fn data(&self, endpoint: &Endpoint) -> Result<Vec<u8>, NetworkError> {
        Ok(self.response(endpoint).await?.into_body())
    }

    /// Perform `endpoint`, retrying as the interceptor decides.
    pub async fn response(&self, endpoint: &Endpoint) -> Result<Response, NetworkError> {
        let request = endpoint.to_request(&self.inner.base_url)?;
        let mut retries = 0u32;

        loop {
            let adapted = self.inner.interceptor.adapt(request.clone()).await?;
            let error = match self.perform(adapted.clone()).await {
                Ok(response) => return Ok(response),
                Err(NetworkError::Cancelled) => return Err(NetworkError::Cancelled),
                Err(error) => error,
            };

            let decision = self
                .inner
                .interceptor
                .retry(&adapted, &error, retries)
                .await?;
            if decision == RetryDecision::DoNotRetry {
                return Err(error);
            }
            if self.inner.max_retries.is_some_and(|max| retries >= max) {
                warn!(url = %adapted.url, attempts = retries + 1, "retry limit reached");
                return Err(NetworkError::RetryLimitExceeded {
                    attempts: retries + 1,
                    last: Box::new(error),
                });
            }

            retries += 1;
            info!(url = %adapted.url, retry = retries, error = %error, ?decision, "retrying request");
            if let RetryDecision::RetryAfter(delay) = decision {
                tokio::time::sleep(delay).await;
            }
        }
    }

    /// Submit one attempt and wait for its proxy to settle.
    async fn perform(&self, request: Request) -> Result<Response, NetworkError> {
        let method = request.method;
        let url = request.url.clone();
        let sink = TransportSink::new(self.inner.commands.clone());
        let task = self.inner.transport.submit(request, sink)?;
        debug!(%task, %method, %url, "task submitted");

        let mut in_flight = InFlight {
            inner: &self.inner,
            task,
            armed: true,
        };
        let proxy = self.claim(task).await?;
        let outcome = proxy.result().await;
        in_flight.armed = false;

        match &outcome {
            Ok(response) => debug!(%task, status = response.status, "task finished"),
            Err(error) => debug!(%task, %error, "task failed"),
        }
        outcome
    }

    async fn claim(&self, task: TaskId) -> Result<Arc<TaskProxy>, NetworkError> {
        let (reply, receiver) = oneshot::channel();
        self.inner
            .commands
            .send(Command::Claim { task, reply })
            .map_err(|_| NetworkError::Cancelled)?;
        receiver.await.map_err(|_| NetworkError::Cancelled)
    }
}

/// Cancels the transport task if the caller stops waiting mid-flight.
struct InFlight<'a> {
    inner: &'a Inner,
    task: TaskId,
    armed: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.armed {
            debug!(task = %self.task, "request dropped; cancelling task");
            self.inner.transport.cancel(self.task);
            let _ = self.inner.commands.send(Command::Abandon(self.task));
        }
    }
}
