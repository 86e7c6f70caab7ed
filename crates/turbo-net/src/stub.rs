//! In-memory transport (for development/testing).

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;

use crate::{LocalError, NetworkError, Request, TaskId, Transport, TransportSink};

/// Scripted reply for one submitted request.
#[derive(Debug, Clone)]
pub enum StubReply {
    /// Deliver a response.
    Respond {
        status: u16,
        headers: HashMap<String, String>,
        body: Vec<u8>,
    },
    /// Fail at the transport level.
    Fail(LocalError),
}

impl StubReply {
    /// A response with the given status and body.
    pub fn status(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self::Respond {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    /// A JSON response.
    pub fn json<T: Serialize + ?Sized>(status: u16, value: &T) -> Self {
        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        Self::Respond {
            status,
            headers,
            body: serde_json::to_vec(value).unwrap_or_default(),
        }
    }

    /// A transport failure.
    pub fn fail(error: LocalError) -> Self {
        Self::Fail(error)
    }
}

type Handler = Box<dyn Fn(&Request) -> StubReply + Send + Sync>;

/// Transport that answers from a script instead of the network.
///
/// Replies are delivered from a spawned task, after an optional latency, as
/// a response head followed by body chunks and a completion, the same event
/// shape a real transport produces. Cancelling a task aborts its delivery,
/// so a cancelled task never reports completion.
pub struct StubTransport {
    handler: Handler,
    latency: Duration,
    chunk_size: usize,
    next_id: AtomicU64,
    submitted: AtomicUsize,
    requests: Mutex<Vec<Request>>,
    cancelled: Mutex<Vec<TaskId>>,
    deliveries: Mutex<HashMap<TaskId, JoinHandle<()>>>,
}

impl StubTransport {
    /// Answer every request with `handler`.
    pub fn new(handler: impl Fn(&Request) -> StubReply + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            latency: Duration::ZERO,
            chunk_size: 16,
            next_id: AtomicU64::new(1),
            submitted: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
            deliveries: Mutex::new(HashMap::new()),
        }
    }

    /// Answer requests with `replies` in order, repeating the last one once
    /// the script runs out.
    pub fn sequence(replies: Vec<StubReply>) -> Self {
        let script = Mutex::new(VecDeque::from(replies));
        Self::new(move |_| {
            let mut script = script.lock().unwrap_or_else(PoisonError::into_inner);
            match script.len() {
                0 => StubReply::fail(LocalError::transport("stub script is empty")),
                1 => script[0].clone(),
                _ => script
                    .pop_front()
                    .unwrap_or_else(|| StubReply::fail(LocalError::transport("unreachable"))),
            }
        })
    }

    /// Delay every reply.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Split bodies into chunks of this size.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Number of requests submitted so far.
    pub fn submissions(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }

    /// Requests submitted so far, in order.
    pub fn requests(&self) -> Vec<Request> {
        lock(&self.requests).clone()
    }

    /// Tasks the session cancelled.
    pub fn cancelled(&self) -> Vec<TaskId> {
        lock(&self.cancelled).clone()
    }
}

impl Transport for StubTransport {
    fn submit(&self, request: Request, sink: TransportSink) -> Result<TaskId, NetworkError> {
        let task = TaskId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.submitted.fetch_add(1, Ordering::SeqCst);
        let reply = (self.handler)(&request);
        lock(&self.requests).push(request);

        let latency = self.latency;
        let chunk_size = self.chunk_size;
        let delivery = tokio::spawn(async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            match reply {
                StubReply::Respond {
                    status,
                    headers,
                    body,
                } => {
                    sink.response(task, status, headers);
                    for chunk in body.chunks(chunk_size) {
                        sink.data(task, chunk.to_vec());
                    }
                    sink.complete(task, None);
                }
                StubReply::Fail(error) => sink.complete(task, Some(error)),
            }
        });

        let mut deliveries = lock(&self.deliveries);
        deliveries.retain(|_, handle| !handle.is_finished());
        deliveries.insert(task, delivery);
        Ok(task)
    }

    fn cancel(&self, task: TaskId) {
        lock(&self.cancelled).push(task);
        if let Some(delivery) = lock(&self.deliveries).remove(&task) {
            delivery.abort();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
