//! HTTP transport backed by reqwest.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::debug;
use turbo_net::{LocalError, NetworkError, Request, TaskId, Transport, TransportSink};

/// Issues requests with a shared `reqwest::Client`, streaming body chunks
/// back to the session as they arrive.
pub struct ReqwestTransport {
    client: reqwest::Client,
    next_id: AtomicU64,
    submitted: AtomicUsize,
    tasks: Mutex<HashMap<TaskId, JoinHandle<()>>>,
}

impl ReqwestTransport {
    /// Create a transport whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("turbo-fetch/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            next_id: AtomicU64::new(1),
            submitted: AtomicUsize::new(0),
            tasks: Mutex::new(HashMap::new()),
        })
    }

    /// Number of requests put on the wire.
    pub fn submissions(&self) -> usize {
        self.submitted.load(Ordering::Relaxed)
    }

    fn tasks(&self) -> MutexGuard<'_, HashMap<TaskId, JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Transport for ReqwestTransport {
    fn submit(&self, request: Request, sink: TransportSink) -> Result<TaskId, NetworkError> {
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| LocalError::transport(e.to_string()))?;

        let mut builder = self.client.request(method, request.url);
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let task = TaskId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.submitted.fetch_add(1, Ordering::Relaxed);
        let handle = tokio::spawn(deliver(task, builder, sink));

        let mut tasks = self.tasks();
        tasks.retain(|_, handle| !handle.is_finished());
        tasks.insert(task, handle);
        Ok(task)
    }

    fn cancel(&self, task: TaskId) {
        if let Some(handle) = self.tasks().remove(&task) {
            debug!(%task, "aborting request");
            handle.abort();
        }
    }
}

async fn deliver(task: TaskId, builder: reqwest::RequestBuilder, sink: TransportSink) {
    let response = match builder.send().await {
        Ok(response) => response,
        Err(e) => {
            sink.complete(task, Some(classify(&e)));
            return;
        }
    };

    let headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            let value = value.to_str().ok()?;
            Some((name.as_str().to_string(), value.to_string()))
        })
        .collect();
    sink.response(task, response.status().as_u16(), headers);

    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(bytes) => sink.data(task, bytes.to_vec()),
            Err(e) => {
                sink.complete(task, Some(classify(&e)));
                return;
            }
        }
    }
    sink.complete(task, None);
}

fn classify(error: &reqwest::Error) -> LocalError {
    if error.is_timeout() {
        LocalError::timeout(error.to_string())
    } else if error.is_connect() {
        LocalError::connection(error.to_string())
    } else if error.is_builder() {
        LocalError::invalid_url(error.to_string())
    } else {
        LocalError::transport(error.to_string())
    }
}
