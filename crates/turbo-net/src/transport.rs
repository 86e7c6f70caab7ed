//! Transport boundary.
//!
//! A transport issues exactly one request per `submit` call and reports
//! progress by pushing events into a [`TransportSink`]. It never sees task
//! proxies or retry logic; those belong to the [`Session`](crate::Session).

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::session::Command;
use crate::{LocalError, NetworkError, Request};

/// Identifier assigned by a transport to one submitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Progress reported by a transport for one task.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Status line and headers arrived.
    Response {
        task: TaskId,
        status: u16,
        headers: HashMap<String, String>,
    },
    /// A chunk of the body arrived.
    Data { task: TaskId, chunk: Vec<u8> },
    /// The task finished, successfully if `error` is `None`.
    Complete {
        task: TaskId,
        error: Option<LocalError>,
    },
}

impl TransportEvent {
    /// The task this event belongs to.
    pub fn task(&self) -> TaskId {
        match self {
            Self::Response { task, .. } | Self::Data { task, .. } | Self::Complete { task, .. } => {
                *task
            }
        }
    }
}

/// Handle a transport uses to report events back to its session.
///
/// Events are funnelled into the session's registry loop, so they may be
/// sent from any thread.
#[derive(Debug, Clone)]
pub struct TransportSink {
    commands: mpsc::UnboundedSender<Command>,
}

impl TransportSink {
    pub(crate) fn new(commands: mpsc::UnboundedSender<Command>) -> Self {
        Self { commands }
    }

    /// Report an event.
    pub fn send(&self, event: TransportEvent) {
        let task = event.task();
        if self.commands.send(Command::Event(event)).is_err() {
            tracing::debug!(%task, "session closed; dropping transport event");
        }
    }

    /// Report the status line and headers.
    pub fn response(&self, task: TaskId, status: u16, headers: HashMap<String, String>) {
        self.send(TransportEvent::Response {
            task,
            status,
            headers,
        });
    }

    /// Report a body chunk.
    pub fn data(&self, task: TaskId, chunk: Vec<u8>) {
        self.send(TransportEvent::Data { task, chunk });
    }

    /// Report completion.
    pub fn complete(&self, task: TaskId, error: Option<LocalError>) {
        self.send(TransportEvent::Complete { task, error });
    }
}

/// A primitive capable of issuing one request and reporting its progress.
pub trait Transport: Send + Sync {
    /// Start `request`, returning the identifier its events will carry.
    ///
    /// Events for the returned task may arrive before this call returns.
    fn submit(&self, request: Request, sink: TransportSink) -> Result<TaskId, NetworkError>;

    /// Stop a task the session is no longer waiting on.
    fn cancel(&self, _task: TaskId) {}
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn submit(&self, request: Request, sink: TransportSink) -> Result<TaskId, NetworkError> {
        (**self).submit(request, sink)
    }

    fn cancel(&self, task: TaskId) {
        (**self).cancel(task)
    }
}
