//! Message-passing front end for the dispatcher.
//!
//! [`CompileWorker`] owns the dispatcher on its own task. A
//! [`CompilerClient`] tags every request with a fresh id and parks a
//! oneshot in the pending table; replies are matched back by id.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;

use super::{
    BackendKind, CompileFailure, CompileRequest, CompileResult, Dispatcher, FailureKind,
};

#[derive(Debug)]
pub enum WorkerRequest {
    Compile { id: u64, request: CompileRequest },
}

#[derive(Debug)]
pub enum WorkerMessage {
    /// Progress text with no request attached.
    Status { message: String },
    /// The backend now serving the session, sent ahead of a reply.
    Backend { kind: BackendKind },
    Reply { id: u64, result: CompileResult },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerStatus {
    pub message: String,
}

pub struct CompileWorker {
    dispatcher: Arc<Dispatcher>,
    requests: UnboundedReceiver<WorkerRequest>,
    replies: UnboundedSender<WorkerMessage>,
    status: UnboundedReceiver<String>,
}

impl CompileWorker {
    pub fn new(
        dispatcher: Dispatcher,
        requests: UnboundedReceiver<WorkerRequest>,
        replies: UnboundedSender<WorkerMessage>,
    ) -> Self {
        let (status_tx, status) = mpsc::unbounded_channel();
        Self {
            dispatcher: Arc::new(dispatcher.with_status(status_tx)),
            requests,
            replies,
            status,
        }
    }

    /// Serves requests until every client is gone. Compiles run
    /// concurrently; each reply carries the id of its request.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                request = self.requests.recv() => match request {
                    Some(WorkerRequest::Compile { id, request }) => {
                        let dispatcher = self.dispatcher.clone();
                        let replies = self.replies.clone();
                        tokio::spawn(async move {
                            let result = dispatcher.compile(request).await;
                            if let Some(kind) = dispatcher.active_kind().await {
                                let _ = replies.send(WorkerMessage::Backend { kind });
                            }
                            let _ = replies.send(WorkerMessage::Reply { id, result });
                        });
                    }
                    None => break,
                },
                Some(message) = self.status.recv() => {
                    let _ = self.replies.send(WorkerMessage::Status { message });
                }
            }
        }
    }
}

/// Outstanding requests keyed by id.
#[derive(Clone, Default)]
pub struct PendingRequests {
    inner: Arc<Mutex<HashMap<u64, oneshot::Sender<CompileResult>>>>,
}

impl PendingRequests {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, oneshot::Sender<CompileResult>>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn insert(&self, id: u64) -> oneshot::Receiver<CompileResult> {
        let (tx, rx) = oneshot::channel();
        self.lock().insert(id, tx);
        rx
    }

    /// Delivers `result` to the waiter for `id`. Unknown, already answered
    /// and timed-out ids are ignored.
    pub fn resolve(&self, id: u64, result: CompileResult) -> bool {
        match self.lock().remove(&id) {
            Some(tx) => tx.send(result).is_ok(),
            None => false,
        }
    }

    pub fn remove(&self, id: u64) -> bool {
        self.lock().remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone)]
pub struct CompilerClient {
    requests: UnboundedSender<WorkerRequest>,
    pending: PendingRequests,
    next_id: Arc<AtomicU64>,
    deadline_ms: Arc<AtomicU64>,
}

impl CompilerClient {
    /// Starts a worker for `dispatcher` and a client bound to it. The
    /// deadline starts from the selected backend and follows the active
    /// one once the worker reports it.
    pub fn spawn(dispatcher: Dispatcher) -> (Self, UnboundedReceiver<WorkerStatus>) {
        let deadline = dispatcher.selected_kind().deadline();
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        tokio::spawn(CompileWorker::new(dispatcher, request_rx, reply_tx).run());
        Self::connect(request_tx, reply_rx, deadline)
    }

    /// Binds a client to an already running worker's channels.
    pub fn connect(
        requests: UnboundedSender<WorkerRequest>,
        mut replies: UnboundedReceiver<WorkerMessage>,
        deadline: Duration,
    ) -> (Self, UnboundedReceiver<WorkerStatus>) {
        let pending = PendingRequests::default();
        let (status_tx, status_rx) = mpsc::unbounded_channel();
        let deadline_ms = Arc::new(AtomicU64::new(millis(deadline)));

        let router = pending.clone();
        let active_deadline = deadline_ms.clone();
        tokio::spawn(async move {
            while let Some(message) = replies.recv().await {
                match message {
                    WorkerMessage::Status { message } => {
                        let _ = status_tx.send(WorkerStatus { message });
                    }
                    WorkerMessage::Backend { kind } => {
                        active_deadline.store(millis(kind.deadline()), Ordering::Relaxed);
                    }
                    WorkerMessage::Reply { id, result } => {
                        router.resolve(id, result);
                    }
                }
            }
        });

        (
            Self {
                requests,
                pending,
                next_id: Arc::new(AtomicU64::new(0)),
                deadline_ms,
            },
            status_rx,
        )
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms.load(Ordering::Relaxed))
    }

    pub fn pending(&self) -> &PendingRequests {
        &self.pending
    }

    pub async fn compile(&self, request: CompileRequest) -> CompileResult {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let reply = self.pending.insert(id);

        if self
            .requests
            .send(WorkerRequest::Compile { id, request })
            .is_err()
        {
            self.pending.remove(id);
            return CompileResult::failure(FailureKind::Transport, "compile worker is not running");
        }

        let deadline = self.deadline();
        match tokio::time::timeout(deadline, reply).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => {
                CompileResult::failure(FailureKind::Transport, "compile worker dropped the request")
            }
            Err(_) => {
                self.pending.remove(id);
                CompileResult::Failure(CompileFailure::timeout(deadline))
            }
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[path = "test_worker.rs"]
mod tests;
