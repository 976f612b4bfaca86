//! Queue actor
//!
//! Every queue operation is a message to one task that owns the
//! [`CrawlQueue`]. The check-then-dispatch in `dequeue_next` therefore never
//! races with another worker's dequeue or report.

use crate::queue::crawl_queue::{CrawlQueue, EnqueueOutcome, FailureOutcome, QueueStats};
use crate::queue::task::{CrawlTask, FailureKind};
use crate::storage::AbandonedRecord;
use crate::LadleError;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

const COMMAND_BUFFER: usize = 256;

type Reply<T> = oneshot::Sender<Result<T, LadleError>>;

enum Command {
    Enqueue {
        url: String,
        domain: String,
        reply: Reply<EnqueueOutcome>,
    },
    Dequeue {
        worker_id: usize,
        reply: Reply<Option<CrawlTask>>,
    },
    Success {
        task: CrawlTask,
        reply: Reply<()>,
    },
    Failure {
        task: CrawlTask,
        kind: FailureKind,
        message: String,
        reply: Reply<FailureOutcome>,
    },
    Release {
        task: CrawlTask,
        reply: Reply<()>,
    },
    RaiseDelayFloor {
        domain: String,
        floor: Duration,
        reply: Reply<()>,
    },
    Stats {
        reply: Reply<QueueStats>,
    },
    Abandoned {
        reply: Reply<Vec<AbandonedRecord>>,
    },
}

/// Cloneable handle to the queue actor
#[derive(Clone)]
pub struct QueueHandle {
    tx: mpsc::Sender<Command>,
}

/// Moves the queue into its own task and returns a handle to it
///
/// The task ends once every handle has been dropped, and yields the queue
/// back through its `JoinHandle`.
pub fn spawn_queue(queue: CrawlQueue) -> (QueueHandle, JoinHandle<CrawlQueue>) {
    let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
    let join = tokio::spawn(run_queue(queue, rx));
    (QueueHandle { tx }, join)
}

async fn run_queue(mut queue: CrawlQueue, mut rx: mpsc::Receiver<Command>) -> CrawlQueue {
    while let Some(command) = rx.recv().await {
        match command {
            Command::Enqueue { url, domain, reply } => {
                let _ = reply.send(queue.enqueue(&url, &domain));
            }
            Command::Dequeue { worker_id, reply } => {
                let _ = reply.send(queue.dequeue_next(worker_id, Instant::now()));
            }
            Command::Success { task, reply } => {
                let _ = reply.send(queue.report_success(&task));
            }
            Command::Failure {
                task,
                kind,
                message,
                reply,
            } => {
                let _ = reply.send(queue.report_failure(&task, kind, &message, Instant::now()));
            }
            Command::Release { task, reply } => {
                let _ = reply.send(queue.release(&task));
            }
            Command::RaiseDelayFloor {
                domain,
                floor,
                reply,
            } => {
                queue.raise_delay_floor(&domain, floor);
                let _ = reply.send(Ok(()));
            }
            Command::Stats { reply } => {
                let _ = reply.send(Ok(queue.stats(Instant::now())));
            }
            Command::Abandoned { reply } => {
                let _ = reply.send(Ok(queue.abandoned_this_run().to_vec()));
            }
        }
    }
    tracing::debug!("Queue actor stopped");
    queue
}

impl QueueHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, LadleError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| LadleError::QueueClosed)?;
        rx.await.map_err(|_| LadleError::QueueClosed)?
    }

    /// Adds a discovered URL for `domain`
    pub async fn enqueue(&self, url: &str, domain: &str) -> Result<EnqueueOutcome, LadleError> {
        self.request(|reply| Command::Enqueue {
            url: url.to_string(),
            domain: domain.to_string(),
            reply,
        })
        .await
    }

    /// Takes the oldest task that may be dispatched now, if any
    pub async fn dequeue_next(&self, worker_id: usize) -> Result<Option<CrawlTask>, LadleError> {
        self.request(|reply| Command::Dequeue { worker_id, reply })
            .await
    }

    pub async fn report_success(&self, task: &CrawlTask) -> Result<(), LadleError> {
        self.request(|reply| Command::Success {
            task: task.clone(),
            reply,
        })
        .await
    }

    pub async fn report_failure(
        &self,
        task: &CrawlTask,
        kind: FailureKind,
        message: impl Into<String>,
    ) -> Result<FailureOutcome, LadleError> {
        let message = message.into();
        self.request(|reply| Command::Failure {
            task: task.clone(),
            kind,
            message,
            reply,
        })
        .await
    }

    /// Puts an in-flight task back without counting the attempt
    pub async fn release(&self, task: &CrawlTask) -> Result<(), LadleError> {
        self.request(|reply| Command::Release {
            task: task.clone(),
            reply,
        })
        .await
    }

    pub async fn raise_delay_floor(&self, domain: &str, floor: Duration) -> Result<(), LadleError> {
        self.request(|reply| Command::RaiseDelayFloor {
            domain: domain.to_string(),
            floor,
            reply,
        })
        .await
    }

    pub async fn stats(&self) -> Result<QueueStats, LadleError> {
        self.request(|reply| Command::Stats { reply }).await
    }

    /// Tasks abandoned since the queue was opened
    pub async fn abandoned(&self) -> Result<Vec<AbandonedRecord>, LadleError> {
        self.request(|reply| Command::Abandoned { reply }).await
    }
}
