//! Public API types for the jobforge scheduler.

use tokio::sync::{mpsc, oneshot};

use jobforge_core::protocol::PollScope;
use jobforge_core::report::JobBrief;

use crate::scheduler::{self, SchedulerRequest};

/// Byte channel carrying a job's output back to its submitter.
///
/// The dispatcher that owns the client socket holds the receiving end; the
/// supervisor streams child stdout (and failure lines) through the sender.
/// Neither the scheduler task nor the supervisor ever touches the socket.
pub type OutputSink = mpsc::Sender<Vec<u8>>;

/// Configuration for the scheduler task.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum number of jobs permitted to run simultaneously.
    pub concurrency: usize,
}

impl SchedulerConfig {
    /// Concurrency level used when none is configured.
    pub const DEFAULT_CONCURRENCY: usize = 1;
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: Self::DEFAULT_CONCURRENCY,
        }
    }
}

/// Admission decision for one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// A slot was free; the job is running.
    Running {
        /// Assigned job id.
        id: u64,
    },
    /// Every slot was busy; the job waits in FIFO order.
    Queued {
        /// Assigned job id.
        id: u64,
        /// Position in the waiting queue (0 = next to run).
        position: usize,
    },
    /// The scheduler is shutting down and no longer admits jobs.
    Refused,
}

/// Outcome of a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The job was running; its process has been signalled.
    CancelledRunning,
    /// The job was waiting; it has been removed from the queue.
    CancelledQueued,
    /// No running or waiting job has this id.
    NotFound,
}

/// How a job reached the end of its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// The child exited on its own with this status code.
    Exited(i32),
    /// The child was terminated by a signal (e.g. `stop`).
    Killed,
    /// The shell could not be spawned.
    SpawnFailed,
    /// The job was cancelled before it started.
    Cancelled,
}

/// Completion notification delivered to the submitting dispatcher, which
/// then sends the terminating acknowledgment on the client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobOutcome {
    /// Job id.
    pub id: u64,
    /// Final status.
    pub status: JobStatus,
}

/// Errors surfaced by [`SchedulerClient`] operations.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// The scheduler task has exited (server shut down).
    #[error("scheduler is shut down")]
    Closed,
    /// The requested concurrency level was below 1.
    #[error("concurrency level must be at least 1")]
    InvalidConcurrency,
}

/// Cloneable client used by dispatchers to invoke scheduler operations.
#[derive(Debug, Clone)]
pub struct SchedulerClient {
    pub(crate) req_tx: mpsc::Sender<SchedulerRequest>,
}

/// Handle owning the scheduler task.
pub struct SchedulerHandle {
    pub(crate) client: SchedulerClient,
    pub(crate) join: tokio::task::JoinHandle<()>,
}

/// Start a scheduler task and return its handle.
pub fn start_scheduler(config: SchedulerConfig) -> SchedulerHandle {
    scheduler::start_scheduler(config)
}

impl SchedulerHandle {
    /// A client for submitting operations to this scheduler.
    pub fn client(&self) -> SchedulerClient {
        self.client.clone()
    }

    /// Wait for the scheduler to drain its running jobs and exit.
    pub async fn wait(self) {
        let _ = self.join.await;
    }
}

impl SchedulerClient {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> SchedulerRequest,
    ) -> Result<T, SchedulerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.req_tx
            .send(build(reply_tx))
            .await
            .map_err(|_| SchedulerError::Closed)?;
        reply_rx.await.map_err(|_| SchedulerError::Closed)
    }

    /// Submit a command for execution.
    ///
    /// `sink` receives the job's output; `done` fires once the job reaches a
    /// terminal state. The returned [`Admission`] carries the assigned id and
    /// the run-now-or-wait decision.
    pub async fn submit(
        &self,
        command: String,
        sink: OutputSink,
        done: oneshot::Sender<JobOutcome>,
    ) -> Result<Admission, SchedulerError> {
        self.request(|reply| SchedulerRequest::Submit {
            command,
            sink,
            done,
            reply,
        })
        .await
    }

    /// Change the concurrency cap. Raising the cap promotes waiting jobs;
    /// lowering it never preempts running ones.
    pub async fn set_concurrency(&self, concurrency: usize) -> Result<(), SchedulerError> {
        if concurrency < 1 {
            return Err(SchedulerError::InvalidConcurrency);
        }
        self.request(|reply| SchedulerRequest::SetConcurrency { concurrency, reply })
            .await
    }

    /// Cancel a running or waiting job.
    pub async fn cancel(&self, id: u64) -> Result<CancelOutcome, SchedulerError> {
        self.request(|reply| SchedulerRequest::Cancel { id, reply }).await
    }

    /// Snapshot the running set or the waiting queue.
    pub async fn poll(&self, scope: PollScope) -> Result<Vec<JobBrief>, SchedulerError> {
        self.request(|reply| SchedulerRequest::Poll { scope, reply }).await
    }

    /// Request shutdown: cancel waiting jobs, refuse new submissions, let
    /// running jobs drain. Idempotent.
    pub async fn shutdown(&self) -> Result<(), SchedulerError> {
        self.request(|reply| SchedulerRequest::Shutdown { reply }).await
    }
}
