use std::collections::VecDeque;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use jobforge_core::protocol::PollScope;
use jobforge_core::report::JobBrief;

use crate::api::{
    Admission, CancelOutcome, JobOutcome, JobStatus, OutputSink, SchedulerClient,
    SchedulerConfig, SchedulerHandle,
};
use crate::supervisor::{self, SupervisedJob, SupervisorExit};

/// Depth of the request channel; dispatchers back off when it fills.
const REQUEST_CHANNEL_CAPACITY: usize = 64;

pub(crate) enum SchedulerRequest {
    Submit {
        command: String,
        sink: OutputSink,
        done: oneshot::Sender<JobOutcome>,
        reply: oneshot::Sender<Admission>,
    },
    SetConcurrency {
        concurrency: usize,
        reply: oneshot::Sender<()>,
    },
    Cancel {
        id: u64,
        reply: oneshot::Sender<CancelOutcome>,
    },
    Poll {
        scope: PollScope,
        reply: oneshot::Sender<Vec<JobBrief>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

struct RunningJob {
    id: u64,
    command: String,
    kill_tx: oneshot::Sender<()>,
}

struct WaitingJob {
    id: u64,
    command: String,
    sink: OutputSink,
    done: oneshot::Sender<JobOutcome>,
}

struct SchedulerRuntime {
    cap: usize,
    next_id: u64,
    running: Vec<RunningJob>,
    waiting: VecDeque<WaitingJob>,
    shutting_down: bool,
    requests_closed: bool,
    req_rx: mpsc::Receiver<SchedulerRequest>,
    exit_tx: mpsc::UnboundedSender<SupervisorExit>,
    exit_rx: mpsc::UnboundedReceiver<SupervisorExit>,
}

pub(crate) fn start_scheduler(mut config: SchedulerConfig) -> SchedulerHandle {
    if config.concurrency == 0 {
        config.concurrency = SchedulerConfig::DEFAULT_CONCURRENCY;
    }

    let (req_tx, req_rx) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);
    let (exit_tx, exit_rx) = mpsc::unbounded_channel();

    let runtime = SchedulerRuntime {
        cap: config.concurrency,
        next_id: 1,
        running: Vec::new(),
        waiting: VecDeque::new(),
        shutting_down: false,
        requests_closed: false,
        req_rx,
        exit_tx,
        exit_rx,
    };

    let join = tokio::spawn(runtime.run());
    SchedulerHandle {
        client: SchedulerClient { req_tx },
        join,
    }
}

impl SchedulerRuntime {
    async fn run(mut self) {
        loop {
            if self.shutting_down && self.running.is_empty() {
                break;
            }

            // The exit channel cannot close: the runtime keeps a sender for
            // handing to supervisors.
            tokio::select! {
                req = self.req_rx.recv(), if !self.requests_closed => {
                    match req {
                        Some(req) => self.handle_request(req),
                        None => {
                            // Every client handle is gone; drain and stop.
                            self.requests_closed = true;
                            self.begin_shutdown();
                        }
                    }
                }
                Some(exit) = self.exit_rx.recv() => self.handle_exit(exit),
            }
        }
        debug!("scheduler task exited");
    }

    fn handle_request(&mut self, req: SchedulerRequest) {
        match req {
            SchedulerRequest::Submit {
                command,
                sink,
                done,
                reply,
            } => {
                let admission = self.submit(command, sink, done);
                let _ = reply.send(admission);
            }
            SchedulerRequest::SetConcurrency { concurrency, reply } => {
                info!(concurrency, "concurrency level changed");
                self.cap = concurrency;
                self.promote_waiting();
                let _ = reply.send(());
            }
            SchedulerRequest::Cancel { id, reply } => {
                let outcome = self.cancel(id);
                let _ = reply.send(outcome);
            }
            SchedulerRequest::Poll { scope, reply } => {
                let _ = reply.send(self.snapshot(scope));
            }
            SchedulerRequest::Shutdown { reply } => {
                self.begin_shutdown();
                let _ = reply.send(());
            }
        }
    }

    fn submit(
        &mut self,
        command: String,
        sink: OutputSink,
        done: oneshot::Sender<JobOutcome>,
    ) -> Admission {
        let id = self.next_id;
        self.next_id += 1;

        if self.shutting_down {
            debug!(id, "submission refused during shutdown");
            return Admission::Refused;
        }

        if self.running.len() < self.cap {
            info!(id, command = %command, "job started");
            self.launch(id, command, sink, done);
            Admission::Running { id }
        } else {
            let position = self.waiting.len();
            info!(id, command = %command, position, "job queued");
            self.waiting.push_back(WaitingJob {
                id,
                command,
                sink,
                done,
            });
            Admission::Queued { id, position }
        }
    }

    fn cancel(&mut self, id: u64) -> CancelOutcome {
        if let Some(idx) = self.running.iter().position(|job| job.id == id) {
            let job = self.running.remove(idx);
            let _ = job.kill_tx.send(());
            info!(id, "running job cancelled");
            // The slot is free as soon as the entry is gone; the supervisor's
            // later exit event finds nothing to remove.
            self.promote_waiting();
            return CancelOutcome::CancelledRunning;
        }

        if let Some(idx) = self.waiting.iter().position(|job| job.id == id) {
            // Remove exactly the matching entry; the rest shift up and keep
            // their positions contiguous.
            if let Some(job) = self.waiting.remove(idx) {
                let _ = job.done.send(JobOutcome {
                    id,
                    status: JobStatus::Cancelled,
                });
            }
            info!(id, "queued job cancelled");
            return CancelOutcome::CancelledQueued;
        }

        CancelOutcome::NotFound
    }

    fn handle_exit(&mut self, exit: SupervisorExit) {
        let Some(idx) = self.running.iter().position(|job| job.id == exit.id) else {
            // Already removed by `cancel`; that path promoted the slot.
            return;
        };
        self.running.remove(idx);

        match exit.status {
            JobStatus::Exited(0) => info!(id = exit.id, "job finished"),
            JobStatus::Exited(code) => warn!(id = exit.id, code, "job exited abnormally"),
            JobStatus::Killed => info!(id = exit.id, "job killed"),
            JobStatus::SpawnFailed => warn!(id = exit.id, "job never started"),
            JobStatus::Cancelled => {}
        }

        self.promote_waiting();
    }

    /// Move head-of-queue jobs into free slots until the cap is reached or
    /// the queue empties.
    fn promote_waiting(&mut self) {
        while self.running.len() < self.cap {
            let Some(job) = self.waiting.pop_front() else { break };
            let WaitingJob {
                id,
                command,
                sink,
                done,
            } = job;
            info!(id, command = %command, "job promoted");
            self.launch(id, command, sink, done);
        }
    }

    fn launch(
        &mut self,
        id: u64,
        command: String,
        sink: OutputSink,
        done: oneshot::Sender<JobOutcome>,
    ) {
        let (kill_tx, kill_rx) = oneshot::channel();
        self.running.push(RunningJob {
            id,
            command: command.clone(),
            kill_tx,
        });
        let job = SupervisedJob {
            id,
            command,
            sink,
            done,
            kill: kill_rx,
        };
        tokio::spawn(supervisor::run(job, self.exit_tx.clone()));
    }

    fn snapshot(&self, scope: PollScope) -> Vec<JobBrief> {
        match scope {
            PollScope::Running => self
                .running
                .iter()
                .map(|job| JobBrief {
                    id: job.id,
                    command: job.command.clone(),
                })
                .collect(),
            PollScope::Queued => self
                .waiting
                .iter()
                .map(|job| JobBrief {
                    id: job.id,
                    command: job.command.clone(),
                })
                .collect(),
        }
    }

    fn begin_shutdown(&mut self) {
        if self.shutting_down {
            return;
        }
        self.shutting_down = true;
        info!(
            running = self.running.len(),
            waiting = self.waiting.len(),
            "shutdown requested"
        );

        // Waiting jobs never started; notify their submitters and drop them.
        // Running jobs drain naturally.
        while let Some(job) = self.waiting.pop_front() {
            let _ = job.done.send(JobOutcome {
                id: job.id,
                status: JobStatus::Cancelled,
            });
        }
    }
}
