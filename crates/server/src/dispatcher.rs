use std::sync::Arc;

use anyhow::Context as _;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use jobforge_core::protocol::{DONE_TOKEN, PollScope, Request};
use jobforge_core::report;
use jobforge_engine::{
    Admission, CancelOutcome, JobOutcome, JobStatus, SchedulerClient, SchedulerError,
};

use crate::shutdown::ShutdownFlag;

/// Output chunks buffered per in-flight job before the supervisor backs off.
const SINK_CAPACITY: usize = 32;

/// Serve one connection: read a single request frame, invoke the matching
/// scheduler operation, stream the response, terminate with the `Done` token
/// and close.
pub(crate) async fn handle_connection(
    mut stream: TcpStream,
    scheduler: SchedulerClient,
    shutdown: Arc<ShutdownFlag>,
    buffer_size: usize,
) -> anyhow::Result<()> {
    let mut buf = vec![0u8; buffer_size];
    let n = stream.read(&mut buf).await.context("read request")?;
    if n == 0 {
        return Ok(());
    }
    let frame = String::from_utf8_lossy(&buf[..n]).into_owned();

    match Request::parse(&frame) {
        Ok(Request::IssueJob(command)) => {
            issue_job(&mut stream, &scheduler, command).await;
        }
        Ok(Request::SetConcurrency(level)) => {
            let line = match scheduler.set_concurrency(level).await {
                Ok(()) => format!("Concurrency level set to {level}\n"),
                Err(err) => format!("Error: {err}\n"),
            };
            write_lossy(&mut stream, line.as_bytes()).await;
        }
        Ok(Request::Stop(id)) => {
            let line = match scheduler.cancel(id).await {
                Ok(CancelOutcome::CancelledRunning) => format!("Job {id} stopped\n"),
                Ok(CancelOutcome::CancelledQueued) => {
                    format!("Job {id} removed from the queue\n")
                }
                Ok(CancelOutcome::NotFound) => format!("Job {id} not found\n"),
                Err(err) => format!("Error: {err}\n"),
            };
            write_lossy(&mut stream, line.as_bytes()).await;
        }
        Ok(Request::Poll(scope)) => {
            let text = match scheduler.poll(scope).await {
                Ok(jobs) => match scope {
                    PollScope::Running => report::running_report(&jobs),
                    PollScope::Queued => report::queued_report(&jobs),
                },
                Err(err) => format!("Error: {err}\n"),
            };
            write_lossy(&mut stream, text.as_bytes()).await;
        }
        Ok(Request::Exit) => {
            // Idempotent: repeated `exit` requests are no-ops past the first.
            match scheduler.shutdown().await {
                Ok(()) | Err(SchedulerError::Closed) => {}
                Err(err) => debug!(%err, "shutdown request failed"),
            }
            shutdown.request();
            write_lossy(&mut stream, b"Server is exiting\n").await;
        }
        Err(err) => {
            write_lossy(&mut stream, format!("Error: {err}\n").as_bytes()).await;
        }
    }

    write_lossy(&mut stream, DONE_TOKEN.as_bytes()).await;
    let _ = stream.flush().await;
    Ok(())
}

/// Submit the command and keep the connection open for the job's full life:
/// admission line, streamed output, then (back in the caller) the `Done`
/// acknowledgment.
async fn issue_job(stream: &mut TcpStream, scheduler: &SchedulerClient, command: String) {
    let (sink, mut output) = mpsc::channel::<Vec<u8>>(SINK_CAPACITY);
    let (done_tx, mut done_rx) = oneshot::channel::<JobOutcome>();

    let admission = match scheduler.submit(command, sink, done_tx).await {
        Ok(admission) => admission,
        Err(err) => {
            write_lossy(stream, format!("Error: {err}\n").as_bytes()).await;
            return;
        }
    };

    match admission {
        Admission::Running { id } => {
            write_lossy(stream, format!("Job {id} started\n").as_bytes()).await;
        }
        Admission::Queued { id, position } => {
            write_lossy(stream, format!("Job {id} queued at position {position}\n").as_bytes())
                .await;
        }
        Admission::Refused => {
            write_lossy(stream, b"Error: server is shutting down\n").await;
            return;
        }
    }

    // Forward job output until the outcome arrives. A dead client stops the
    // forwarding but never the job bookkeeping.
    let mut client_alive = true;
    let mut output_open = true;
    let outcome = loop {
        tokio::select! {
            chunk = output.recv(), if output_open => match chunk {
                Some(bytes) => {
                    if client_alive && stream.write_all(&bytes).await.is_err() {
                        debug!("client went away mid-stream");
                        client_alive = false;
                        output.close();
                    }
                }
                None => output_open = false,
            },
            res = &mut done_rx => break res.ok(),
        }
    };

    // Flush whatever the supervisor buffered before completing.
    while let Some(bytes) = output.recv().await {
        if client_alive && stream.write_all(&bytes).await.is_err() {
            client_alive = false;
        }
    }

    if let Some(JobOutcome { id, status: JobStatus::Cancelled }) = outcome {
        write_lossy(stream, format!("Job {id} cancelled before start\n").as_bytes()).await;
    }
}

/// Write, swallowing I/O failures: a dead client never aborts the server.
async fn write_lossy(stream: &mut TcpStream, bytes: &[u8]) {
    if let Err(err) = stream.write_all(bytes).await {
        debug!(%err, "client write failed");
    }
}
