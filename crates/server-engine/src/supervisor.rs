use std::process::Stdio;

use tokio::io::AsyncReadExt;
use tokio::process::{ChildStdout, Command};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::api::{JobOutcome, JobStatus, OutputSink};

/// Read size for the stdout pump.
const OUTPUT_CHUNK: usize = 8 * 1024;

/// Everything a supervisor needs to run one job.
pub(crate) struct SupervisedJob {
    pub(crate) id: u64,
    pub(crate) command: String,
    pub(crate) sink: OutputSink,
    pub(crate) done: oneshot::Sender<JobOutcome>,
    pub(crate) kill: oneshot::Receiver<()>,
}

/// Exit notification sent back to the scheduler task.
pub(crate) struct SupervisorExit {
    pub(crate) id: u64,
    pub(crate) status: JobStatus,
}

/// Supervise one job: spawn `sh -c <command>`, stream its stdout into the
/// sink, wait for termination (or the kill trigger), then report the exit to
/// the scheduler and the outcome to the submitting dispatcher.
pub(crate) async fn run(job: SupervisedJob, exits: mpsc::UnboundedSender<SupervisorExit>) {
    let SupervisedJob {
        id,
        command,
        sink,
        done,
        mut kill,
    } = job;

    let mut child = match Command::new("sh")
        .arg("-c")
        .arg(&command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(err) => {
            warn!(id, %err, "failed to spawn shell");
            let line = format!("Error: failed to start shell: {err}\n");
            let _ = sink.send(line.into_bytes()).await;
            drop(sink);
            let status = JobStatus::SpawnFailed;
            let _ = exits.send(SupervisorExit { id, status });
            let _ = done.send(JobOutcome { id, status });
            return;
        }
    };

    let pump = child
        .stdout
        .take()
        .map(|stdout| tokio::spawn(pump_output(stdout, sink)));

    let wait_res = tokio::select! {
        res = child.wait() => res,
        _ = &mut kill => {
            debug!(id, "delivering kill signal");
            let _ = child.start_kill();
            child.wait().await
        }
    };

    // Flush the remainder of the pipe before reporting completion.
    if let Some(pump) = pump {
        let _ = pump.await;
    }

    let status = match wait_res {
        Ok(exit) => match exit.code() {
            Some(code) => JobStatus::Exited(code),
            None => JobStatus::Killed,
        },
        Err(err) => {
            warn!(id, %err, "wait on child failed");
            JobStatus::Killed
        }
    };

    let _ = exits.send(SupervisorExit { id, status });
    let _ = done.send(JobOutcome { id, status });
}

/// Forward child stdout into the sink. A dead sink (submitter gone) never
/// blocks supervision: the pipe is still drained to EOF so the child cannot
/// stall on a full pipe.
async fn pump_output(mut stdout: ChildStdout, sink: OutputSink) {
    let mut buf = vec![0u8; OUTPUT_CHUNK];
    let mut sink_open = true;
    loop {
        match stdout.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if sink_open && sink.send(buf[..n].to_vec()).await.is_err() {
                    sink_open = false;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::{mpsc, oneshot};
    use tokio::time::timeout;

    use super::{SupervisedJob, SupervisorExit, run};
    use crate::api::{JobOutcome, JobStatus};

    #[allow(clippy::type_complexity)]
    fn supervised(
        id: u64,
        command: &str,
    ) -> (
        SupervisedJob,
        mpsc::Receiver<Vec<u8>>,
        oneshot::Receiver<JobOutcome>,
        oneshot::Sender<()>,
    ) {
        let (sink, out_rx) = mpsc::channel(4);
        let (done_tx, done_rx) = oneshot::channel();
        let (kill_tx, kill_rx) = oneshot::channel();
        let job = SupervisedJob {
            id,
            command: command.to_string(),
            sink,
            done: done_tx,
            kill: kill_rx,
        };
        (job, out_rx, done_rx, kill_tx)
    }

    #[tokio::test]
    async fn streams_stdout_and_reports_exit() {
        let (exits_tx, mut exits_rx) = mpsc::unbounded_channel::<SupervisorExit>();
        let (job, mut out_rx, done_rx, _kill_tx) = supervised(1, "printf 'hello\\n'");
        tokio::spawn(run(job, exits_tx));

        let outcome = timeout(Duration::from_secs(5), done_rx)
            .await
            .expect("job timed out")
            .expect("outcome dropped");
        assert_eq!(outcome, JobOutcome { id: 1, status: JobStatus::Exited(0) });

        let mut collected = Vec::new();
        while let Some(chunk) = out_rx.recv().await {
            collected.extend_from_slice(&chunk);
        }
        assert_eq!(collected, b"hello\n");

        let exit = exits_rx.recv().await.expect("exit event missing");
        assert_eq!(exit.id, 1);
        assert_eq!(exit.status, JobStatus::Exited(0));
    }

    #[tokio::test]
    async fn nonzero_exit_codes_are_reported() {
        let (exits_tx, _exits_rx) = mpsc::unbounded_channel::<SupervisorExit>();
        let (job, _out_rx, done_rx, _kill_tx) = supervised(2, "exit 7");
        tokio::spawn(run(job, exits_tx));

        let outcome = timeout(Duration::from_secs(5), done_rx)
            .await
            .expect("job timed out")
            .expect("outcome dropped");
        assert_eq!(outcome.status, JobStatus::Exited(7));
    }

    #[tokio::test]
    async fn kill_trigger_terminates_the_child() {
        let (exits_tx, _exits_rx) = mpsc::unbounded_channel::<SupervisorExit>();
        let (job, _out_rx, done_rx, kill_tx) = supervised(3, "sleep 30");
        tokio::spawn(run(job, exits_tx));

        tokio::time::sleep(Duration::from_millis(200)).await;
        kill_tx.send(()).expect("supervisor gone before kill");

        let outcome = timeout(Duration::from_secs(5), done_rx)
            .await
            .expect("kill did not take effect")
            .expect("outcome dropped");
        assert_eq!(outcome.status, JobStatus::Killed);
    }

    #[tokio::test]
    async fn dead_sink_never_blocks_supervision() {
        let (exits_tx, _exits_rx) = mpsc::unbounded_channel::<SupervisorExit>();
        // Write more than a pipe buffer's worth with nobody listening.
        let (job, out_rx, done_rx, _kill_tx) = supervised(4, "head -c 262144 /dev/zero");
        drop(out_rx);
        tokio::spawn(run(job, exits_tx));

        let outcome = timeout(Duration::from_secs(5), done_rx)
            .await
            .expect("supervisor blocked on dead sink")
            .expect("outcome dropped");
        assert_eq!(outcome.status, JobStatus::Exited(0));
    }
}
