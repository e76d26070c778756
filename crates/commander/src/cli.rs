use clap::{Parser, Subcommand, ValueEnum};

use jobforge_core::protocol::{PollScope, Request};

/// Command-line arguments for the commander.
#[derive(Debug, Parser)]
#[command(
    name = "jobforge-commander",
    version,
    about = "jobforge command-line submitter"
)]
pub struct Cli {
    /// Server host name or address.
    pub host: String,

    /// Server port.
    pub port: u16,

    #[command(subcommand)]
    pub command: Command,
}

/// One request to send to the server.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Submit a shell command and stream its output until completion.
    #[command(name = "issueJob")]
    IssueJob {
        /// The command line to execute, handed to `sh -c` on the server.
        #[arg(required = true, trailing_var_arg = true)]
        command: Vec<String>,
    },
    /// Change the server's concurrency level.
    #[command(name = "setConcurrency")]
    SetConcurrency {
        /// New concurrency level (the server rejects 0).
        level: usize,
    },
    /// Stop a running job or remove a queued one.
    Stop {
        /// Job id as reported at submission.
        id: u64,
    },
    /// Report running or queued jobs.
    Poll {
        /// Which scope to report.
        scope: Scope,
    },
    /// Ask the server to stop accepting work and drain.
    Exit,
}

/// Poll scope argument.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Scope {
    /// Jobs currently executing.
    Running,
    /// Jobs waiting in FIFO order.
    Queued,
}

impl Command {
    /// Translate the parsed arguments into a wire request.
    pub fn to_request(&self) -> Request {
        match self {
            Command::IssueJob { command } => Request::IssueJob(command.join(" ")),
            Command::SetConcurrency { level } => Request::SetConcurrency(*level),
            Command::Stop { id } => Request::Stop(*id),
            Command::Poll { scope: Scope::Running } => Request::Poll(PollScope::Running),
            Command::Poll { scope: Scope::Queued } => Request::Poll(PollScope::Queued),
            Command::Exit => Request::Exit,
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use jobforge_core::protocol::Request;

    use super::Cli;

    #[test]
    fn issue_job_joins_the_command_tail() {
        let cli = Cli::parse_from([
            "jobforge-commander",
            "localhost",
            "8765",
            "issueJob",
            "sleep",
            "5",
        ]);
        assert_eq!(cli.command.to_request(), Request::IssueJob("sleep 5".to_string()));
        assert_eq!(cli.command.to_request().encode(), "issueJob sleep 5");
    }

    #[test]
    fn control_verbs_round_trip() {
        let cli = Cli::parse_from(["jobforge-commander", "localhost", "8765", "stop", "3"]);
        assert_eq!(cli.command.to_request(), Request::Stop(3));

        let cli = Cli::parse_from(["jobforge-commander", "localhost", "8765", "poll", "queued"]);
        assert_eq!(cli.command.to_request().encode(), "poll queued");
    }
}
