//! Request grammar spoken between the commander and the server.
//!
//! One connection carries exactly one request frame of the form
//! `VERB [argument-tail]`, answered by a free-form textual response stream
//! terminated by [`DONE_TOKEN`].

use thiserror::Error;

/// Acknowledgment token terminating every response stream.
pub const DONE_TOKEN: &str = "Done";

/// Scope selector for the `poll` verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollScope {
    /// Jobs currently executing.
    Running,
    /// Jobs waiting in FIFO order.
    Queued,
}

/// A parsed client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// `issueJob <command…>` — submit a shell command for execution.
    IssueJob(String),
    /// `setConcurrency <n>` — change the concurrency level.
    SetConcurrency(usize),
    /// `stop <id>` — cancel a running or queued job.
    Stop(u64),
    /// `poll running|queued` — report scheduler state.
    Poll(PollScope),
    /// `exit` — stop accepting new connections and drain.
    Exit,
}

/// Reasons a request frame fails to parse.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// The frame was empty or all whitespace.
    #[error("empty request")]
    Empty,
    /// The first token is not a known verb.
    #[error("unknown command: {0}")]
    UnknownVerb(String),
    /// `issueJob` with no command tail.
    #[error("issueJob requires a command line")]
    MissingCommand,
    /// `setConcurrency` argument missing, non-numeric, or zero.
    #[error("setConcurrency requires a positive integer")]
    InvalidConcurrency,
    /// `stop` argument missing or non-numeric.
    #[error("invalid job id: {0:?}")]
    InvalidJobId(String),
    /// `poll` argument other than `running` or `queued`.
    #[error("poll requires `running` or `queued`")]
    InvalidPollScope,
}

impl Request {
    /// Parse one request frame.
    ///
    /// The command tail of `issueJob` is opaque and kept verbatim (modulo
    /// surrounding whitespace); every other verb takes a single typed
    /// argument.
    pub fn parse(frame: &str) -> Result<Self, ParseError> {
        let frame = frame.trim();
        if frame.is_empty() {
            return Err(ParseError::Empty);
        }

        let (verb, tail) = match frame.split_once(char::is_whitespace) {
            Some((verb, tail)) => (verb, tail.trim()),
            None => (frame, ""),
        };

        match verb {
            "issueJob" => {
                if tail.is_empty() {
                    return Err(ParseError::MissingCommand);
                }
                Ok(Request::IssueJob(tail.to_string()))
            }
            "setConcurrency" => match tail.parse::<usize>() {
                Ok(level) if level >= 1 => Ok(Request::SetConcurrency(level)),
                _ => Err(ParseError::InvalidConcurrency),
            },
            "stop" => tail
                .parse::<u64>()
                .map(Request::Stop)
                .map_err(|_| ParseError::InvalidJobId(tail.to_string())),
            "poll" => match tail {
                "running" => Ok(Request::Poll(PollScope::Running)),
                "queued" => Ok(Request::Poll(PollScope::Queued)),
                _ => Err(ParseError::InvalidPollScope),
            },
            "exit" => Ok(Request::Exit),
            other => Err(ParseError::UnknownVerb(other.to_string())),
        }
    }

    /// Render the request as a wire frame (inverse of [`Request::parse`]).
    pub fn encode(&self) -> String {
        match self {
            Request::IssueJob(command) => format!("issueJob {command}"),
            Request::SetConcurrency(level) => format!("setConcurrency {level}"),
            Request::Stop(id) => format!("stop {id}"),
            Request::Poll(PollScope::Running) => "poll running".to_string(),
            Request::Poll(PollScope::Queued) => "poll queued".to_string(),
            Request::Exit => "exit".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ParseError, PollScope, Request};

    #[test]
    fn parses_every_verb() {
        assert_eq!(
            Request::parse("issueJob sleep 5"),
            Ok(Request::IssueJob("sleep 5".to_string()))
        );
        assert_eq!(Request::parse("setConcurrency 3"), Ok(Request::SetConcurrency(3)));
        assert_eq!(Request::parse("stop 42"), Ok(Request::Stop(42)));
        assert_eq!(Request::parse("poll running"), Ok(Request::Poll(PollScope::Running)));
        assert_eq!(Request::parse("poll queued"), Ok(Request::Poll(PollScope::Queued)));
        assert_eq!(Request::parse("exit"), Ok(Request::Exit));
    }

    #[test]
    fn command_tail_is_kept_verbatim() {
        assert_eq!(
            Request::parse("issueJob sh -c 'echo hi; sleep 1'"),
            Ok(Request::IssueJob("sh -c 'echo hi; sleep 1'".to_string()))
        );
    }

    #[test]
    fn trims_surrounding_whitespace() {
        assert_eq!(Request::parse("  exit \r\n"), Ok(Request::Exit));
        assert_eq!(Request::parse("stop 7\n"), Ok(Request::Stop(7)));
    }

    #[test]
    fn rejects_bad_frames() {
        assert_eq!(Request::parse(""), Err(ParseError::Empty));
        assert_eq!(Request::parse("   "), Err(ParseError::Empty));
        assert_eq!(
            Request::parse("frobnicate now"),
            Err(ParseError::UnknownVerb("frobnicate".to_string()))
        );
        assert_eq!(Request::parse("issueJob"), Err(ParseError::MissingCommand));
        assert_eq!(Request::parse("issueJob   "), Err(ParseError::MissingCommand));
        assert_eq!(Request::parse("setConcurrency 0"), Err(ParseError::InvalidConcurrency));
        assert_eq!(Request::parse("setConcurrency two"), Err(ParseError::InvalidConcurrency));
        assert_eq!(Request::parse("setConcurrency"), Err(ParseError::InvalidConcurrency));
        assert_eq!(Request::parse("stop abc"), Err(ParseError::InvalidJobId("abc".to_string())));
        assert_eq!(Request::parse("poll everything"), Err(ParseError::InvalidPollScope));
        assert_eq!(Request::parse("poll"), Err(ParseError::InvalidPollScope));
    }

    #[test]
    fn encode_produces_parseable_frames() {
        let requests = [
            Request::IssueJob("echo hi".to_string()),
            Request::SetConcurrency(2),
            Request::Stop(9),
            Request::Poll(PollScope::Queued),
            Request::Exit,
        ];
        for request in requests {
            assert_eq!(Request::parse(&request.encode()), Ok(request));
        }
    }
}
