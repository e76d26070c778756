#![forbid(unsafe_code)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]

//! Job scheduler and execution supervisor for the jobforge server.
//!
//! A single scheduler task owns all scheduling state (concurrency cap,
//! running set, FIFO waiting queue, id counter) and serves operations over a
//! request channel. One supervisor task per running job owns the `sh -c`
//! child process and streams its stdout back to the submitter.

/// Public API for the engine crate.
pub mod api;

mod scheduler;
mod supervisor;

pub use api::{
    Admission, CancelOutcome, JobOutcome, JobStatus, OutputSink, SchedulerClient,
    SchedulerConfig, SchedulerError, SchedulerHandle, start_scheduler,
};
