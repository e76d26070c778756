//! Textual reports for the `poll` verb.

/// Identity and command text of one job, as shown in poll reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobBrief {
    /// Scheduler-assigned job id.
    pub id: u64,
    /// The submitted command line.
    pub command: String,
}

/// Compose the `poll running` report.
pub fn running_report(jobs: &[JobBrief]) -> String {
    report("running", jobs)
}

/// Compose the `poll queued` report (jobs in FIFO order).
pub fn queued_report(jobs: &[JobBrief]) -> String {
    report("queued", jobs)
}

fn report(kind: &str, jobs: &[JobBrief]) -> String {
    let mut out = format!("Number of {kind} jobs: {}\n", jobs.len());
    for job in jobs {
        out.push_str(&format!("Job {}: {}\n", job.id, job.command));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{JobBrief, queued_report, running_report};

    #[test]
    fn reports_count_then_one_line_per_job() {
        let jobs = vec![
            JobBrief { id: 1, command: "sleep 5".to_string() },
            JobBrief { id: 3, command: "echo hi".to_string() },
        ];
        assert_eq!(
            running_report(&jobs),
            "Number of running jobs: 2\nJob 1: sleep 5\nJob 3: echo hi\n"
        );
    }

    #[test]
    fn empty_scopes_report_zero() {
        assert_eq!(queued_report(&[]), "Number of queued jobs: 0\n");
    }
}
