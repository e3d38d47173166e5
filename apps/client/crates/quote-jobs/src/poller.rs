//! Fixed-interval polling of one quote job.

use crate::tracker::QuoteJobTracker;
use crate::types::{JobId, JobOutcome, PollLimit, StatusSnapshot};
use crate::QuoteResult;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Polls one job until it is terminal.
///
/// Once a `completed` or `failed` status has been seen, the poller answers
/// from that snapshot and never calls the backend again until [`reset`].
/// Dropping the poller stops polling; an in-flight call is not aborted.
///
/// The poll schedule and the budget a [`PollLimit`] is measured against
/// (attempts and time since the first wait) live on the poller, so a wait
/// interrupted by a transport error resumes where it stopped.
///
/// [`reset`]: JobPoller::reset
pub struct JobPoller {
    tracker: QuoteJobTracker,
    job_id: JobId,
    last: Option<StatusSnapshot>,
    terminal: bool,
    attempts: u32,
    started: Option<Instant>,
    next_poll_at: Option<Instant>,
}

impl JobPoller {
    pub fn new(tracker: QuoteJobTracker, job_id: JobId) -> Self {
        Self {
            tracker,
            job_id,
            last: None,
            terminal: false,
            attempts: 0,
            started: None,
            next_poll_at: None,
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Network polls issued since construction or the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn last(&self) -> Option<&StatusSnapshot> {
        self.last.as_ref()
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    /// Forget the terminal status and the spent budget so the job id may be
    /// polled again.
    pub fn reset(&mut self) {
        debug!(job_id = %self.job_id, "poller reset");
        self.last = None;
        self.terminal = false;
        self.attempts = 0;
        self.started = None;
        self.next_poll_at = None;
    }

    /// Issue one status call, unless the job is already terminal.
    ///
    /// A transport failure is returned for this attempt only; the next call
    /// polls again. Either way the attempt counts against the budget and the
    /// next scheduled poll is one interval later.
    pub async fn poll_once(&mut self) -> QuoteResult<StatusSnapshot> {
        if self.terminal {
            if let Some(snapshot) = &self.last {
                return Ok(snapshot.clone());
            }
        }

        self.attempts += 1;
        let result = self.tracker.poll(&self.job_id).await;
        self.next_poll_at = Some(Instant::now() + self.tracker.poll_interval());
        let snapshot = result?;

        if snapshot.task_id != self.job_id {
            warn!(
                job_id = %self.job_id,
                reported = %snapshot.task_id,
                "status response names a different job"
            );
        }
        if snapshot.is_terminal() {
            info!(
                job_id = %self.job_id,
                status = %snapshot.status,
                attempts = self.attempts,
                "quote job reached terminal status"
            );
            self.terminal = true;
        }

        self.last = Some(snapshot.clone());
        Ok(snapshot)
    }

    /// Poll at the tracker's interval until terminal or until `limit` is
    /// exhausted. Running out of the limit is reported as
    /// [`JobOutcome::GaveUp`], not as an error.
    ///
    /// `limit` is checked before every poll, so `PollLimit::attempts(0)`
    /// issues none. A transport error ends this call; calling again waits for
    /// the next scheduled poll and keeps counting against the same budget.
    pub async fn wait_until_terminal(&mut self, limit: PollLimit) -> QuoteResult<JobOutcome> {
        let started = *self.started.get_or_insert_with(Instant::now);

        loop {
            if let Some(outcome) = self.last.as_ref().and_then(JobOutcome::from_terminal) {
                return Ok(outcome);
            }

            let wait = self
                .next_poll_at
                .map(|at| at.saturating_duration_since(Instant::now()))
                .unwrap_or_default();
            if limit.exhausted(self.attempts, started.elapsed(), wait) {
                info!(
                    job_id = %self.job_id,
                    status = self.last.as_ref().map(|s| s.status.as_str()).unwrap_or("unknown"),
                    polls = self.attempts,
                    "giving up on quote job"
                );
                return Ok(JobOutcome::GaveUp {
                    last: self.last.clone(),
                });
            }

            if !wait.is_zero() {
                tokio::time::sleep(wait).await;
            }
            self.poll_once().await?;
        }
    }
}
