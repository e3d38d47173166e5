//! Quote job calls against the backend.

use crate::poller::JobPoller;
use crate::types::{
    ApprovalResult, JobId, JobOutcome, PollLimit, Quote, QuoteId, QuoteRequest, StatusSnapshot,
    SubmitResponse,
};
use crate::QuoteResult;
use client_config_and_utils::{Config, DEFAULT_POLL_INTERVAL_MS};
use request_gateway::{ApiGateway, ApiRequest};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Prefix of every quote endpoint.
pub const QUOTES_PATH: &str = "/api/v1/quotes/";

pub const GENERATE_PATH: &str = "/api/v1/quotes/generate/";

/// Submits quote jobs and reads their results through the shared gateway.
#[derive(Clone)]
pub struct QuoteJobTracker {
    gateway: ApiGateway,
    poll_interval: Duration,
}

impl QuoteJobTracker {
    pub fn new(gateway: ApiGateway) -> Self {
        Self {
            gateway,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }

    pub fn from_config(gateway: ApiGateway, config: &Config) -> Self {
        Self::new(gateway).with_poll_interval(config.poll_interval())
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Start quote generation. Returns the job id to poll.
    pub async fn submit(&self, request: &QuoteRequest) -> QuoteResult<JobId> {
        let accepted: SubmitResponse = self
            .gateway
            .send_json(ApiRequest::post(GENERATE_PATH).json_value(request.as_value().clone()))
            .await?;

        info!(
            job_id = %accepted.task_id,
            status = accepted.status.as_ref().map(|s| s.as_str()).unwrap_or("unknown"),
            message = accepted.message.as_deref().unwrap_or(""),
            "quote job submitted"
        );
        Ok(accepted.task_id)
    }

    /// Read the job's current status. One network call, no side effects.
    pub async fn poll(&self, job_id: &JobId) -> QuoteResult<StatusSnapshot> {
        let path = format!("{}status/{}/", QUOTES_PATH, job_id.path_segment()?);
        let snapshot: StatusSnapshot = self.gateway.get_json(&path).await?;
        debug!(job_id = %job_id, status = %snapshot.status, "quote job status");
        Ok(snapshot)
    }

    /// Fetch the finalized quote.
    pub async fn preview(&self, quote_id: &QuoteId) -> QuoteResult<Quote> {
        let path = format!("{}{}/preview/", QUOTES_PATH, quote_id.path_segment()?);
        Ok(self.gateway.get_json(&path).await?)
    }

    /// Approve a quote with the token from the approval email.
    ///
    /// Not safe to repeat: the backend rejects a second approval, so this is
    /// never retried here.
    pub async fn approve(&self, quote_id: &QuoteId, token: &str) -> QuoteResult<ApprovalResult> {
        let path = format!("{}{}/approve/", QUOTES_PATH, quote_id.path_segment()?);
        let result: ApprovalResult = self
            .gateway
            .send_json(ApiRequest::post(path).json_value(json!({ "token": token })))
            .await?;

        info!(quote_id = %quote_id, status = %result.status, "quote approved");
        Ok(result)
    }

    /// Record that the quote was viewed. Failures are logged and dropped.
    pub async fn track_view(&self, quote_id: &QuoteId) {
        let segment = match quote_id.path_segment() {
            Ok(segment) => segment,
            Err(e) => {
                warn!(error = %e, "not tracking view");
                return;
            }
        };
        let path = format!("{}{}/track-view/", QUOTES_PATH, segment);

        match self.gateway.send(ApiRequest::post(path)).await {
            Ok(response) if response.status().is_success() => {
                debug!(quote_id = %quote_id, "quote view tracked");
            }
            Ok(response) => {
                debug!(quote_id = %quote_id, status = response.status().as_u16(), "view tracking rejected");
            }
            Err(e) => debug!(quote_id = %quote_id, error = %e, "view tracking failed"),
        }
    }

    /// A poller bound to one job.
    pub fn poller(&self, job_id: JobId) -> JobPoller {
        JobPoller::new(self.clone(), job_id)
    }

    /// Submit, then poll until terminal or until `limit` runs out.
    pub async fn generate(&self, request: &QuoteRequest, limit: PollLimit) -> QuoteResult<JobOutcome> {
        let job_id = self.submit(request).await?;
        self.poller(job_id).wait_until_terminal(limit).await
    }
}
