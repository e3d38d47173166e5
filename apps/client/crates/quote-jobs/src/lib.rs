//! Quote generation jobs.
//!
//! The backend generates quotes asynchronously: [`QuoteJobTracker::submit`]
//! returns a job id, and a [`JobPoller`] polls its status at a fixed interval
//! until it reaches `completed` or `failed`. All calls go through the shared
//! [`request_gateway::ApiGateway`].

mod error;
mod poller;
mod tracker;
mod types;

pub use error::{QuoteError, QuoteResult};
pub use poller::JobPoller;
pub use tracker::{QuoteJobTracker, GENERATE_PATH, QUOTES_PATH};
pub use types::{
    ApprovalResult, JobId, JobOutcome, JobStatus, PollLimit, Quote, QuoteId, QuoteRequest,
    StatusSnapshot,
};
