//! Quote job data types.

use crate::{QuoteError, QuoteResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Server-issued job identifier. Immutable once issued.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

/// Identifier of a generated quote.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuoteId(String);

macro_rules! path_id {
    ($name:ident) => {
        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// The id as a single URL path segment.
            pub(crate) fn path_segment(&self) -> QuoteResult<&str> {
                let id = self.0.as_str();
                let unsafe_char = |c: char| matches!(c, '/' | '?' | '#' | '%') || c.is_whitespace();
                if id.is_empty() || id.contains(unsafe_char) || id == "." || id == ".." {
                    return Err(QuoteError::InvalidId(id.to_string()));
                }
                Ok(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self::new(id)
            }
        }
    };
}

path_id!(JobId);
path_id!(QuoteId);

/// Status of a quote generation job.
///
/// Only `completed` and `failed` are terminal. Any status the client does not
/// know is kept verbatim and treated as still running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobStatus {
    /// Accepted by the backend, not yet observed by a poll.
    Submitted,
    Pending,
    Processing,
    Completed,
    Failed,
    Other(String),
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Submitted => "submitted",
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Other(status) => status.as_str(),
        }
    }
}

impl From<String> for JobStatus {
    fn from(status: String) -> Self {
        match status.as_str() {
            "submitted" => JobStatus::Submitted,
            "pending" => JobStatus::Pending,
            "processing" => JobStatus::Processing,
            "completed" => JobStatus::Completed,
            "failed" => JobStatus::Failed,
            _ => JobStatus::Other(status),
        }
    }
}

impl From<JobStatus> for String {
    fn from(status: JobStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response of the generate call (HTTP 202).
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SubmitResponse {
    pub task_id: JobId,
    #[serde(default)]
    pub status: Option<JobStatus>,
    #[serde(default)]
    pub message: Option<String>,
}

/// One status poll result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub task_id: JobId,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote_id: Option<QuoteId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
}

impl StatusSnapshot {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Business payload for quote generation (vehicle, service, glass and
/// payment details). Validated server-side only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuoteRequest(Value);

impl QuoteRequest {
    /// Wrap a JSON object. Anything else is rejected before it is sent.
    pub fn new(payload: Value) -> QuoteResult<Self> {
        if !payload.is_object() {
            return Err(QuoteError::InvalidRequest(
                "quote request must be a JSON object".to_string(),
            ));
        }
        Ok(Self(payload))
    }

    pub fn from_json_str(raw: &str) -> QuoteResult<Self> {
        Self::new(serde_json::from_str(raw)?)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

/// A finalized quote document, kept as the backend sends it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quote(Value);

impl Quote {
    pub fn id(&self) -> Option<&str> {
        self.0.get("id").and_then(Value::as_str)
    }

    pub fn state(&self) -> Option<&str> {
        self.0.get("state").and_then(Value::as_str)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

/// Result of approving a quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalResult {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// How a wait for a job ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    Completed(StatusSnapshot),
    Failed(StatusSnapshot),
    /// The caller's limit ran out while the job was still running.
    GaveUp { last: Option<StatusSnapshot> },
}

impl JobOutcome {
    pub(crate) fn from_terminal(snapshot: &StatusSnapshot) -> Option<Self> {
        match snapshot.status {
            JobStatus::Completed => Some(JobOutcome::Completed(snapshot.clone())),
            JobStatus::Failed => Some(JobOutcome::Failed(snapshot.clone())),
            _ => None,
        }
    }

    pub fn quote_id(&self) -> Option<&QuoteId> {
        match self {
            JobOutcome::Completed(snapshot) => snapshot.quote_id.as_ref(),
            _ => None,
        }
    }

    pub fn last_snapshot(&self) -> Option<&StatusSnapshot> {
        match self {
            JobOutcome::Completed(snapshot) | JobOutcome::Failed(snapshot) => Some(snapshot),
            JobOutcome::GaveUp { last } => last.as_ref(),
        }
    }
}

/// Caller-imposed ceiling on a wait. Both limits may be combined; an empty
/// limit waits until the job is terminal. Attempts count every poll since the
/// poller was created or reset, so `attempts(0)` never polls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollLimit {
    pub max_attempts: Option<u32>,
    pub max_duration: Option<Duration>,
}

impl PollLimit {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            max_duration: None,
        }
    }

    pub fn within(max_duration: Duration) -> Self {
        Self {
            max_attempts: None,
            max_duration: Some(max_duration),
        }
    }

    /// Whether another poll after `next_in` would break the limit.
    pub(crate) fn exhausted(&self, polls: u32, elapsed: Duration, next_in: Duration) -> bool {
        self.max_attempts.is_some_and(|max| polls >= max)
            || self
                .max_duration
                .is_some_and(|max| elapsed.saturating_add(next_in) > max)
    }
}
