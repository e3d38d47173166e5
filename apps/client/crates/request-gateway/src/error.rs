//! Gateway error types.

use crate::renewal::RenewalFailure;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    /// Transport failure (connect, timeout, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success response; `message` is the server's text, unmodified.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The access credential expired and could not be renewed.
    #[error("Session expired: {0}")]
    SessionExpired(#[from] RenewalFailure),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GatewayError {
    /// Returns true for failures a caller may reasonably retry later.
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::Http(e) => {
                e.is_connect()
                    || e.is_timeout()
                    || e.status().is_some_and(|status| status.is_server_error())
            }
            GatewayError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::Api { status, .. } => Some(*status),
            GatewayError::Http(e) => e.status().map(|status| status.as_u16()),
            _ => None,
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
