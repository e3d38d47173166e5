//! Quote job error types.
//!
//! A job that ends in `failed` is not an error; it is reported through
//! [`crate::JobOutcome::Failed`].

use request_gateway::GatewayError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QuoteError {
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// An id that cannot be placed in a URL path segment.
    #[error("Invalid id: {0:?}")]
    InvalidId(String),

    /// The quote request document is not a JSON object.
    #[error("Invalid quote request: {0}")]
    InvalidRequest(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QuoteError {
    /// Returns true if the next scheduled poll may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            QuoteError::Gateway(e) => e.is_transient(),
            _ => false,
        }
    }
}

pub type QuoteResult<T> = Result<T, QuoteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_5xx_is_transient() {
        let err = QuoteError::from(GatewayError::Api {
            status: 503,
            message: "Service Unavailable".into(),
        });
        assert!(err.is_transient());
    }

    #[test]
    fn test_invalid_id_is_not_transient() {
        let err = QuoteError::InvalidId("a/b".into());
        assert!(!err.is_transient());
        assert_eq!(err.to_string(), "Invalid id: \"a/b\"");
    }
}
