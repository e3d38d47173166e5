//! Session error types.

use request_gateway::GatewayError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    /// Login rejected; carries the server's message.
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Not logged in")]
    NotLoggedIn,

    /// Renewal failed; the session has been cleared.
    #[error("Session expired: {0}")]
    SessionExpired(String),

    /// Invalid transition in the session FSM.
    #[error("Invalid session state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AuthError {
    /// Returns true if this error is transient and the operation can be retried.
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::Gateway(e) => e.is_transient(),
            AuthError::Http(e) => {
                e.is_connect()
                    || e.is_timeout()
                    || e.status().is_some_and(|status| status.is_server_error())
            }
            _ => false,
        }
    }
}

impl From<client_config_and_utils::CoreError> for AuthError {
    fn from(err: client_config_and_utils::CoreError) -> Self {
        AuthError::Config(err.to_string())
    }
}

pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_credentials_message() {
        let err = AuthError::InvalidCredentials("User account is disabled".into());
        assert_eq!(err.to_string(), "Invalid credentials: User account is disabled");
        assert!(!err.is_transient());
    }

    #[test]
    fn test_gateway_5xx_is_transient() {
        let err = AuthError::from(GatewayError::Api {
            status: 502,
            message: "Bad Gateway".into(),
        });
        assert!(err.is_transient());
    }

    #[test]
    fn test_state_errors_are_not_transient() {
        assert!(!AuthError::NotLoggedIn.is_transient());
        assert!(!AuthError::InvalidStateTransition("x".into()).is_transient());
        assert!(!AuthError::SessionExpired("cookie gone".into()).is_transient());
    }
}
